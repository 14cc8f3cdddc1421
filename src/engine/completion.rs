// ==========================================
// LED模组批次排产系统 - 完工追踪引擎
// ==========================================
// 职责: 跨批次聚合订单 built/required,驱动完工状态机与交接
// 状态机: NOT_STARTED → PARTIALLY_COMPLETE → FULLY_COMPLETE
//        状态纯粹是 Σbuilt(非取消批次) 对 Σrequired 的函数
// 红线: 全部完工时硬锁定残留必须为 0,非零即致命一致性错误
// 红线: 同一订单的完工事件只投递一次(可重入)
// ==========================================

use crate::domain::batch::Batch;
use crate::domain::order::LineItem;
use crate::domain::types::CompletionState;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{HandOffEvent, HandOffSink};
use crate::ledger::core::ReservationLedger;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

// ==========================================
// 进度结构
// ==========================================

/// 单行项进度
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LineProgress {
    pub required: u32,  // 需求数量
    pub committed: u32, // 在制批次承诺数量
    pub built: u32,     // 已完工数量
}

impl LineProgress {
    /// 剩余可排数量
    pub fn remaining(&self) -> u32 {
        self.required.saturating_sub(self.committed + self.built)
    }
}

/// 单订单进度
#[derive(Debug, Clone, Default)]
struct OrderProgress {
    lines: BTreeMap<String, LineProgress>,
    handoff_emitted: bool,
}

impl OrderProgress {
    fn total_required(&self) -> u32 {
        self.lines.values().map(|l| l.required).sum()
    }

    fn total_built(&self) -> u32 {
        self.lines.values().map(|l| l.built).sum()
    }

    /// 完工状态派生
    fn state(&self) -> CompletionState {
        let required = self.total_required();
        let built = self.total_built();
        if built == 0 || required == 0 {
            CompletionState::NotStarted
        } else if built >= required {
            CompletionState::FullyComplete
        } else {
            CompletionState::PartiallyComplete
        }
    }
}

// ==========================================
// CompletionTracker - 完工追踪引擎
// ==========================================
pub struct CompletionTracker {
    inner: Mutex<HashMap<String, OrderProgress>>,
    handoff: Arc<dyn HandOffSink>,
}

impl CompletionTracker {
    /// 构造函数
    pub fn new(handoff: Arc<dyn HandOffSink>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            handoff,
        }
    }

    fn guard(&self) -> EngineResult<MutexGuard<'_, HashMap<String, OrderProgress>>> {
        self.inner
            .lock()
            .map_err(|e| EngineError::LockPoisoned(e.to_string()))
    }

    // ==========================================
    // 登记与调整
    // ==========================================

    /// 登记订单行项需求
    pub fn register_order(&self, order_id: &str, items: &[LineItem]) -> EngineResult<()> {
        let mut state = self.guard()?;
        let progress = state.entry(order_id.to_string()).or_default();
        for item in items {
            progress
                .lines
                .entry(item.line_item_id.clone())
                .or_default()
                .required = item.required_qty;
        }
        Ok(())
    }

    /// 外部订单变更事件: 调整需求数量(只调账,不自动消解冲突)
    ///
    /// # 返回
    /// 调整前的需求数量
    #[instrument(skip(self))]
    pub fn adjust_required(
        &self,
        order_id: &str,
        line_item_id: &str,
        new_required: u32,
    ) -> EngineResult<u32> {
        let mut state = self.guard()?;
        let progress = state.get_mut(order_id).ok_or_else(|| EngineError::NotFound {
            entity: "Order".to_string(),
            id: order_id.to_string(),
        })?;
        let line = progress
            .lines
            .get_mut(line_item_id)
            .ok_or_else(|| EngineError::NotFound {
                entity: "LineItem".to_string(),
                id: line_item_id.to_string(),
            })?;
        let previous = line.required;
        line.required = new_required;
        Ok(previous)
    }

    // ==========================================
    // 批次进度联动
    // ==========================================

    /// 记录批次提交: 承诺数量入账
    pub fn record_batch_commit(&self, batch: &Batch) -> EngineResult<()> {
        let mut state = self.guard()?;
        for line in &batch.lines {
            let progress = state.entry(line.order_id.clone()).or_default();
            progress
                .lines
                .entry(line.line_item_id.clone())
                .or_default()
                .committed += line.committed_qty;
        }
        Ok(())
    }

    /// 记录批次取消: 承诺数量回退(取消批次不计入 built)
    pub fn record_batch_cancel(&self, batch: &Batch) -> EngineResult<()> {
        let mut state = self.guard()?;
        for line in &batch.lines {
            if let Some(progress) = state.get_mut(&line.order_id) {
                if let Some(lp) = progress.lines.get_mut(&line.line_item_id) {
                    lp.committed = lp.committed.saturating_sub(line.committed_qty);
                }
            }
        }
        Ok(())
    }

    /// 在制批次数量调整联动
    pub fn adjust_committed(
        &self,
        order_id: &str,
        line_item_id: &str,
        delta: i64,
    ) -> EngineResult<()> {
        let mut state = self.guard()?;
        if let Some(progress) = state.get_mut(order_id) {
            if let Some(lp) = progress.lines.get_mut(line_item_id) {
                if delta >= 0 {
                    lp.committed += delta as u32;
                } else {
                    lp.committed = lp.committed.saturating_sub(delta.unsigned_abs() as u32);
                }
            }
        }
        Ok(())
    }

    /// 记录批次完工: 承诺转已建,驱动状态机
    ///
    /// 订单达到 FULLY_COMPLETE 时:
    /// 1) 审计硬锁定残留(批次正常关闭时应为 0,非零致命)
    /// 2) 释放残余软预留(该订单不再需要元件)
    /// 3) 向交接方投递一次性完工事件(重复完工不再投递)
    ///
    /// # 返回
    /// 本次新达到全部完工的订单列表
    #[instrument(skip(self, batch, ledger), fields(batch_id = %batch.batch_id))]
    pub fn record_batch_complete(
        &self,
        batch: &Batch,
        ledger: &ReservationLedger,
    ) -> EngineResult<Vec<String>> {
        let mut state = self.guard()?;

        let mut touched: Vec<String> = Vec::new();
        for line in &batch.lines {
            let progress = state.entry(line.order_id.clone()).or_default();
            let lp = progress
                .lines
                .entry(line.line_item_id.clone())
                .or_default();
            lp.committed = lp.committed.saturating_sub(line.committed_qty);
            lp.built += line.committed_qty;
            if !touched.contains(&line.order_id) {
                touched.push(line.order_id.clone());
            }
        }

        let mut newly_complete = Vec::new();
        for order_id in touched {
            let progress = match state.get_mut(&order_id) {
                Some(p) => p,
                None => continue,
            };
            if progress.state() != CompletionState::FullyComplete {
                continue;
            }

            // 1. 硬锁定残留审计
            let residual = ledger.hard_locked_for_order(&order_id)?;
            if residual > 0 {
                tracing::error!(
                    order_id = %order_id,
                    residual_hard = residual,
                    "订单全部完工但仍有硬锁定残留"
                );
                return Err(EngineError::InconsistentCompletionState {
                    order_id,
                    residual_hard: residual,
                });
            }

            // 2. 清尾残余软预留
            let released = ledger.release_soft_for_order(&order_id)?;
            if released > 0 {
                tracing::info!(order_id = %order_id, released, "完工订单残余软预留已释放");
            }

            // 3. 一次性交接投递
            if !progress.handoff_emitted {
                let event = HandOffEvent {
                    order_id: order_id.clone(),
                    total_built: progress.total_built(),
                    completed_at: Utc::now(),
                };
                match self.handoff.deliver(event) {
                    Ok(()) => progress.handoff_emitted = true,
                    Err(e) => {
                        // 即发即弃: 投递失败不回滚台账,留待下次完工评估重试
                        tracing::warn!(order_id = %order_id, error = %e, "完工交接投递失败");
                    }
                }
            }
            newly_complete.push(order_id);
        }
        Ok(newly_complete)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 订单完工状态
    pub fn completion_state(&self, order_id: &str) -> EngineResult<CompletionState> {
        let state = self.guard()?;
        Ok(state
            .get(order_id)
            .map(|p| p.state())
            .unwrap_or(CompletionState::NotStarted))
    }

    /// 行项进度
    pub fn line_progress(
        &self,
        order_id: &str,
        line_item_id: &str,
    ) -> EngineResult<Option<LineProgress>> {
        let state = self.guard()?;
        Ok(state
            .get(order_id)
            .and_then(|p| p.lines.get(line_item_id))
            .copied())
    }
}

// ==========================================
// 单元测试
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::BatchLine;
    use crate::domain::component::Component;
    use crate::domain::types::BatchStatus;
    use crate::domain::order::ComponentRequirement;
    use crate::engine::events::MemoryHandOffSink;

    fn make_item(order_id: &str, line_item_id: &str, required: u32) -> LineItem {
        LineItem {
            line_item_id: line_item_id.to_string(),
            order_id: order_id.to_string(),
            module_sku: format!("MOD-{}", line_item_id),
            base_type: "SP-9".to_string(),
            components: vec![ComponentRequirement {
                component_sku: "LED-W3".to_string(),
                qty_per_unit: 1,
            }],
            required_qty: required,
            created_seq: 1,
        }
    }

    fn make_batch(batch_id: &str, order_id: &str, line_item_id: &str, qty: u32) -> Batch {
        let now = Utc::now();
        Batch {
            batch_id: batch_id.to_string(),
            base_type: "SP-9".to_string(),
            status: BatchStatus::InProgress,
            lines: vec![BatchLine {
                order_id: order_id.to_string(),
                line_item_id: line_item_id.to_string(),
                committed_qty: qty,
            }],
            total_qty: qty,
            array_size: 8,
            array_count: qty / 8,
            partial_array_remainder: qty % 8,
            created_at: now,
            last_activity: now,
        }
    }

    fn make_ledger() -> ReservationLedger {
        let ledger = ReservationLedger::new();
        ledger
            .register_component(Component::new("LED-W3", 1000))
            .unwrap();
        ledger
    }

    #[test]
    fn test_state_machine_progression() {
        let sink = Arc::new(MemoryHandOffSink::new());
        let tracker = CompletionTracker::new(sink.clone());
        let ledger = make_ledger();

        tracker
            .register_order("SO-1", &[make_item("SO-1", "LI-1", 50)])
            .unwrap();
        assert_eq!(
            tracker.completion_state("SO-1").unwrap(),
            CompletionState::NotStarted
        );

        // 第一批 30
        let b1 = make_batch("B-1", "SO-1", "LI-1", 30);
        tracker.record_batch_commit(&b1).unwrap();
        tracker.record_batch_complete(&b1, &ledger).unwrap();
        assert_eq!(
            tracker.completion_state("SO-1").unwrap(),
            CompletionState::PartiallyComplete
        );
        assert!(sink.events().is_empty());

        // 第二批 20 → 全部完工
        let b2 = make_batch("B-2", "SO-1", "LI-1", 20);
        tracker.record_batch_commit(&b2).unwrap();
        let newly = tracker.record_batch_complete(&b2, &ledger).unwrap();
        assert_eq!(newly, vec!["SO-1".to_string()]);
        assert_eq!(
            tracker.completion_state("SO-1").unwrap(),
            CompletionState::FullyComplete
        );
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].total_built, 50);
    }

    #[test]
    fn test_handoff_is_idempotent() {
        let sink = Arc::new(MemoryHandOffSink::new());
        let tracker = CompletionTracker::new(sink.clone());
        let ledger = make_ledger();

        tracker
            .register_order("SO-1", &[make_item("SO-1", "LI-1", 20)])
            .unwrap();

        let b1 = make_batch("B-1", "SO-1", "LI-1", 20);
        tracker.record_batch_commit(&b1).unwrap();
        tracker.record_batch_complete(&b1, &ledger).unwrap();

        // 超额完工(外部又排了一批): 状态保持完工,事件不再投递
        let b2 = make_batch("B-2", "SO-1", "LI-1", 5);
        tracker.record_batch_commit(&b2).unwrap();
        tracker.record_batch_complete(&b2, &ledger).unwrap();

        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn test_cancelled_batch_does_not_count_as_built() {
        let sink = Arc::new(MemoryHandOffSink::new());
        let tracker = CompletionTracker::new(sink.clone());

        tracker
            .register_order("SO-1", &[make_item("SO-1", "LI-1", 20)])
            .unwrap();

        let b1 = make_batch("B-1", "SO-1", "LI-1", 20);
        tracker.record_batch_commit(&b1).unwrap();
        tracker.record_batch_cancel(&b1).unwrap();

        assert_eq!(
            tracker.completion_state("SO-1").unwrap(),
            CompletionState::NotStarted
        );
        let lp = tracker.line_progress("SO-1", "LI-1").unwrap().unwrap();
        assert_eq!(lp.committed, 0);
        assert_eq!(lp.remaining(), 20);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_residual_hard_lock_is_fatal() {
        let sink = Arc::new(MemoryHandOffSink::new());
        let tracker = CompletionTracker::new(sink.clone());
        let ledger = make_ledger();

        // 人为制造残留: 订单在另一批次上还有硬锁定
        ledger.soft_reserve("SO-1", "LED-W3", 30).unwrap();
        ledger
            .promote_to_hard("SO-1", "B-GHOST", "LED-W3", 30)
            .unwrap();

        tracker
            .register_order("SO-1", &[make_item("SO-1", "LI-1", 20)])
            .unwrap();
        let b1 = make_batch("B-1", "SO-1", "LI-1", 20);
        tracker.record_batch_commit(&b1).unwrap();

        let err = tracker.record_batch_complete(&b1, &ledger).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InconsistentCompletionState {
                residual_hard: 30,
                ..
            }
        ));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_completion_releases_residual_soft() {
        let sink = Arc::new(MemoryHandOffSink::new());
        let tracker = CompletionTracker::new(sink);
        let ledger = make_ledger();
        ledger.soft_reserve("SO-1", "LED-W3", 40).unwrap();

        tracker
            .register_order("SO-1", &[make_item("SO-1", "LI-1", 20)])
            .unwrap();
        let b1 = make_batch("B-1", "SO-1", "LI-1", 20);
        tracker.record_batch_commit(&b1).unwrap();
        tracker.record_batch_complete(&b1, &ledger).unwrap();

        // 完工订单的残余软预留被清尾
        assert_eq!(ledger.soft_reserved_for("SO-1", "LED-W3").unwrap(), 0);
    }

    #[test]
    fn test_adjust_required() {
        let sink = Arc::new(MemoryHandOffSink::new());
        let tracker = CompletionTracker::new(sink);

        tracker
            .register_order("SO-1", &[make_item("SO-1", "LI-1", 20)])
            .unwrap();
        let previous = tracker.adjust_required("SO-1", "LI-1", 35).unwrap();
        assert_eq!(previous, 20);
        let lp = tracker.line_progress("SO-1", "LI-1").unwrap().unwrap();
        assert_eq!(lp.required, 35);

        let err = tracker.adjust_required("SO-9", "LI-1", 5).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }
}
