// ==========================================
// LED模组批次排产系统 - 生产编排器
// ==========================================
// 职责: 订单准入 → 软预留 → 构图/提交 → 序列号签发 → 单元登记
//       → 完工/取消 → 交接; 以及库存同步与刻印导出
// 并发模型: 单协调进程; 台账/登记簿各自持锁,编排器只做流程编排
// 协作方通知一律在台账事务提交后即发即弃,不参与事务
// ==========================================

use crate::config::scheduler_config::SchedulerConfig;
use crate::domain::batch::{Batch, BatchDraft};
use crate::domain::order::{LineItem, Order};
use crate::domain::types::{BatchStatus, CompletionState, OrderLifecycle, UnitStatus};
use crate::domain::unit::{ManufacturedUnit, UnitSerial};
use crate::engine::allocator::{UnitRegistry, UnitSerialAllocator};
use crate::engine::completion::CompletionTracker;
use crate::engine::composer::{BatchComposer, CandidateLine};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{
    AlertKind, AlertMessage, AlertSink, HandOffSink, StockSource,
};
use crate::engine::stall::{InProgressBatchSource, StallMonitor};
use crate::ledger::core::{HardRelease, ReservationLedger, StockSyncReport};
use crate::ledger::error::LedgerError;
use crate::ledger::impact::{ReallocationPlan, ReallocationRequest};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

// ==========================================
// EngravingRow - 刻印导出行
// ==========================================
// 每次批次确认产出一次; 复导出按登记簿签发序重现同批序列号
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngravingRow {
    pub batch_id: String,
    pub module_sku: String,
    pub order_id: String,
    pub unit_serial: UnitSerial,
}

/// 订单档案(订单 + 行项)
#[derive(Debug, Clone)]
struct OrderRecord {
    order: Order,
    items: Vec<LineItem>,
}

// ==========================================
// ProductionOrchestrator - 生产编排器
// ==========================================
pub struct ProductionOrchestrator {
    config: SchedulerConfig,
    ledger: Arc<ReservationLedger>,
    composer: BatchComposer,
    allocator: Arc<UnitSerialAllocator>,
    registry: Arc<UnitRegistry>,
    tracker: Arc<CompletionTracker>,
    alert_sink: Arc<dyn AlertSink>,
    orders: Mutex<BTreeMap<String, OrderRecord>>,
    batches: Mutex<BTreeMap<String, Batch>>,
}

impl ProductionOrchestrator {
    /// 构造函数
    ///
    /// # 参数
    /// - `config`: 调度配置
    /// - `handoff`: 完工交接接收方
    /// - `alert_sink`: 告警接收方
    pub fn new(
        config: SchedulerConfig,
        handoff: Arc<dyn HandOffSink>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Self {
        let composer = BatchComposer::new(config.composer.clone(), &config.priority);
        Self {
            config,
            ledger: Arc::new(ReservationLedger::new()),
            composer,
            allocator: Arc::new(UnitSerialAllocator::new()),
            registry: Arc::new(UnitRegistry::new()),
            tracker: Arc::new(CompletionTracker::new(handoff)),
            alert_sink,
            orders: Mutex::new(BTreeMap::new()),
            batches: Mutex::new(BTreeMap::new()),
        }
    }

    /// 测试/回放用: 固定序列号种子
    pub fn with_seeded_allocator(
        config: SchedulerConfig,
        handoff: Arc<dyn HandOffSink>,
        alert_sink: Arc<dyn AlertSink>,
        seed: u64,
    ) -> Self {
        let mut this = Self::new(config, handoff, alert_sink);
        this.allocator = Arc::new(UnitSerialAllocator::with_seed(seed));
        this
    }

    fn orders_guard(&self) -> EngineResult<MutexGuard<'_, BTreeMap<String, OrderRecord>>> {
        self.orders
            .lock()
            .map_err(|e| EngineError::LockPoisoned(e.to_string()))
    }

    fn batches_guard(&self) -> EngineResult<MutexGuard<'_, BTreeMap<String, Batch>>> {
        self.batches
            .lock()
            .map_err(|e| EngineError::LockPoisoned(e.to_string()))
    }

    fn publish_alert(&self, kind: AlertKind, subject_id: &str, payload: serde_json::Value) {
        let message = AlertMessage::new(kind, subject_id, payload);
        if let Err(e) = self.alert_sink.publish(message) {
            tracing::warn!(kind = kind.as_str(), subject_id, error = %e, "告警投递失败");
        }
    }

    // ==========================================
    // 访问器 (嵌入端/测试)
    // ==========================================

    pub fn ledger(&self) -> Arc<ReservationLedger> {
        self.ledger.clone()
    }

    pub fn registry(&self) -> Arc<UnitRegistry> {
        self.registry.clone()
    }

    pub fn tracker(&self) -> Arc<CompletionTracker> {
        self.tracker.clone()
    }

    /// 批次快照
    pub fn batch(&self, batch_id: &str) -> EngineResult<Option<Batch>> {
        Ok(self.batches_guard()?.get(batch_id).cloned())
    }

    /// 订单生命周期状态
    pub fn order_lifecycle(&self, order_id: &str) -> EngineResult<Option<OrderLifecycle>> {
        Ok(self
            .orders_guard()?
            .get(order_id)
            .map(|r| r.order.lifecycle))
    }

    /// 订单完工状态
    pub fn completion_state(&self, order_id: &str) -> EngineResult<CompletionState> {
        self.tracker.completion_state(order_id)
    }

    // ==========================================
    // 订单准入与生命周期
    // ==========================================

    /// 订单准入(来自外部订单系统)
    ///
    /// 生命周期为 ELIGIBLE 的订单立即按剩余需求建立软预留;
    /// 供给缺口不阻断准入,只发 ReservationShortfall 告警(标记而非自动消解)
    #[instrument(skip(self, order, items), fields(order_id = %order.order_id, item_count = items.len()))]
    pub fn admit_order(&self, order: Order, items: Vec<LineItem>) -> EngineResult<()> {
        if matches!(
            order.lifecycle,
            OrderLifecycle::Completed | OrderLifecycle::Cancelled
        ) {
            return Err(EngineError::InvalidStateTransition {
                entity: "Order".to_string(),
                from: order.lifecycle.to_string(),
                to: "ADMIT".to_string(),
            });
        }
        for item in &items {
            if item.order_id != order.order_id {
                return Err(EngineError::NotFound {
                    entity: "Order(行项归属不符)".to_string(),
                    id: item.line_item_id.clone(),
                });
            }
        }

        let order_id = order.order_id.clone();
        {
            let mut orders = self.orders_guard()?;
            if orders.contains_key(&order_id) {
                return Err(EngineError::InvalidStateTransition {
                    entity: "Order".to_string(),
                    from: "EXISTING".to_string(),
                    to: "ADMIT".to_string(),
                });
            }
            self.tracker.register_order(&order_id, &items)?;
            orders.insert(
                order_id.clone(),
                OrderRecord {
                    order: order.clone(),
                    items: items.clone(),
                },
            );
        }

        if order.lifecycle == OrderLifecycle::Eligible {
            self.reserve_for_order(&order_id, &items)?;
        }
        tracing::info!(order_id = %order_id, "订单已准入");
        Ok(())
    }

    /// 订单进入可排队列 (INTAKE → ELIGIBLE),并建立软预留
    #[instrument(skip(self))]
    pub fn mark_order_eligible(&self, order_id: &str) -> EngineResult<()> {
        let items = {
            let mut orders = self.orders_guard()?;
            let record = orders.get_mut(order_id).ok_or_else(|| EngineError::NotFound {
                entity: "Order".to_string(),
                id: order_id.to_string(),
            })?;
            if record.order.lifecycle != OrderLifecycle::Intake {
                return Err(EngineError::InvalidStateTransition {
                    entity: "Order".to_string(),
                    from: record.order.lifecycle.to_string(),
                    to: OrderLifecycle::Eligible.to_string(),
                });
            }
            record.order.lifecycle = OrderLifecycle::Eligible;
            record.items.clone()
        };
        self.reserve_for_order(order_id, &items)
    }

    /// 撤单: 释放全部软预留,订单退役
    ///
    /// # 返回
    /// 释放的软预留总量
    #[instrument(skip(self))]
    pub fn withdraw_order(&self, order_id: &str) -> EngineResult<u32> {
        {
            let mut orders = self.orders_guard()?;
            let record = orders.get_mut(order_id).ok_or_else(|| EngineError::NotFound {
                entity: "Order".to_string(),
                id: order_id.to_string(),
            })?;
            if matches!(
                record.order.lifecycle,
                OrderLifecycle::Completed | OrderLifecycle::Cancelled
            ) {
                return Err(EngineError::InvalidStateTransition {
                    entity: "Order".to_string(),
                    from: record.order.lifecycle.to_string(),
                    to: OrderLifecycle::Cancelled.to_string(),
                });
            }
            record.order.lifecycle = OrderLifecycle::Cancelled;
        }
        let released = self.ledger.release_soft_for_order(order_id)?;
        tracing::info!(order_id, released, "订单已撤销,软预留已释放");
        Ok(released)
    }

    /// 外部订单变更事件: 调整行项需求数量(只标记,不自动消解)
    #[instrument(skip(self))]
    pub fn adjust_required_qty(
        &self,
        order_id: &str,
        line_item_id: &str,
        new_required: u32,
    ) -> EngineResult<()> {
        {
            let mut orders = self.orders_guard()?;
            let record = orders.get_mut(order_id).ok_or_else(|| EngineError::NotFound {
                entity: "Order".to_string(),
                id: order_id.to_string(),
            })?;
            let item = record
                .items
                .iter_mut()
                .find(|i| i.line_item_id == line_item_id)
                .ok_or_else(|| EngineError::NotFound {
                    entity: "LineItem".to_string(),
                    id: line_item_id.to_string(),
                })?;
            item.required_qty = new_required;
        }
        let previous = self.tracker.adjust_required(order_id, line_item_id, new_required)?;
        self.publish_alert(
            AlertKind::RequiredQtyChanged,
            order_id,
            json!({
                "line_item_id": line_item_id,
                "previous_required": previous,
                "new_required": new_required,
            }),
        );
        Ok(())
    }

    /// 按剩余需求建立软预留(能拿多少拿多少,缺口只告警)
    fn reserve_for_order(&self, order_id: &str, items: &[LineItem]) -> EngineResult<()> {
        // 聚合剩余需求 (BTreeMap 保证确定性)
        let mut wanted: BTreeMap<String, u32> = BTreeMap::new();
        for item in items {
            let remaining = self
                .tracker
                .line_progress(order_id, &item.line_item_id)?
                .map(|p| p.remaining())
                .unwrap_or(item.required_qty);
            for (sku, qty) in item.demand_for(remaining) {
                *wanted.entry(sku).or_insert(0) += qty;
            }
        }

        let mut shortfalls = Vec::new();
        for (sku, want) in wanted {
            if want == 0 {
                continue;
            }
            let already = self.ledger.soft_reserved_for(order_id, &sku)?;
            let need = want.saturating_sub(already);
            if need == 0 {
                continue;
            }
            match self.ledger.soft_reserve(order_id, &sku, need) {
                Ok(()) => {}
                Err(LedgerError::InsufficientStock { available, .. }) => {
                    // 能拿多少拿多少,缺口交人工判断
                    if available > 0 {
                        self.ledger.soft_reserve(order_id, &sku, available)?;
                    }
                    shortfalls.push(json!({
                        "component_sku": sku,
                        "wanted": need,
                        "reserved": available,
                    }));
                }
                Err(LedgerError::UnknownComponent { .. }) => {
                    shortfalls.push(json!({
                        "component_sku": sku,
                        "wanted": need,
                        "reserved": 0,
                    }));
                }
                Err(other) => return Err(other.into()),
            }
        }

        if !shortfalls.is_empty() {
            tracing::warn!(order_id, shortfall_count = shortfalls.len(), "软预留存在缺口");
            self.publish_alert(
                AlertKind::ReservationShortfall,
                order_id,
                json!({ "shortfalls": shortfalls }),
            );
        }
        Ok(())
    }

    // ==========================================
    // 批次构图与提交
    // ==========================================

    /// 生成批次草案(只读,可与其他读并发)
    #[instrument(skip(self))]
    pub fn compose_batch(
        &self,
        base_type: &str,
        capacity_hint: u32,
        array_size: u32,
    ) -> EngineResult<BatchDraft> {
        let candidates = self.collect_candidates(base_type)?;
        self.composer.compose_batch(
            base_type,
            capacity_hint,
            array_size,
            &candidates,
            &self.ledger,
            Utc::now().date_naive(),
        )
    }

    fn collect_candidates(&self, base_type: &str) -> EngineResult<Vec<CandidateLine>> {
        let orders = self.orders_guard()?;
        let mut candidates = Vec::new();
        for record in orders.values() {
            if !record.order.is_eligible() {
                continue;
            }
            for item in &record.items {
                if item.base_type != base_type {
                    continue;
                }
                let remaining = self
                    .tracker
                    .line_progress(&record.order.order_id, &item.line_item_id)?
                    .map(|p| p.remaining())
                    .unwrap_or(item.required_qty);
                if remaining == 0 {
                    continue;
                }
                candidates.push(CandidateLine {
                    order: record.order.clone(),
                    item: item.clone(),
                    remaining_qty: remaining,
                });
            }
        }
        Ok(candidates)
    }

    /// 提交批次草案: 硬预留落账 + 序列号签发 + 单元登记
    ///
    /// 序列号签发失败时整体回退(硬锁定退回软预留),不留半确认批次
    #[instrument(skip(self, draft), fields(base_type = %draft.base_type, total_qty = draft.total_qty))]
    pub fn commit_batch(&self, draft: &BatchDraft) -> EngineResult<Batch> {
        // 行项查找表
        let items: Vec<LineItem> = {
            let orders = self.orders_guard()?;
            draft
                .lines
                .iter()
                .filter_map(|line| {
                    orders.get(&line.order_id).and_then(|r| {
                        r.items
                            .iter()
                            .find(|i| i.line_item_id == line.line_item_id)
                            .cloned()
                    })
                })
                .collect()
        };

        let batch = self.composer.commit_batch(draft, &items, &self.ledger)?;
        self.tracker.record_batch_commit(&batch)?;

        // 序列号签发: 每个承诺单元一枚
        let serials = match self.allocator.allocate(batch.total_qty as usize) {
            Ok(serials) => serials,
            Err(e) => {
                // 回退: 硬锁定退回软预留,批次不落档
                tracing::error!(batch_id = %batch.batch_id, error = %e, "序列号签发失败,批次回退");
                self.ledger
                    .release_hard(&batch.batch_id, HardRelease::ReturnToSoft)?;
                self.tracker.record_batch_cancel(&batch)?;
                return Err(e);
            }
        };

        // 单元登记(签发序 = 构成行序,复导出依赖该顺序)
        let now = Utc::now();
        let mut serial_iter = serials.into_iter();
        for line in &batch.lines {
            let module_sku = items
                .iter()
                .find(|i| i.line_item_id == line.line_item_id)
                .map(|i| i.module_sku.clone())
                .unwrap_or_default();
            for _ in 0..line.committed_qty {
                if let Some(serial) = serial_iter.next() {
                    self.registry.register(ManufacturedUnit {
                        serial,
                        batch_id: batch.batch_id.clone(),
                        order_id: line.order_id.clone(),
                        line_item_id: line.line_item_id.clone(),
                        module_sku: module_sku.clone(),
                        status: UnitStatus::Active,
                        created_at: now,
                    })?;
                }
            }
        }

        self.batches_guard()?
            .insert(batch.batch_id.clone(), batch.clone());
        tracing::info!(batch_id = %batch.batch_id, total_qty = batch.total_qty, "批次已确认");
        Ok(batch)
    }

    // ==========================================
    // 批次生命周期
    // ==========================================

    /// 批次完工: 元件消耗,完工计数入账,驱动订单交接
    ///
    /// # 返回
    /// 本次新达到全部完工的订单列表
    #[instrument(skip(self))]
    pub fn complete_batch(&self, batch_id: &str) -> EngineResult<Vec<String>> {
        let batch = self.transition_batch(batch_id, BatchStatus::Complete)?;
        self.ledger.release_hard(batch_id, HardRelease::Consume)?;
        let newly_complete = self.tracker.record_batch_complete(&batch, &self.ledger)?;

        if !newly_complete.is_empty() {
            let mut orders = self.orders_guard()?;
            for order_id in &newly_complete {
                if let Some(record) = orders.get_mut(order_id) {
                    record.order.lifecycle = OrderLifecycle::Completed;
                }
            }
        }
        tracing::info!(batch_id, completed_orders = newly_complete.len(), "批次已完工");
        Ok(newly_complete)
    }

    /// 批次取消: 硬锁定全额退回来源订单软预留
    #[instrument(skip(self))]
    pub fn cancel_batch(&self, batch_id: &str) -> EngineResult<()> {
        let batch = self.transition_batch(batch_id, BatchStatus::Cancelled)?;
        self.ledger
            .release_hard(batch_id, HardRelease::ReturnToSoft)?;
        self.tracker.record_batch_cancel(&batch)?;
        tracing::info!(batch_id, "批次已取消,硬锁定退回软预留");
        Ok(())
    }

    /// 批次活动刷新(外部显式动作,复位停滞计时)
    pub fn touch_batch(&self, batch_id: &str) -> EngineResult<()> {
        let mut batches = self.batches_guard()?;
        let batch = batches.get_mut(batch_id).ok_or_else(|| EngineError::NotFound {
            entity: "Batch".to_string(),
            id: batch_id.to_string(),
        })?;
        if batch.status != BatchStatus::InProgress {
            return Err(EngineError::InvalidStateTransition {
                entity: "Batch".to_string(),
                from: batch.status.to_string(),
                to: "TOUCH".to_string(),
            });
        }
        batch.touch(Utc::now());
        Ok(())
    }

    /// InProgress → 目标状态转换,返回转换前批次快照(构成清单转为只读历史)
    fn transition_batch(&self, batch_id: &str, to: BatchStatus) -> EngineResult<Batch> {
        let mut batches = self.batches_guard()?;
        let batch = batches.get_mut(batch_id).ok_or_else(|| EngineError::NotFound {
            entity: "Batch".to_string(),
            id: batch_id.to_string(),
        })?;
        if batch.status != BatchStatus::InProgress {
            return Err(EngineError::InvalidStateTransition {
                entity: "Batch".to_string(),
                from: batch.status.to_string(),
                to: to.to_string(),
            });
        }
        batch.status = to;
        batch.touch(Utc::now());
        Ok(batch.clone())
    }

    /// 在制批次数量调整(审计化操作,替代口头协调)
    ///
    /// 上调: 追加硬预留并补签序列号; 下调: 预留退回软层,行尾单元作废
    #[instrument(skip(self))]
    pub fn adjust_batch_quantity(
        &self,
        batch_id: &str,
        line_item_id: &str,
        new_qty: u32,
    ) -> EngineResult<()> {
        // 读取批次行与行项 BOM
        let (order_id, old_qty) = {
            let batches = self.batches_guard()?;
            let batch = batches.get(batch_id).ok_or_else(|| EngineError::NotFound {
                entity: "Batch".to_string(),
                id: batch_id.to_string(),
            })?;
            if batch.status != BatchStatus::InProgress {
                return Err(EngineError::InvalidStateTransition {
                    entity: "Batch".to_string(),
                    from: batch.status.to_string(),
                    to: "ADJUST_QTY".to_string(),
                });
            }
            let line = batch
                .lines
                .iter()
                .find(|l| l.line_item_id == line_item_id)
                .ok_or_else(|| EngineError::NotFound {
                    entity: "BatchLine".to_string(),
                    id: line_item_id.to_string(),
                })?;
            (line.order_id.clone(), line.committed_qty)
        };
        let delta = i64::from(new_qty) - i64::from(old_qty);
        if delta == 0 {
            return Ok(());
        }

        let item = {
            let orders = self.orders_guard()?;
            orders
                .get(&order_id)
                .and_then(|r| {
                    r.items
                        .iter()
                        .find(|i| i.line_item_id == line_item_id)
                        .cloned()
                })
                .ok_or_else(|| EngineError::NotFound {
                    entity: "LineItem".to_string(),
                    id: line_item_id.to_string(),
                })?
        };

        // 台账联动(先校验后落账,失败无副作用)
        let sku_deltas: Vec<(String, i64)> = item
            .components
            .iter()
            .map(|req| (req.component_sku.clone(), i64::from(req.qty_per_unit) * delta))
            .collect();
        self.ledger
            .adjust_batch_reservation(batch_id, &order_id, &sku_deltas)?;

        // 单元联动
        if delta > 0 {
            let serials = match self.allocator.allocate(delta as usize) {
                Ok(serials) => serials,
                Err(e) => {
                    // 回退台账调整,保持一致
                    let revert: Vec<(String, i64)> =
                        sku_deltas.iter().map(|(sku, d)| (sku.clone(), -d)).collect();
                    self.ledger
                        .adjust_batch_reservation(batch_id, &order_id, &revert)?;
                    return Err(e);
                }
            };
            let now = Utc::now();
            for serial in serials {
                self.registry.register(ManufacturedUnit {
                    serial,
                    batch_id: batch_id.to_string(),
                    order_id: order_id.clone(),
                    line_item_id: line_item_id.to_string(),
                    module_sku: item.module_sku.clone(),
                    status: UnitStatus::Active,
                    created_at: now,
                })?;
            }
        } else {
            // 行尾单元作废,序列号永久退役
            let active = self.registry.active_units_for_line(batch_id, line_item_id)?;
            let to_void = delta.unsigned_abs() as usize;
            for unit in active.iter().rev().take(to_void) {
                self.registry.void_unit(unit.serial)?;
            }
        }

        // 批次落档
        {
            let mut batches = self.batches_guard()?;
            if let Some(batch) = batches.get_mut(batch_id) {
                if let Some(line) = batch
                    .lines
                    .iter_mut()
                    .find(|l| l.line_item_id == line_item_id)
                {
                    line.committed_qty = new_qty;
                }
                batch.lines.retain(|l| l.committed_qty > 0);
                batch.total_qty = batch.lines.iter().map(|l| l.committed_qty).sum();
                let array_size = batch.array_size.max(1);
                batch.array_count = batch.total_qty / array_size;
                batch.partial_array_remainder = batch.total_qty % array_size;
                batch.touch(Utc::now());
            }
        }
        self.tracker.adjust_committed(&order_id, line_item_id, delta)?;

        self.publish_alert(
            AlertKind::QuantityAdjusted,
            batch_id,
            json!({
                "line_item_id": line_item_id,
                "order_id": order_id,
                "previous_qty": old_qty,
                "new_qty": new_qty,
            }),
        );
        Ok(())
    }

    // ==========================================
    // 软预留调拨 (两阶段,人机协同)
    // ==========================================

    /// 调拨预演: 生成方案与影响摘要供人工确认
    pub fn preview_reallocation(
        &self,
        request: ReallocationRequest,
    ) -> EngineResult<ReallocationPlan> {
        let items: Vec<LineItem> = {
            let orders = self.orders_guard()?;
            orders
                .values()
                .filter(|r| {
                    r.order.order_id == request.from_order_id
                        || r.order.order_id == request.to_order_id
                })
                .flat_map(|r| r.items.iter().cloned())
                .collect()
        };
        Ok(self.ledger.preview_reallocation(request, &items)?)
    }

    /// 调拨提交: 落账并向告警方通报影响
    pub fn commit_reallocation(&self, plan: &ReallocationPlan) -> EngineResult<()> {
        self.ledger.commit_reallocation(plan)?;
        self.publish_alert(
            AlertKind::ReallocationImpact,
            &plan.request.from_order_id,
            serde_json::to_value(&plan.impact).unwrap_or_else(|_| json!({})),
        );
        Ok(())
    }

    // ==========================================
    // 库存同步与导出
    // ==========================================

    /// 从外部库存源同步实物库存
    pub async fn sync_stock(&self, source: &dyn StockSource) -> EngineResult<StockSyncReport> {
        let levels = source.fetch_stock_levels().await.map_err(EngineError::Other)?;
        let pairs: Vec<(String, u32)> = levels
            .into_iter()
            .map(|l| (l.component_sku, l.physical_qty))
            .collect();
        let report = self.ledger.sync_physical_stock(&pairs)?;
        if !report.squeezes.is_empty() {
            self.publish_alert(
                AlertKind::StockSqueeze,
                "stock-sync",
                serde_json::to_value(&report.squeezes).unwrap_or_else(|_| json!({})),
            );
        }
        Ok(report)
    }

    /// 刻印导出: 确定性产出批次单元行(复导出重现同批序列号)
    pub fn export_engraving(&self, batch_id: &str) -> EngineResult<Vec<EngravingRow>> {
        if self.batches_guard()?.get(batch_id).is_none() {
            return Err(EngineError::NotFound {
                entity: "Batch".to_string(),
                id: batch_id.to_string(),
            });
        }
        let units = self.registry.units_for_batch(batch_id)?;
        Ok(units
            .into_iter()
            .map(|u| EngravingRow {
                batch_id: u.batch_id,
                module_sku: u.module_sku,
                order_id: u.order_id,
                unit_serial: u.serial,
            })
            .collect())
    }

    /// 作废成品单元(报废/弃单)
    pub fn void_unit(&self, serial: UnitSerial) -> EngineResult<()> {
        self.registry.void_unit(serial)
    }

    // ==========================================
    // 停滞监控接线
    // ==========================================

    /// 启动停滞监控扫描任务
    pub fn start_stall_monitor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::new(StallMonitor::new(
            self.config.stall.clone(),
            self.alert_sink.clone(),
        ));
        let source: Arc<dyn InProgressBatchSource> = self.clone();
        tokio::spawn(monitor.run(source))
    }
}

impl InProgressBatchSource for ProductionOrchestrator {
    fn in_progress_batches(&self) -> Vec<Batch> {
        self.batches_guard()
            .map(|batches| {
                batches
                    .values()
                    .filter(|b| b.status == BatchStatus::InProgress)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
