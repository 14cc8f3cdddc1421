// ==========================================
// LED模组批次排产系统 - 批次构图引擎
// ==========================================
// 职责: 从可排订单行项中选取构成,产出单一基板型号的批次草案
// 红线: 高优先级完整性始终压倒制造效率(不裁边)
// 红线: 提交全有或全无,不允许半预留批次
// 构图只读可并发; 提交重新进锁再校验(乐观读,悲观提交)
// ==========================================

use crate::config::scheduler_config::ComposerConfig;
use crate::config::scheduler_config::PriorityConfig;
use crate::domain::batch::{Batch, BatchDraft, BatchLine, DraftLine};
use crate::domain::order::{LineItem, Order};
use crate::domain::types::BatchStatus;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::priority::PriorityEngine;
use crate::ledger::core::{BatchDemand, ReservationLedger};
use crate::ledger::error::LedgerError;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

// ==========================================
// CandidateLine - 构图候选
// ==========================================
// 由编排层收集: 可排订单 × 指定基板型号的行项 × 剩余需求
#[derive(Debug, Clone)]
pub struct CandidateLine {
    pub order: Order,
    pub item: LineItem,
    pub remaining_qty: u32, // 需求量减去已承诺/已完工
}

// ==========================================
// BatchComposer - 批次构图引擎
// ==========================================
pub struct BatchComposer {
    config: ComposerConfig,
    priority: PriorityEngine,
}

impl BatchComposer {
    /// 构造函数
    pub fn new(config: ComposerConfig, priority_config: &PriorityConfig) -> Self {
        Self {
            config,
            priority: PriorityEngine::new(priority_config),
        }
    }

    // ==========================================
    // 构图
    // ==========================================

    /// 生成批次草案
    ///
    /// 算法:
    /// 1) 过滤: 可排订单 + 指定基板型号 + 剩余需求 > 0
    /// 2) 可建数量 = min(剩余需求, 最稀缺元件封顶量)
    /// 3) 按优先级评分降序排序,同分按行项创建序 (FIFO)
    /// 4) 高等级行项取全量,不裁边也不受 capacity_hint 约束
    /// 5) 低等级行项累计至 capacity_hint
    /// 6) 阵列对齐: 尾部余数尝试从最低优先行项裁掉(紧急单不裁)
    ///
    /// 构图只读,结果确定: 相同快照重复调用产出相同构成
    #[instrument(skip(self, candidates, ledger), fields(candidate_count = candidates.len()))]
    pub fn compose_batch(
        &self,
        base_type: &str,
        capacity_hint: u32,
        array_size: u32,
        candidates: &[CandidateLine],
        ledger: &ReservationLedger,
        today: NaiveDate,
    ) -> EngineResult<BatchDraft> {
        let array_size = array_size.max(1);

        // 1-2. 过滤并计算可建数量
        struct Scored {
            order_id: String,
            line_item_id: String,
            score: crate::engine::priority::PriorityScore,
            tier: crate::domain::types::PriorityTier,
            buildable: u32,
            urgent: bool,
            created_seq: u64,
        }

        let mut scored: Vec<Scored> = Vec::new();
        for cand in candidates {
            if !cand.order.is_eligible()
                || cand.item.base_type != base_type
                || cand.remaining_qty == 0
            {
                continue;
            }
            let supply_cap = ledger.buildable_quantity(&cand.order.order_id, &cand.item)?;
            let buildable = cand.remaining_qty.min(supply_cap);
            if buildable == 0 {
                tracing::debug!(
                    order_id = %cand.order.order_id,
                    line_item_id = %cand.item.line_item_id,
                    "元件供给不足,行项本轮不可建"
                );
                continue;
            }
            let score = self.priority.score(&cand.order, today);
            let tier = score.tier();
            scored.push(Scored {
                order_id: cand.order.order_id.clone(),
                line_item_id: cand.item.line_item_id.clone(),
                score,
                tier,
                buildable,
                urgent: cand.order.manual_urgent_flag,
                created_seq: cand.item.created_seq,
            });
        }

        // 3. 排序: 评分降序,行项创建序兜底
        scored.sort_by(|a, b| {
            PriorityEngine::compare(&a.score, &b.score)
                .then_with(|| a.created_seq.cmp(&b.created_seq))
        });

        // 4-5. 行走累计
        let mut lines: Vec<DraftLine> = Vec::new();
        let mut total: u32 = 0;
        let mut last_low_idx: Option<usize> = None; // 最后加入的低等级行(最低优先)
        let mut last_low_urgent = false;

        for entry in &scored {
            if entry.tier >= self.config.full_quantity_min_tier {
                // 高等级: 全量,完整性压倒效率
                lines.push(DraftLine {
                    order_id: entry.order_id.clone(),
                    line_item_id: entry.line_item_id.clone(),
                    qty: entry.buildable,
                    tier: entry.tier,
                    trimmed_qty: 0,
                });
                total += entry.buildable;
            } else {
                let remaining_cap = capacity_hint.saturating_sub(total);
                if remaining_cap == 0 {
                    break;
                }
                let qty = entry.buildable.min(remaining_cap);
                if qty == 0 {
                    continue;
                }
                lines.push(DraftLine {
                    order_id: entry.order_id.clone(),
                    line_item_id: entry.line_item_id.clone(),
                    qty,
                    tier: entry.tier,
                    trimmed_qty: 0,
                });
                last_low_idx = Some(lines.len() - 1);
                last_low_urgent = entry.urgent;
                total += qty;
            }
        }

        // 6. 阵列对齐: 尾数尝试从最低优先低等级行裁掉
        let remainder = total % array_size;
        if remainder > 0 {
            if let Some(idx) = last_low_idx {
                let can_trim = !last_low_urgent && lines[idx].qty >= remainder;
                if can_trim {
                    lines[idx].qty -= remainder;
                    lines[idx].trimmed_qty = remainder;
                    total -= remainder;
                    if lines[idx].qty == 0 {
                        lines.remove(idx);
                    }
                }
            }
        }

        let draft = BatchDraft {
            base_type: base_type.to_string(),
            lines,
            total_qty: total,
            array_size,
            array_count: total / array_size,
            partial_array_remainder: total % array_size,
        };
        tracing::info!(
            total_qty = draft.total_qty,
            array_count = draft.array_count,
            partial_array_remainder = draft.partial_array_remainder,
            line_count = draft.lines.len(),
            "批次草案已生成"
        );
        Ok(draft)
    }

    // ==========================================
    // 提交
    // ==========================================

    /// 提交批次草案(原子全有或全无)
    ///
    /// 提交时重新进台账锁再校验; 检出库存并发变化时,按配置自动收缩
    /// 至当前可建数量并重试(有界次数),二次失败即向调用方报错
    ///
    /// # 参数
    /// - `draft`: 批次草案
    /// - `items`: 行项查找表(需覆盖草案内全部行项,提供 BOM)
    ///
    /// # 返回
    /// 在制批次(硬预留已落账)
    #[instrument(skip(self, draft, items, ledger), fields(
        base_type = %draft.base_type,
        total_qty = draft.total_qty
    ))]
    pub fn commit_batch(
        &self,
        draft: &BatchDraft,
        items: &[LineItem],
        ledger: &ReservationLedger,
    ) -> EngineResult<Batch> {
        if draft.is_empty() {
            return Err(EngineError::EmptyDraft);
        }

        let item_map: HashMap<&str, &LineItem> = items
            .iter()
            .map(|item| (item.line_item_id.as_str(), item))
            .collect();
        for line in &draft.lines {
            if !item_map.contains_key(line.line_item_id.as_str()) {
                return Err(EngineError::NotFound {
                    entity: "LineItem".to_string(),
                    id: line.line_item_id.clone(),
                });
            }
        }

        let batch_id = Uuid::new_v4().to_string();
        let mut working: Vec<DraftLine> = draft.lines.clone();
        let max_attempts = self.config.max_commit_attempts.max(1);

        for attempt in 1..=max_attempts {
            let mut demands: Vec<BatchDemand> = Vec::new();
            for line in &working {
                if let Some(item) = item_map.get(line.line_item_id.as_str()) {
                    for (sku, qty) in item.demand_for(line.qty) {
                        demands.push(BatchDemand {
                            order_id: line.order_id.clone(),
                            component_sku: sku,
                            qty,
                        });
                    }
                }
            }

            match ledger.commit_batch_reservations(&batch_id, &demands) {
                Ok(()) => {
                    let now = Utc::now();
                    let total: u32 = working.iter().map(|l| l.qty).sum();
                    let batch = Batch {
                        batch_id: batch_id.clone(),
                        base_type: draft.base_type.clone(),
                        status: BatchStatus::InProgress,
                        lines: working
                            .iter()
                            .map(|l| BatchLine {
                                order_id: l.order_id.clone(),
                                line_item_id: l.line_item_id.clone(),
                                committed_qty: l.qty,
                            })
                            .collect(),
                        total_qty: total,
                        array_size: draft.array_size,
                        array_count: total / draft.array_size.max(1),
                        partial_array_remainder: total % draft.array_size.max(1),
                        created_at: now,
                        last_activity: now,
                    };
                    tracing::info!(batch_id = %batch.batch_id, total_qty = total, "批次已提交");
                    return Ok(batch);
                }
                Err(LedgerError::ConcurrentStockChange { shortfalls }) => {
                    let shrink_allowed =
                        self.config.allow_shrink_on_commit && attempt < max_attempts;
                    if !shrink_allowed {
                        tracing::warn!(
                            attempt,
                            shortfall_count = shortfalls.len(),
                            "批次提交失败: 库存并发变化"
                        );
                        return Err(EngineError::ConcurrentStockChange { shortfalls });
                    }

                    // 收缩草案至当前可建数量后重试一次
                    tracing::warn!(
                        attempt,
                        shortfall_count = shortfalls.len(),
                        "库存并发变化,收缩草案后重试"
                    );
                    let mut shrunk: Vec<DraftLine> = Vec::new();
                    for line in &working {
                        let item = match item_map.get(line.line_item_id.as_str()) {
                            Some(item) => *item,
                            None => continue,
                        };
                        let buildable = ledger.buildable_quantity(&line.order_id, item)?;
                        let qty = line.qty.min(buildable);
                        if qty > 0 {
                            let mut next = line.clone();
                            next.qty = qty;
                            shrunk.push(next);
                        }
                    }
                    if shrunk.is_empty() {
                        return Err(EngineError::ConcurrentStockChange { shortfalls });
                    }
                    working = shrunk;
                }
                Err(other) => return Err(EngineError::Ledger(other)),
            }
        }

        // max_attempts >= 1 保证循环内必然返回
        Err(EngineError::EmptyDraft)
    }
}
