// ==========================================
// LED模组批次排产系统 - 软预留调拨 (两阶段)
// ==========================================
// 职责: 调拨预演(生成影响摘要) + 调拨提交(锁内再校验)
// 红线: 硬锁定在任何情况下不是调拨对象
// 两阶段设计: 预演不落账,供人工确认; 提交时重验期望,世界变了就拒绝
// ==========================================

use crate::domain::order::LineItem;
use crate::domain::reservation::Reservation;
use crate::ledger::core::ReservationLedger;
use crate::ledger::error::{CommitShortfall, LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

// ==========================================
// ReallocationRequest - 调拨请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReallocationRequest {
    pub from_order_id: String,
    pub to_order_id: String,
    pub component_sku: String,
    pub qty: u32,
}

// ==========================================
// BuildabilityChange - 单行项可建能力变化
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildabilityChange {
    pub order_id: String,
    pub line_item_id: String,
    pub module_sku: String,
    pub buildable_before: u32,
    pub buildable_after: u32,
}

// ==========================================
// ReallocationImpact - 调拨影响摘要
// ==========================================
// 供调用方(人工确认环节)展示,不需要重算预留数学
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReallocationImpact {
    pub changes: Vec<BuildabilityChange>,
    pub losing_orders: Vec<String>, // 失去可建能力的订单
    pub description: String,        // 可读描述
}

// ==========================================
// ReallocationPlan - 调拨方案
// ==========================================
// preview 的输出,一次性: 提交成功后同一方案不可重复提交
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReallocationPlan {
    pub plan_id: String,
    pub request: ReallocationRequest,
    pub impact: ReallocationImpact,
    pub expected_from_soft: u32, // 预演时转出方的软持有量(提交期校验基准)
    pub created_at: DateTime<Utc>,
}

impl ReservationLedger {
    // ==========================================
    // 阶段一: 预演
    // ==========================================

    /// 调拨预演: 校验可行性并生成影响摘要,不产生任何状态变更
    ///
    /// line_items: 受评估订单的行项快照(至少包含转出/转入订单的行项)
    ///
    /// 失败:
    /// - 转出方软持有不足且该 SKU 上有其硬锁定 → ComponentHardLocked
    /// - 转出方软持有不足且无硬锁定 → InsufficientSoftReservation
    #[instrument(skip(self, line_items, request), fields(
        from = %request.from_order_id,
        to = %request.to_order_id,
        sku = %request.component_sku,
        qty = request.qty
    ))]
    pub fn preview_reallocation(
        &self,
        request: ReallocationRequest,
        line_items: &[LineItem],
    ) -> LedgerResult<ReallocationPlan> {
        let state = self.guard()?;

        if !state.components.contains_key(&request.component_sku) {
            return Err(LedgerError::UnknownComponent {
                component_sku: request.component_sku.clone(),
            });
        }

        let from_soft = state.soft_qty(&request.from_order_id, &request.component_sku);
        if from_soft < request.qty {
            let hard_locked =
                state.hard_qty_on_sku(&request.from_order_id, &request.component_sku);
            if hard_locked > 0 {
                return Err(LedgerError::ComponentHardLocked {
                    component_sku: request.component_sku.clone(),
                    requested: request.qty,
                    soft_available: from_soft,
                    hard_locked,
                });
            }
            return Err(LedgerError::InsufficientSoftReservation {
                order_id: request.from_order_id.clone(),
                component_sku: request.component_sku.clone(),
                requested: request.qty,
                reserved: from_soft,
            });
        }

        // 影响分析: 仅转出/转入订单的软持有发生变化,可用量不变
        let mut changes = Vec::new();
        for item in line_items {
            let delta: i64 = if item.order_id == request.from_order_id {
                -i64::from(request.qty)
            } else if item.order_id == request.to_order_id {
                i64::from(request.qty)
            } else {
                continue;
            };

            let before = state.buildable_for(&item.order_id, item, None);
            let after = state.buildable_for(
                &item.order_id,
                item,
                Some((request.component_sku.as_str(), delta)),
            );
            if before != after {
                changes.push(BuildabilityChange {
                    order_id: item.order_id.clone(),
                    line_item_id: item.line_item_id.clone(),
                    module_sku: item.module_sku.clone(),
                    buildable_before: before,
                    buildable_after: after,
                });
            }
        }

        let mut losing_orders: Vec<String> = changes
            .iter()
            .filter(|c| c.buildable_after < c.buildable_before)
            .map(|c| c.order_id.clone())
            .collect();
        losing_orders.sort();
        losing_orders.dedup();

        let description = Self::describe_impact(&request, &changes, &losing_orders);

        Ok(ReallocationPlan {
            plan_id: Uuid::new_v4().to_string(),
            request,
            impact: ReallocationImpact {
                changes,
                losing_orders,
                description,
            },
            expected_from_soft: from_soft,
            created_at: Utc::now(),
        })
    }

    // ==========================================
    // 阶段二: 提交
    // ==========================================

    /// 调拨提交: 锁内再校验后落账
    ///
    /// 失败:
    /// - 同一方案重复提交 → PlanAlreadyCommitted
    /// - 预演后转出方软持有缩水至不足 → ConcurrentStockChange(需重新预演)
    #[instrument(skip(self, plan), fields(plan_id = %plan.plan_id))]
    pub fn commit_reallocation(&self, plan: &ReallocationPlan) -> LedgerResult<()> {
        let mut state = self.guard()?;

        if state.consumed_plans.contains(&plan.plan_id) {
            return Err(LedgerError::PlanAlreadyCommitted {
                plan_id: plan.plan_id.clone(),
            });
        }

        let req = &plan.request;
        let from_soft = state.soft_qty(&req.from_order_id, &req.component_sku);
        if from_soft < req.qty {
            // 预演后世界变了(例如转出方刚被批次晋升),拒绝并要求重新预演
            return Err(LedgerError::ConcurrentStockChange {
                shortfalls: vec![CommitShortfall {
                    component_sku: req.component_sku.clone(),
                    requested_extra: req.qty - from_soft,
                    available: from_soft,
                }],
            });
        }

        // 落账: 软持有在订单间迁移,元件计数器不变
        let now = Utc::now();
        let mut remaining = req.qty;
        for row in state.reservations.iter_mut() {
            if row.is_soft_of(&req.from_order_id, &req.component_sku) {
                let take = row.qty.min(remaining);
                row.qty -= take;
                row.updated_at = now;
                remaining -= take;
                if remaining == 0 {
                    break;
                }
            }
        }
        state.reservations.retain(|r| r.qty > 0);

        if let Some(row) = state
            .reservations
            .iter_mut()
            .find(|r| r.is_soft_of(&req.to_order_id, &req.component_sku))
        {
            row.qty += req.qty;
            row.updated_at = now;
        } else {
            state.reservations.push(Reservation::soft(
                &req.to_order_id,
                &req.component_sku,
                req.qty,
                now,
            ));
        }

        state.consumed_plans.insert(plan.plan_id.clone());
        tracing::info!(
            from = %req.from_order_id,
            to = %req.to_order_id,
            sku = %req.component_sku,
            qty = req.qty,
            "软预留调拨已提交"
        );
        Ok(())
    }

    /// 生成可读影响描述
    fn describe_impact(
        request: &ReallocationRequest,
        changes: &[BuildabilityChange],
        losing_orders: &[String],
    ) -> String {
        let mut parts = vec![format!(
            "调拨{}个{}: {} → {}",
            request.qty, request.component_sku, request.from_order_id, request.to_order_id
        )];
        if !changes.is_empty() {
            parts.push(format!("影响{}个行项", changes.len()));
        }
        if !losing_orders.is_empty() {
            parts.push(format!("失去可建能力: {}", losing_orders.join(", ")));
        }
        parts.join("; ")
    }
}
