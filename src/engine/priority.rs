// ==========================================
// LED模组批次排产系统 - 优先级引擎
// ==========================================
// 红线: 层级制比较,不做加权求和 (高层级同分才看低层级)
// 比较键 (依次):
// 1) 人工覆盖值 (设置即压倒一切)
// 2) 付费加急金额 (与费用档位单调)
// 3) 超期天数 (超期越多越靠前)
// 4) 临近交期提升 (可配置窗口)
// 5) 订单年龄 (最老优先,仅作兜底)
// 输出稳定确定: 相同输入必得相同排序位次
// 重算为拉取式,由批次构图器在构图时调用
// ==========================================

use crate::config::scheduler_config::PriorityConfig;
use crate::domain::order::Order;
use crate::domain::types::PriorityTier;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ==========================================
// PriorityScore - 优先级评分
// ==========================================
// 有序元组,不折算为单一标量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityScore {
    pub manual_override: Option<i32>, // 人工覆盖值
    pub expedite_fee_cents: i64,      // 付费加急金额(分)
    pub days_late: i64,               // 超期天数(未超期为 0)
    pub almost_due: bool,             // 临近交期
    pub age_days: i64,                // 订单年龄(天)
    pub created_at: DateTime<Utc>,    // 兜底排序键
}

impl PriorityScore {
    /// 折算离散优先等级(供批次构图器的不裁边规则使用)
    ///
    /// L3: 人工覆盖或已超期; L2: 付费加急; L1: 临近交期; L0: 正常
    pub fn tier(&self) -> PriorityTier {
        if self.manual_override.is_some() || self.days_late > 0 {
            PriorityTier::L3
        } else if self.expedite_fee_cents > 0 {
            PriorityTier::L2
        } else if self.almost_due {
            PriorityTier::L1
        } else {
            PriorityTier::L0
        }
    }
}

// ==========================================
// PriorityEngine - 优先级引擎
// ==========================================
// 无状态引擎,只持有配置参数
pub struct PriorityEngine {
    almost_due_window_days: i64,
}

impl PriorityEngine {
    /// 构造函数
    pub fn new(config: &PriorityConfig) -> Self {
        Self {
            almost_due_window_days: config.almost_due_window_days,
        }
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 计算订单优先级评分
    pub fn score(&self, order: &Order, today: NaiveDate) -> PriorityScore {
        let (days_late, almost_due) = match order.promise_date {
            Some(due) => {
                let delta = (today - due).num_days();
                if delta > 0 {
                    (delta, false)
                } else {
                    // 未超期: 距交期不足窗口天数即临近
                    (0, -delta <= self.almost_due_window_days)
                }
            }
            None => (0, false),
        };

        let age_days = (today - order.created_at.date_naive()).num_days().max(0);

        PriorityScore {
            manual_override: order.manual_override,
            expedite_fee_cents: order.expedite_fee_cents,
            days_late,
            almost_due,
            age_days,
            created_at: order.created_at,
        }
    }

    /// 比较两个评分
    ///
    /// # 返回
    /// Ordering::Less 表示 a 优先于 b
    pub fn compare(a: &PriorityScore, b: &PriorityScore) -> Ordering {
        // 1. 人工覆盖: 设置者优先,均设置则值大者优先
        match (a.manual_override, b.manual_override) {
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (Some(va), Some(vb)) => match vb.cmp(&va) {
                Ordering::Equal => {}
                other => return other,
            },
            (None, None) => {}
        }

        // 2. 付费加急金额 (降序)
        match b.expedite_fee_cents.cmp(&a.expedite_fee_cents) {
            Ordering::Equal => {}
            other => return other,
        }

        // 3. 超期天数 (降序,超期越多越紧迫)
        match b.days_late.cmp(&a.days_late) {
            Ordering::Equal => {}
            other => return other,
        }

        // 4. 临近交期 (true 优先)
        match b.almost_due.cmp(&a.almost_due) {
            Ordering::Equal => {}
            other => return other,
        }

        // 5. 订单年龄兜底 (最老优先 = 创建时间升序)
        a.created_at.cmp(&b.created_at)
    }

    /// 生成排序原因 (可解释性)
    ///
    /// # 返回
    /// JSON 格式的排序原因字符串
    pub fn generate_sort_reason(&self, score: &PriorityScore) -> String {
        let primary_factor = if score.manual_override.is_some() {
            "MANUAL_OVERRIDE"
        } else if score.expedite_fee_cents > 0 {
            "EXPEDITE_FEE"
        } else if score.days_late > 0 {
            "PAST_DUE"
        } else if score.almost_due {
            "ALMOST_DUE"
        } else {
            "ORDER_AGE"
        };

        format!(
            r#"{{"sort_keys":{{"manual_override":{},"expedite_fee_cents":{},"days_late":{},"almost_due":{},"age_days":{}}},"primary_factor":"{}"}}"#,
            score
                .manual_override
                .map(|v| v.to_string())
                .unwrap_or_else(|| "null".to_string()),
            score.expedite_fee_cents,
            score.days_late,
            score.almost_due,
            score.age_days,
            primary_factor
        )
    }
}
