// ==========================================
// LED模组批次排产系统 - 预留行领域模型
// ==========================================
// 软/硬预留用同一行类型加层级标签,不变量检查走同一条代码路径
// 行只按标识引用订单/批次/元件,不持有反向指针
// ==========================================

use crate::domain::types::ReservationTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// Reservation - 预留行
// ==========================================
// Soft: order_id 为占用方,batch_id 为 None
// Hard: batch_id 为占用方,order_id 记录来源订单(取消批次时退回用)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    // ===== 主键 =====
    pub reservation_id: String,

    // ===== 关联(仅标识) =====
    pub component_sku: String,
    pub order_id: String,
    pub batch_id: Option<String>,

    // ===== 层级与数量 =====
    pub tier: ReservationTier,
    pub qty: u32,

    // ===== 审计字段 =====
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// 新建软预留行
    pub fn soft(order_id: &str, component_sku: &str, qty: u32, now: DateTime<Utc>) -> Self {
        Self {
            reservation_id: Uuid::new_v4().to_string(),
            component_sku: component_sku.to_string(),
            order_id: order_id.to_string(),
            batch_id: None,
            tier: ReservationTier::Soft,
            qty,
            created_at: now,
            updated_at: now,
        }
    }

    /// 新建硬锁定行(记录来源订单)
    pub fn hard(
        order_id: &str,
        batch_id: &str,
        component_sku: &str,
        qty: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            reservation_id: Uuid::new_v4().to_string(),
            component_sku: component_sku.to_string(),
            order_id: order_id.to_string(),
            batch_id: Some(batch_id.to_string()),
            tier: ReservationTier::Hard,
            qty,
            created_at: now,
            updated_at: now,
        }
    }

    /// 是否为指定订单的软预留
    pub fn is_soft_of(&self, order_id: &str, component_sku: &str) -> bool {
        self.tier == ReservationTier::Soft
            && self.order_id == order_id
            && self.component_sku == component_sku
    }

    /// 是否为指定批次的硬锁定
    pub fn is_hard_of(&self, batch_id: &str) -> bool {
        self.tier == ReservationTier::Hard && self.batch_id.as_deref() == Some(batch_id)
    }
}
