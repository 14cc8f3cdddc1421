// ==========================================
// LED模组批次排产系统 - 台账层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 批次提交时的单项短缺明细
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitShortfall {
    pub component_sku: String,
    pub requested_extra: u32, // 软预留之外还需补足的数量
    pub available: u32,       // 当前可用量
}

/// 台账层错误类型
#[derive(Error, Debug)]
pub enum LedgerError {
    // ===== 预留校验错误 =====
    #[error("库存不足: sku={component_sku}, 申请={requested}, 可用={available}")]
    InsufficientStock {
        component_sku: String,
        requested: u32,
        available: u32,
    },

    #[error("软预留不足: order_id={order_id}, sku={component_sku}, 申请={requested}, 持有={reserved}")]
    InsufficientSoftReservation {
        order_id: String,
        component_sku: String,
        requested: u32,
        reserved: u32,
    },

    #[error("触及硬锁定: sku={component_sku}, 申请={requested}, 软持有={soft_available}, 硬锁定={hard_locked} (硬锁定不可调拨)")]
    ComponentHardLocked {
        component_sku: String,
        requested: u32,
        soft_available: u32,
        hard_locked: u32,
    },

    #[error("硬锁定不足: batch_id={batch_id}, sku={component_sku}, 申请回退={requested}, 持有={locked}")]
    InsufficientHardLock {
        batch_id: String,
        component_sku: String,
        requested: u32,
        locked: u32,
    },

    // ===== 提交期再校验错误 =====
    #[error("提交期间库存并发变化: {}项短缺", shortfalls.len())]
    ConcurrentStockChange { shortfalls: Vec<CommitShortfall> },

    #[error("调拨方案已提交过: plan_id={plan_id}")]
    PlanAlreadyCommitted { plan_id: String },

    // ===== 库存同步错误 =====
    #[error("实物库存低于硬锁定: sku={component_sku}, 实物={physical}, 硬锁定={hard_locked} (致命,需人工审计)")]
    StockBelowHardLock {
        component_sku: String,
        physical: u32,
        hard_locked: u32,
    },

    // ===== 通用错误 =====
    #[error("未知元件: sku={component_sku}")]
    UnknownComponent { component_sku: String },

    #[error("台账锁获取失败: {0}")]
    LockPoisoned(String),
}

/// Result 类型别名
pub type LedgerResult<T> = Result<T, LedgerError>;
