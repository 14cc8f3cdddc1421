// ==========================================
// LED模组批次排产系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::ledger::error::{CommitShortfall, LedgerError};
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 台账透传 =====
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // ===== 批次提交错误 =====
    #[error("提交期间库存并发变化且自动收缩失败: {}项短缺", shortfalls.len())]
    ConcurrentStockChange { shortfalls: Vec<CommitShortfall> },

    #[error("批次草案为空,无可提交行项")]
    EmptyDraft,

    // ===== 序列号分配错误 =====
    #[error("序列号地址空间耗尽: 已签发={issued}, 本次申请={requested} (致命,停止分配)")]
    SerialSpaceExhausted { issued: usize, requested: usize },

    // ===== 完工一致性错误 =====
    #[error("完工状态不一致: order_id={order_id}, 残留硬锁定={residual_hard} (致命,需人工审计)")]
    InconsistentCompletionState {
        order_id: String,
        residual_hard: u32,
    },

    // ===== 通用错误 =====
    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    #[error("无效的状态转换: {entity} from={from} to={to}")]
    InvalidStateTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("状态锁获取失败: {0}")]
    LockPoisoned(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
