// ==========================================
// LED模组批次排产系统 - 核心库
// ==========================================
// 技术栈: Rust + tokio
// 系统定位: 决策支持系统 (人工最终控制权)
// 核心: 元件预留台账 + 批次构图 + 永久序列号分配
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 台账层 - 元件供需唯一事实层
pub mod ledger;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    BatchStatus, CompletionState, OrderLifecycle, PriorityTier, ReservationTier, UnitStatus,
};

// 领域实体
pub use domain::{
    Batch, BatchDraft, BatchLine, Component, ComponentRequirement, DraftLine, LineItem,
    ManufacturedUnit, Order, Reservation, UnitSerial, SERIAL_SPACE,
};

// 台账
pub use ledger::{
    BatchDemand, HardRelease, LedgerError, LedgerResult, ReallocationImpact, ReallocationPlan,
    ReallocationRequest, ReservationLedger, StockSyncReport,
};

// 引擎
pub use engine::{
    BatchComposer, CompletionTracker, EngineError, EngineResult, EngravingRow, PriorityEngine,
    PriorityScore, ProductionOrchestrator, StallMonitor, UnitRegistry, UnitSerialAllocator,
};

// 协作方接口
pub use engine::{
    AlertKind, AlertMessage, AlertSink, HandOffEvent, HandOffSink, StockLevel, StockSource,
};

// 配置
pub use config::{ComposerConfig, PriorityConfig, SchedulerConfig, StallConfig};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "LED模组批次排产系统";

// ==========================================
// 预编译检查
// ==========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
