// ==========================================
// LED模组批次排产系统 - 领域层
// ==========================================
// 职责: 实体与类型定义,不含业务规则
// ==========================================

pub mod batch;
pub mod component;
pub mod order;
pub mod reservation;
pub mod types;
pub mod unit;

// 重导出核心实体
pub use batch::{Batch, BatchDraft, BatchLine, DraftLine};
pub use component::Component;
pub use order::{ComponentRequirement, LineItem, Order};
pub use reservation::Reservation;
pub use types::{
    BatchStatus, CompletionState, OrderLifecycle, PriorityTier, ReservationTier, UnitStatus,
};
pub use unit::{ManufacturedUnit, UnitSerial, SERIAL_SPACE};
