// ==========================================
// LED模组批次排产系统 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 优先等级 (Priority Tier)
// ==========================================
// 红线: 等级制,不是评分制
// L3 来源: 人工覆盖/超期; L2 来源: 付费加急; L1 来源: 临近交期
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PriorityTier {
    L0, // 正常
    L1, // 临近交期
    L2, // 付费加急
    L3, // 人工覆盖/超期
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityTier::L0 => write!(f, "L0"),
            PriorityTier::L1 => write!(f, "L1"),
            PriorityTier::L2 => write!(f, "L2"),
            PriorityTier::L3 => write!(f, "L3"),
        }
    }
}

// ==========================================
// 预留层级 (Reservation Tier)
// ==========================================
// 软预留: 订单级临时占用,可在订单间调拨
// 硬锁定: 批次级确定占用,任何路径不可调拨
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationTier {
    Soft,
    Hard,
}

impl fmt::Display for ReservationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationTier::Soft => write!(f, "SOFT"),
            ReservationTier::Hard => write!(f, "HARD"),
        }
    }
}

// ==========================================
// 订单生命周期 (Order Lifecycle)
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与外部订单系统一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderLifecycle {
    Intake,    // 已录入,未进入可排队列
    Eligible,  // 可排产(已建立软预留)
    Completed, // 全部完工,已交接
    Cancelled, // 已撤单
}

impl fmt::Display for OrderLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderLifecycle::Intake => write!(f, "INTAKE"),
            OrderLifecycle::Eligible => write!(f, "ELIGIBLE"),
            OrderLifecycle::Completed => write!(f, "COMPLETED"),
            OrderLifecycle::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// ==========================================
// 批次状态 (Batch Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    InProgress, // 在制
    Complete,   // 已完工(元件已消耗)
    Cancelled,  // 已取消(硬锁定退回软预留)
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::InProgress => write!(f, "IN_PROGRESS"),
            BatchStatus::Complete => write!(f, "COMPLETE"),
            BatchStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// ==========================================
// 订单完工状态 (Completion State)
// ==========================================
// 纯派生: built_qty 对 required_qty 的函数,单向推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionState {
    NotStarted,        // 未开工
    PartiallyComplete, // 部分完工(跨批次进行中)
    FullyComplete,     // 全部完工
}

impl fmt::Display for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionState::NotStarted => write!(f, "NOT_STARTED"),
            CompletionState::PartiallyComplete => write!(f, "PARTIALLY_COMPLETE"),
            CompletionState::FullyComplete => write!(f, "FULLY_COMPLETE"),
        }
    }
}

// ==========================================
// 成品单元状态 (Unit Status)
// ==========================================
// 红线: 作废只翻状态位,序列号永久退役不回收
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Active, // 正常
    Void,   // 已作废(报废/弃单)
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Active => write!(f, "ACTIVE"),
            UnitStatus::Void => write!(f, "VOID"),
        }
    }
}
