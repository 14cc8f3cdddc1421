// ==========================================
// LED模组批次排产系统 - 批次领域模型
// ==========================================
// 红线: 单批次只允许一种 base_type (换产边界)
// 在制批次独占其构成清单; Complete/Cancelled 后构成清单为只读历史
// ==========================================

use crate::domain::types::{BatchStatus, PriorityTier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// BatchLine - 批次构成行
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchLine {
    pub order_id: String,
    pub line_item_id: String,
    pub committed_qty: u32, // 本批次承诺生产数量
}

// ==========================================
// Batch - 生产批次
// ==========================================
// 创建与硬预留原子同生; Cancelled 时硬锁定全部退回来源订单软预留
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    // ===== 主键 =====
    pub batch_id: String,

    // ===== 约束维度 =====
    pub base_type: String, // PCB 基板型号(单一)

    // ===== 状态 =====
    pub status: BatchStatus,

    // ===== 构成(有序) =====
    pub lines: Vec<BatchLine>,
    pub total_qty: u32,

    // ===== 阵列信息 =====
    pub array_size: u32,
    pub array_count: u32,
    pub partial_array_remainder: u32,

    // ===== 审计字段 =====
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>, // 停滞监控依据
}

impl Batch {
    /// 刷新活动时间(外部显式动作,用于复位停滞计时)
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    /// 指定行项的承诺数量
    pub fn committed_for(&self, line_item_id: &str) -> u32 {
        self.lines
            .iter()
            .filter(|l| l.line_item_id == line_item_id)
            .map(|l| l.committed_qty)
            .sum()
    }
}

// ==========================================
// DraftLine - 草案行
// ==========================================
// 携带构图期的优先等级与裁边量,便于审计解释
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftLine {
    pub order_id: String,
    pub line_item_id: String,
    pub qty: u32,
    pub tier: PriorityTier,
    pub trimmed_qty: u32, // 为对齐阵列从尾部裁掉的数量(0=未裁)
}

// ==========================================
// BatchDraft - 批次草案
// ==========================================
// compose_batch 的输出,commit 前不占用任何硬资源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDraft {
    pub base_type: String,
    pub lines: Vec<DraftLine>,
    pub total_qty: u32,
    pub array_size: u32,
    pub array_count: u32,
    pub partial_array_remainder: u32,
}

impl BatchDraft {
    /// 草案是否为空(无可排行项)
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() || self.total_qty == 0
    }
}
