// ==========================================
// LED模组批次排产系统 - 元件领域模型
// ==========================================
// physical_stock 以外部库存系统为准,本核心只维护软/硬预留叠加层
// 红线: soft_reserved + hard_locked <= physical_stock 在每次台账变更后必须成立
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Component - 库存元件
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    // ===== 主键 =====
    pub sku: String, // 元件SKU

    // ===== 描述 =====
    pub description: Option<String>,

    // ===== 计数器 =====
    pub physical_stock: u32, // 实物库存(外部权威)
    pub soft_reserved: u32,  // 软预留合计
    pub hard_locked: u32,    // 硬锁定合计
}

impl Component {
    /// 新建元件(预留计数清零)
    pub fn new(sku: impl Into<String>, physical_stock: u32) -> Self {
        Self {
            sku: sku.into(),
            description: None,
            physical_stock,
            soft_reserved: 0,
            hard_locked: 0,
        }
    }

    /// 计划可用量 = 实物库存 - 软预留 - 硬锁定
    pub fn availability(&self) -> u32 {
        self.physical_stock
            .saturating_sub(self.soft_reserved)
            .saturating_sub(self.hard_locked)
    }

    /// 台账不变量检查
    pub fn invariant_holds(&self) -> bool {
        self.soft_reserved + self.hard_locked <= self.physical_stock
    }
}
