// ==========================================
// LED模组批次排产系统 - 成品单元领域模型
// ==========================================
// 序列号: 20 位地址空间 (0-1048575),零填充 8 位渲染
// 红线: 永久记录,只作废不删除,序列号不回收
// ==========================================

use crate::domain::types::UnitStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 序列号地址空间上限(20 位)
pub const SERIAL_SPACE: u32 = 1 << 20;

// ==========================================
// UnitSerial - 单元序列号
// ==========================================
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UnitSerial(pub u32);

impl UnitSerial {
    /// 构造序列号,校验地址空间边界
    pub fn new(value: u32) -> Option<Self> {
        if value < SERIAL_SPACE {
            Some(Self(value))
        } else {
            None
        }
    }

    /// 原始数值
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for UnitSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

// ==========================================
// ManufacturedUnit - 成品单元
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManufacturedUnit {
    // ===== 主键 =====
    pub serial: UnitSerial,

    // ===== 回溯关联 =====
    pub batch_id: String,
    pub order_id: String,
    pub line_item_id: String,
    pub module_sku: String,

    // ===== 状态 =====
    pub status: UnitStatus,

    // ===== 审计字段 =====
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_rendering_zero_padded() {
        let serial = UnitSerial::new(42).unwrap();
        assert_eq!(serial.to_string(), "00000042");

        let max = UnitSerial::new(SERIAL_SPACE - 1).unwrap();
        assert_eq!(max.to_string(), "01048575");
    }

    #[test]
    fn test_serial_out_of_space_rejected() {
        assert!(UnitSerial::new(SERIAL_SPACE).is_none());
        assert!(UnitSerial::new(u32::MAX).is_none());
    }
}
