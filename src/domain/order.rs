// ==========================================
// LED模组批次排产系统 - 订单领域模型
// ==========================================
// 用途: 外部订单系统导入,本核心只读业务字段
// 本核心拥有的字段: 生产生命周期状态
// ==========================================

use crate::domain::types::OrderLifecycle;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Order - 订单
// ==========================================
// 排序输入字段由计划员角色维护,引擎层只读
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    // ===== 主键 =====
    pub order_id: String, // 订单唯一标识(订单号)

    // ===== 排序输入 =====
    pub manual_override: Option<i32>,  // 人工优先级覆盖(设置即压倒一切,越大越优先)
    pub expedite_fee_cents: i64,       // 付费加急金额(分,0=未加急,与费用档位单调)
    pub promise_date: Option<NaiveDate>, // 承诺交期
    pub manual_urgent_flag: bool,      // 人工紧急标志(禁止阵列裁边)

    // ===== 生命周期 =====
    pub lifecycle: OrderLifecycle, // 生产生命周期状态(本核心唯一可写的订单字段)

    // ===== 审计字段 =====
    pub created_at: DateTime<Utc>, // 订单创建时间(年龄兜底排序键)
}

impl Order {
    /// 是否处于可排产状态
    pub fn is_eligible(&self) -> bool {
        self.lifecycle == OrderLifecycle::Eligible
    }
}

// ==========================================
// ComponentRequirement - 单模组元件需求
// ==========================================
// 一个模组单元同时消耗 100% 元件(不可逆封装,无部分配料概念)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRequirement {
    pub component_sku: String, // 元件SKU(LED/透镜/连接器等)
    pub qty_per_unit: u32,     // 单模组用量(同型LED可多颗)
}

// ==========================================
// LineItem - 订单行项
// ==========================================
// 红线: base_type 与元件配置创建后不可变
// required_qty 可由外部订单变更事件调整(只标记,不自动消解)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    // ===== 主键与关联 =====
    pub line_item_id: String, // 行项唯一标识
    pub order_id: String,     // 所属订单(恰好一个)

    // ===== 模组设计 =====
    pub module_sku: String, // 模组设计编号(成品SKU)
    pub base_type: String,  // PCB 基板型号(换产边界,单批次约束)
    pub components: Vec<ComponentRequirement>, // 元件配置(单模组BOM)

    // ===== 数量 =====
    pub required_qty: u32, // 需求数量

    // ===== 排序辅助 =====
    pub created_seq: u64, // 行项创建序号(FIFO 同分兜底)
}

impl LineItem {
    /// 指定数量的模组对各 SKU 的总需求
    ///
    /// # 返回
    /// (component_sku, 总数量) 列表,按 BOM 顺序
    pub fn demand_for(&self, units: u32) -> Vec<(String, u32)> {
        self.components
            .iter()
            .map(|req| (req.component_sku.clone(), req.qty_per_unit * units))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demand_for_multiplies_per_unit_qty() {
        let item = LineItem {
            line_item_id: "LI-1".to_string(),
            order_id: "SO-1".to_string(),
            module_sku: "LXS-9-W".to_string(),
            base_type: "SP-9".to_string(),
            components: vec![
                ComponentRequirement {
                    component_sku: "LED-W3".to_string(),
                    qty_per_unit: 3,
                },
                ComponentRequirement {
                    component_sku: "LENS-N".to_string(),
                    qty_per_unit: 1,
                },
            ],
            required_qty: 50,
            created_seq: 1,
        };

        let demand = item.demand_for(10);
        assert_eq!(demand.len(), 2);
        assert_eq!(demand[0], ("LED-W3".to_string(), 30));
        assert_eq!(demand[1], ("LENS-N".to_string(), 10));
    }
}
