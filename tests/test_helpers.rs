// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供编排器搭建、库存种子、订单构造等公共设施
// ==========================================
#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use led_batch_aps::engine::events::{MemoryAlertSink, MemoryHandOffSink};
use led_batch_aps::{
    Component, ComponentRequirement, LineItem, Order, OrderLifecycle, ProductionOrchestrator,
    SchedulerConfig,
};
use std::sync::Arc;

/// 测试环境: 编排器 + 内存协作方
pub struct TestEnv {
    pub orchestrator: Arc<ProductionOrchestrator>,
    pub handoff: Arc<MemoryHandOffSink>,
    pub alerts: Arc<MemoryAlertSink>,
}

/// 搭建默认配置的测试环境(固定序列号种子保证可回放)
pub fn build_env() -> TestEnv {
    build_env_with_config(SchedulerConfig::default())
}

/// 搭建指定配置的测试环境
pub fn build_env_with_config(config: SchedulerConfig) -> TestEnv {
    let handoff = Arc::new(MemoryHandOffSink::new());
    let alerts = Arc::new(MemoryAlertSink::new());
    let orchestrator = Arc::new(ProductionOrchestrator::with_seeded_allocator(
        config,
        handoff.clone(),
        alerts.clone(),
        42,
    ));
    TestEnv {
        orchestrator,
        handoff,
        alerts,
    }
}

/// 种入元件库存
pub fn seed_stock(env: &TestEnv, stock: &[(&str, u32)]) {
    let ledger = env.orchestrator.ledger();
    for (sku, qty) in stock {
        ledger
            .register_component(Component::new(sku.to_string(), *qty))
            .unwrap();
    }
}

/// 构造可排订单
pub fn make_order(order_id: &str) -> Order {
    Order {
        order_id: order_id.to_string(),
        manual_override: None,
        expedite_fee_cents: 0,
        promise_date: None,
        manual_urgent_flag: false,
        lifecycle: OrderLifecycle::Eligible,
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap(),
    }
}

/// 构造单 LED BOM 的行项
pub fn make_item(order_id: &str, line_item_id: &str, required: u32, seq: u64) -> LineItem {
    make_item_with_bom(order_id, line_item_id, &[("LED-W3", 1)], required, seq)
}

/// 构造指定 BOM 的行项
pub fn make_item_with_bom(
    order_id: &str,
    line_item_id: &str,
    bom: &[(&str, u32)],
    required: u32,
    seq: u64,
) -> LineItem {
    LineItem {
        line_item_id: line_item_id.to_string(),
        order_id: order_id.to_string(),
        module_sku: format!("MOD-{}", line_item_id),
        base_type: "SP-9".to_string(),
        components: bom
            .iter()
            .map(|(sku, per)| ComponentRequirement {
                component_sku: sku.to_string(),
                qty_per_unit: *per,
            })
            .collect(),
        required_qty: required,
        created_seq: seq,
    }
}

/// 测试常用日期
pub fn make_date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 校验台账不变量
pub fn assert_ledger_invariant(env: &TestEnv) {
    for comp in env.orchestrator.ledger().snapshot_components().unwrap() {
        assert!(
            comp.invariant_holds(),
            "台账不变量被破坏: sku={}, physical={}, soft={}, hard={}",
            comp.sku,
            comp.physical_stock,
            comp.soft_reserved,
            comp.hard_locked
        );
    }
}
