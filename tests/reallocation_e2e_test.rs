// ==========================================
// 软预留调拨 E2E 测试
// ==========================================
// 两阶段调拨: 预演(影响摘要) → 人工确认 → 提交
// 红线验证: 硬锁定永远不是调拨对象
// ==========================================

mod test_helpers;

use led_batch_aps::{AlertKind, LedgerError, ReallocationRequest};
use test_helpers::*;

fn request(from: &str, to: &str, sku: &str, qty: u32) -> ReallocationRequest {
    ReallocationRequest {
        from_order_id: from.to_string(),
        to_order_id: to.to_string(),
        component_sku: sku.to_string(),
        qty,
    }
}

#[test]
fn test_two_phase_reallocation_with_impact() {
    let env = build_env();
    seed_stock(&env, &[("X", 100)]);

    // 订单1 先到,软预留 80; 订单2 (更高优先) 只拿到 20
    env.orchestrator
        .admit_order(make_order("SO-1"), vec![make_item_with_bom("SO-1", "LI-1", &[("X", 1)], 80, 1)])
        .unwrap();
    let mut vip = make_order("SO-2");
    vip.manual_override = Some(5);
    env.orchestrator
        .admit_order(vip, vec![make_item_with_bom("SO-2", "LI-2", &[("X", 1)], 50, 2)])
        .unwrap();

    let ledger = env.orchestrator.ledger();
    assert_eq!(ledger.soft_reserved_for("SO-1", "X").unwrap(), 80);
    assert_eq!(ledger.soft_reserved_for("SO-2", "X").unwrap(), 20);
    assert_eq!(ledger.availability("X").unwrap(), 0);

    // 预演: 调 30 给订单2,影响摘要指出订单1 失去可建能力
    let plan = env
        .orchestrator
        .preview_reallocation(request("SO-1", "SO-2", "X", 30))
        .unwrap();
    assert_eq!(plan.impact.losing_orders, vec!["SO-1".to_string()]);
    let change = plan
        .impact
        .changes
        .iter()
        .find(|c| c.order_id == "SO-1")
        .unwrap();
    assert_eq!(change.buildable_before, 80);
    assert_eq!(change.buildable_after, 50);

    // 预演不落账
    assert_eq!(ledger.soft_reserved_for("SO-1", "X").unwrap(), 80);

    // 人工确认后提交
    env.orchestrator.commit_reallocation(&plan).unwrap();
    assert_eq!(ledger.soft_reserved_for("SO-1", "X").unwrap(), 50);
    assert_eq!(ledger.soft_reserved_for("SO-2", "X").unwrap(), 50);
    assert_eq!(ledger.availability("X").unwrap(), 0); // 可用量不变
    assert_ledger_invariant(&env);

    // 调拨影响已通报告警方
    assert_eq!(env.alerts.messages_of(AlertKind::ReallocationImpact).len(), 1);
}

#[test]
fn test_reallocation_rejected_when_hard_locked() {
    let env = build_env();
    seed_stock(&env, &[("LED-W3", 100)]);

    env.orchestrator
        .admit_order(make_order("SO-1"), vec![make_item("SO-1", "LI-1", 80, 1)])
        .unwrap();
    env.orchestrator
        .admit_order(make_order("SO-2"), vec![make_item("SO-2", "LI-2", 40, 2)])
        .unwrap();

    // 订单1 的 60 个被批次硬锁定,软层只剩 20
    let draft = env.orchestrator.compose_batch("SP-9", 60, 1).unwrap();
    env.orchestrator.commit_batch(&draft).unwrap();
    let ledger = env.orchestrator.ledger();
    assert_eq!(ledger.soft_reserved_for("SO-1", "LED-W3").unwrap(), 20);
    assert_eq!(ledger.hard_locked_for_order("SO-1").unwrap(), 60);

    // 申请 30 > 软层 20: 触及硬锁定,永远拒绝
    let err = env
        .orchestrator
        .preview_reallocation(request("SO-1", "SO-2", "LED-W3", 30))
        .unwrap_err();
    assert!(matches!(
        err,
        led_batch_aps::EngineError::Ledger(LedgerError::ComponentHardLocked { .. })
    ));

    // 软层以内的调拨仍然可行
    let plan = env
        .orchestrator
        .preview_reallocation(request("SO-1", "SO-2", "LED-W3", 20))
        .unwrap();
    env.orchestrator.commit_reallocation(&plan).unwrap();
    assert_eq!(ledger.soft_reserved_for("SO-1", "LED-W3").unwrap(), 0);
    assert_eq!(ledger.hard_locked_for_order("SO-1").unwrap(), 60); // 硬锁定原封不动
    assert_ledger_invariant(&env);
}

#[test]
fn test_stale_plan_rejected_after_world_moved() {
    let env = build_env();
    seed_stock(&env, &[("LED-W3", 100)]);

    env.orchestrator
        .admit_order(make_order("SO-1"), vec![make_item("SO-1", "LI-1", 80, 1)])
        .unwrap();
    env.orchestrator
        .admit_order(make_order("SO-2"), vec![make_item("SO-2", "LI-2", 40, 2)])
        .unwrap();

    let plan = env
        .orchestrator
        .preview_reallocation(request("SO-1", "SO-2", "LED-W3", 50))
        .unwrap();

    // 预演与提交之间,订单1 的软层被批次吃掉
    let draft = env.orchestrator.compose_batch("SP-9", 60, 1).unwrap();
    env.orchestrator.commit_batch(&draft).unwrap();

    let err = env.orchestrator.commit_reallocation(&plan).unwrap_err();
    assert!(matches!(
        err,
        led_batch_aps::EngineError::Ledger(LedgerError::ConcurrentStockChange { .. })
    ));
    assert_ledger_invariant(&env);
}
