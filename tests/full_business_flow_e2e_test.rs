// ==========================================
// 全业务流 E2E 测试
// ==========================================
// 流程: 库存同步 → 订单准入(软预留) → 构图 → 提交(硬锁定+序列号)
//       → 刻印导出 → 分批完工 → 交接 → 台账清账
// ==========================================

mod test_helpers;

use led_batch_aps::engine::events::StockLevel;
use led_batch_aps::{
    AlertKind, BatchStatus, CompletionState, EngineError, OrderLifecycle, StockSource, UnitStatus,
};
use test_helpers::*;

#[test]
fn test_full_flow_single_order_two_batches() {
    let env = build_env();
    seed_stock(&env, &[("LED-W3", 200), ("LENS-N", 100)]);

    // 准入: 需求 50,BOM 每模组 2 颗 LED + 1 个透镜
    let order = make_order("SO-1");
    let item = make_item_with_bom("SO-1", "LI-1", &[("LED-W3", 2), ("LENS-N", 1)], 50, 1);
    env.orchestrator.admit_order(order, vec![item]).unwrap();

    // 软预留已建立: 100 颗 LED + 50 个透镜
    let ledger = env.orchestrator.ledger();
    assert_eq!(ledger.soft_reserved_for("SO-1", "LED-W3").unwrap(), 100);
    assert_eq!(ledger.soft_reserved_for("SO-1", "LENS-N").unwrap(), 50);
    assert_ledger_invariant(&env);

    // 第一批: 容量 30,阵列 8 → 低等级行项裁到 24 (3 个整阵列)
    let draft1 = env.orchestrator.compose_batch("SP-9", 30, 8).unwrap();
    assert_eq!(draft1.total_qty, 24);
    assert_eq!(draft1.array_count, 3);
    assert_eq!(draft1.partial_array_remainder, 0);

    let batch1 = env.orchestrator.commit_batch(&draft1).unwrap();
    assert_eq!(batch1.status, BatchStatus::InProgress);
    assert_eq!(ledger.hard_locked_for_order("SO-1").unwrap(), 24 * 2 + 24);
    assert_ledger_invariant(&env);

    // 刻印导出: 每单元一行,复导出重现同批序列号
    let rows = env.orchestrator.export_engraving(&batch1.batch_id).unwrap();
    assert_eq!(rows.len(), 24);
    assert!(rows.iter().all(|r| r.order_id == "SO-1"));
    let again = env.orchestrator.export_engraving(&batch1.batch_id).unwrap();
    let serials_a: Vec<u32> = rows.iter().map(|r| r.unit_serial.value()).collect();
    let serials_b: Vec<u32> = again.iter().map(|r| r.unit_serial.value()).collect();
    assert_eq!(serials_a, serials_b);

    // 序列号渲染: 零填充 8 位
    assert!(rows.iter().all(|r| r.unit_serial.to_string().len() == 8));

    // 第一批完工: 元件消耗,订单部分完工
    let completed = env.orchestrator.complete_batch(&batch1.batch_id).unwrap();
    assert!(completed.is_empty());
    assert_eq!(
        env.orchestrator.completion_state("SO-1").unwrap(),
        CompletionState::PartiallyComplete
    );
    assert_eq!(ledger.hard_locked_for_order("SO-1").unwrap(), 0);
    assert!(env.handoff.events().is_empty());
    assert_ledger_invariant(&env);

    // 第二批: 剩余 26,容量放开 → 全部完工
    let draft2 = env.orchestrator.compose_batch("SP-9", 100, 1).unwrap();
    assert_eq!(draft2.total_qty, 26);
    let batch2 = env.orchestrator.commit_batch(&draft2).unwrap();
    let completed = env.orchestrator.complete_batch(&batch2.batch_id).unwrap();
    assert_eq!(completed, vec!["SO-1".to_string()]);

    // 交接: 幂等一次性事件
    assert_eq!(
        env.orchestrator.completion_state("SO-1").unwrap(),
        CompletionState::FullyComplete
    );
    assert_eq!(
        env.orchestrator.order_lifecycle("SO-1").unwrap(),
        Some(OrderLifecycle::Completed)
    );
    let events = env.handoff.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].order_id, "SO-1");
    assert_eq!(events[0].total_built, 50);

    // 清账: 完工订单无任何预留残留
    assert_eq!(ledger.soft_reserved_for("SO-1", "LED-W3").unwrap(), 0);
    assert_eq!(ledger.hard_locked_for_order("SO-1").unwrap(), 0);
    assert_ledger_invariant(&env);
}

#[test]
fn test_priority_ordering_in_composition() {
    let env = build_env();
    seed_stock(&env, &[("LED-W3", 60)]);

    // 普通订单先准入并吃掉大部分软预留
    let plain = make_order("SO-PLAIN");
    env.orchestrator
        .admit_order(plain, vec![make_item("SO-PLAIN", "LI-P", 40, 1)])
        .unwrap();

    // 人工覆盖订单后到,只拿到剩余 20 的软预留
    let mut vip = make_order("SO-VIP");
    vip.manual_override = Some(10);
    env.orchestrator
        .admit_order(vip, vec![make_item("SO-VIP", "LI-V", 30, 2)])
        .unwrap();

    // 构图: 覆盖单排最前且取全量(受供给限制),不受容量提示约束
    let draft = env.orchestrator.compose_batch("SP-9", 50, 1).unwrap();
    assert_eq!(draft.lines[0].order_id, "SO-VIP");
    assert_eq!(draft.lines[0].qty, 20);
}

#[test]
fn test_cancel_batch_returns_hard_to_soft() {
    let env = build_env();
    seed_stock(&env, &[("LED-W3", 100)]);

    env.orchestrator
        .admit_order(make_order("SO-1"), vec![make_item("SO-1", "LI-1", 40, 1)])
        .unwrap();

    let draft = env.orchestrator.compose_batch("SP-9", 100, 1).unwrap();
    let batch = env.orchestrator.commit_batch(&draft).unwrap();
    let ledger = env.orchestrator.ledger();
    assert_eq!(ledger.hard_locked_for_order("SO-1").unwrap(), 40);

    env.orchestrator.cancel_batch(&batch.batch_id).unwrap();

    // 取消: 硬锁定全额退回软预留,订单可重新排产
    assert_eq!(ledger.hard_locked_for_order("SO-1").unwrap(), 0);
    assert_eq!(ledger.soft_reserved_for("SO-1", "LED-W3").unwrap(), 40);
    assert_eq!(
        env.orchestrator.completion_state("SO-1").unwrap(),
        CompletionState::NotStarted
    );
    assert_ledger_invariant(&env);

    // 已取消批次不可再转换
    let err = env.orchestrator.complete_batch(&batch.batch_id).unwrap_err();
    assert!(matches!(err, EngineError::InvalidStateTransition { .. }));

    // 重新构图可再次覆盖同样数量
    let redraft = env.orchestrator.compose_batch("SP-9", 100, 1).unwrap();
    assert_eq!(redraft.total_qty, 40);
}

#[test]
fn test_adjust_batch_quantity_auditable() {
    let env = build_env();
    seed_stock(&env, &[("LED-W3", 100)]);

    env.orchestrator
        .admit_order(make_order("SO-1"), vec![make_item("SO-1", "LI-1", 60, 1)])
        .unwrap();
    let draft = env.orchestrator.compose_batch("SP-9", 40, 1).unwrap();
    let batch = env.orchestrator.commit_batch(&draft).unwrap();
    assert_eq!(batch.total_qty, 40);

    // 下调到 30: 预留退回软层,行尾 10 个单元作废
    env.orchestrator
        .adjust_batch_quantity(&batch.batch_id, "LI-1", 30)
        .unwrap();

    let ledger = env.orchestrator.ledger();
    assert_eq!(ledger.hard_locked_for_order("SO-1").unwrap(), 30);
    let units = env
        .orchestrator
        .registry()
        .units_for_batch(&batch.batch_id)
        .unwrap();
    assert_eq!(units.len(), 40); // 单元永不删除
    let voided = units.iter().filter(|u| u.status == UnitStatus::Void).count();
    assert_eq!(voided, 10);

    // 上调到 45: 追加硬预留并补签 15 枚新序列号
    env.orchestrator
        .adjust_batch_quantity(&batch.batch_id, "LI-1", 45)
        .unwrap();
    assert_eq!(ledger.hard_locked_for_order("SO-1").unwrap(), 45);
    let units = env
        .orchestrator
        .registry()
        .units_for_batch(&batch.batch_id)
        .unwrap();
    assert_eq!(units.len(), 55);

    // 调整动作有告警留痕
    assert_eq!(env.alerts.messages_of(AlertKind::QuantityAdjusted).len(), 2);

    // 批次档案同步
    let snapshot = env.orchestrator.batch(&batch.batch_id).unwrap().unwrap();
    assert_eq!(snapshot.total_qty, 45);
    assert_ledger_invariant(&env);
}

#[test]
fn test_withdraw_order_releases_soft() {
    let env = build_env();
    seed_stock(&env, &[("LED-W3", 100)]);

    env.orchestrator
        .admit_order(make_order("SO-1"), vec![make_item("SO-1", "LI-1", 60, 1)])
        .unwrap();
    let ledger = env.orchestrator.ledger();
    assert_eq!(ledger.availability("LED-W3").unwrap(), 40);

    let released = env.orchestrator.withdraw_order("SO-1").unwrap();
    assert_eq!(released, 60);
    assert_eq!(ledger.availability("LED-W3").unwrap(), 100);
    assert_eq!(
        env.orchestrator.order_lifecycle("SO-1").unwrap(),
        Some(OrderLifecycle::Cancelled)
    );

    // 撤销订单不再参与构图
    let draft = env.orchestrator.compose_batch("SP-9", 100, 1).unwrap();
    assert!(draft.is_empty());
}

// ==========================================
// 库存同步
// ==========================================

struct FixedStockSource {
    levels: Vec<StockLevel>,
}

#[async_trait::async_trait]
impl StockSource for FixedStockSource {
    async fn fetch_stock_levels(&self) -> anyhow::Result<Vec<StockLevel>> {
        Ok(self.levels.clone())
    }
}

#[tokio::test]
async fn test_stock_sync_squeezes_soft_and_alerts() {
    let env = build_env();
    seed_stock(&env, &[("LED-W3", 100)]);

    env.orchestrator
        .admit_order(make_order("SO-1"), vec![make_item("SO-1", "LI-1", 80, 1)])
        .unwrap();

    // 外部盘点下调到 60: 软预留 80 被压缩到 60
    let source = FixedStockSource {
        levels: vec![StockLevel {
            component_sku: "LED-W3".to_string(),
            physical_qty: 60,
        }],
    };
    let report = env.orchestrator.sync_stock(&source).await.unwrap();
    assert_eq!(report.updated, 1);
    let squeezed: u32 = report.squeezes.iter().map(|s| s.qty_removed).sum();
    assert_eq!(squeezed, 20);

    assert_eq!(env.alerts.messages_of(AlertKind::StockSqueeze).len(), 1);
    assert_ledger_invariant(&env);
}

#[test]
fn test_reservation_shortfall_flagged_not_failed() {
    let env = build_env();
    seed_stock(&env, &[("LED-W3", 30)]);

    // 需求 50 > 库存 30: 准入成功,拿到 30,缺口告警
    env.orchestrator
        .admit_order(make_order("SO-1"), vec![make_item("SO-1", "LI-1", 50, 1)])
        .unwrap();

    let ledger = env.orchestrator.ledger();
    assert_eq!(ledger.soft_reserved_for("SO-1", "LED-W3").unwrap(), 30);

    let alerts = env.alerts.messages_of(AlertKind::ReservationShortfall);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].subject_id, "SO-1");
}
