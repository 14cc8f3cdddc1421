// ==========================================
// LED模组批次排产系统 - 元件预留台账
// ==========================================
// 职责: 元件供需唯一事实层,软预留/硬锁定两级叠加
// 红线: soft_reserved + hard_locked <= physical_stock
// 红线: 单逻辑操作的全部副作用要么全部生效要么全部不生效
// 并发模型: 单写者,全部变更在同一把内部锁下先校验后落账
// ==========================================

use crate::domain::component::Component;
use crate::domain::order::LineItem;
use crate::domain::reservation::Reservation;
use crate::domain::types::ReservationTier;
use crate::ledger::error::{CommitShortfall, LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::instrument;

// ==========================================
// 辅助类型
// ==========================================

/// 批次提交的元件需求行(已按行项×BOM 展开)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDemand {
    pub order_id: String,
    pub component_sku: String,
    pub qty: u32,
}

/// 硬锁定释放方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardRelease {
    /// 批次完工: 元件已消耗,锁定量连同实物库存一并扣除
    Consume,
    /// 批次取消: 锁定量退回来源订单的软预留
    ReturnToSoft,
}

/// 库存同步时被压缩的软预留明细
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftSqueeze {
    pub order_id: String,
    pub component_sku: String,
    pub qty_removed: u32,
}

/// 库存同步结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockSyncReport {
    pub updated: usize,
    pub created: usize,
    pub squeezes: Vec<SoftSqueeze>,
}

// ==========================================
// LedgerState - 锁内状态
// ==========================================
pub(crate) struct LedgerState {
    pub(crate) components: HashMap<String, Component>,
    pub(crate) reservations: Vec<Reservation>,
    pub(crate) consumed_plans: HashSet<String>,
}

impl LedgerState {
    /// 订单对某 SKU 的软预留持有量
    pub(crate) fn soft_qty(&self, order_id: &str, sku: &str) -> u32 {
        self.reservations
            .iter()
            .filter(|r| r.is_soft_of(order_id, sku))
            .map(|r| r.qty)
            .sum()
    }

    /// 订单在某 SKU 上的硬锁定量(来源口径)
    pub(crate) fn hard_qty_on_sku(&self, order_id: &str, sku: &str) -> u32 {
        self.reservations
            .iter()
            .filter(|r| {
                r.tier == ReservationTier::Hard
                    && r.order_id == order_id
                    && r.component_sku == sku
            })
            .map(|r| r.qty)
            .sum()
    }

    /// 可用量(未知 SKU 视为 0)
    pub(crate) fn availability_of(&self, sku: &str) -> u32 {
        self.components
            .get(sku)
            .map(|c| c.availability())
            .unwrap_or(0)
    }

    /// 订单行项的可建数量(仅供给口径)
    ///
    /// = floor_min_sku((自有软预留 + 自由可用量) / 单件用量)
    /// soft_delta 用于调拨预演: 对该订单在指定 SKU 上的软持有做假设性增减
    pub(crate) fn buildable_for(
        &self,
        order_id: &str,
        item: &LineItem,
        soft_delta: Option<(&str, i64)>,
    ) -> u32 {
        let mut limit = u32::MAX;
        for req in &item.components {
            if req.qty_per_unit == 0 {
                continue;
            }
            let mut own_soft = i64::from(self.soft_qty(order_id, &req.component_sku));
            if let Some((sku, delta)) = soft_delta {
                if sku == req.component_sku {
                    own_soft += delta;
                }
            }
            let own_soft = own_soft.max(0) as u32;
            let supply = own_soft.saturating_add(self.availability_of(&req.component_sku));
            limit = limit.min(supply / req.qty_per_unit);
        }
        // 无元件需求的行项视为不受供给约束
        limit
    }

    /// 落账: 软预留(调用前必须已校验可用量)
    fn apply_soft_reserve(&mut self, order_id: &str, sku: &str, qty: u32, now: DateTime<Utc>) {
        if qty == 0 {
            return;
        }
        if let Some(comp) = self.components.get_mut(sku) {
            comp.soft_reserved += qty;
        }
        if let Some(row) = self
            .reservations
            .iter_mut()
            .find(|r| r.is_soft_of(order_id, sku))
        {
            row.qty += qty;
            row.updated_at = now;
        } else {
            self.reservations
                .push(Reservation::soft(order_id, sku, qty, now));
        }
    }

    /// 落账: 软预留 → 硬锁定(调用前必须已校验软持有量)
    fn move_soft_to_hard(
        &mut self,
        order_id: &str,
        batch_id: &str,
        sku: &str,
        qty: u32,
        now: DateTime<Utc>,
    ) {
        if qty == 0 {
            return;
        }
        // 扣减软预留行
        let mut remaining = qty;
        for row in self
            .reservations
            .iter_mut()
            .filter(|r| r.is_soft_of(order_id, sku))
        {
            let take = row.qty.min(remaining);
            row.qty -= take;
            row.updated_at = now;
            remaining -= take;
            if remaining == 0 {
                break;
            }
        }
        self.reservations.retain(|r| r.qty > 0);

        // 计数器迁移
        if let Some(comp) = self.components.get_mut(sku) {
            comp.soft_reserved = comp.soft_reserved.saturating_sub(qty);
            comp.hard_locked += qty;
        }

        // 并入批次硬锁定行
        if let Some(row) = self.reservations.iter_mut().find(|r| {
            r.is_hard_of(batch_id) && r.order_id == order_id && r.component_sku == sku
        }) {
            row.qty += qty;
            row.updated_at = now;
        } else {
            self.reservations
                .push(Reservation::hard(order_id, batch_id, sku, qty, now));
        }
    }

    /// 落账: 硬锁定 → 软预留(批次取消/数量下调,调用前必须已校验锁定量)
    fn move_hard_to_soft(
        &mut self,
        order_id: &str,
        batch_id: &str,
        sku: &str,
        qty: u32,
        now: DateTime<Utc>,
    ) {
        if qty == 0 {
            return;
        }
        let mut remaining = qty;
        for row in self.reservations.iter_mut() {
            if row.is_hard_of(batch_id) && row.order_id == order_id && row.component_sku == sku {
                let take = row.qty.min(remaining);
                row.qty -= take;
                row.updated_at = now;
                remaining -= take;
                if remaining == 0 {
                    break;
                }
            }
        }
        self.reservations.retain(|r| r.qty > 0);

        if let Some(comp) = self.components.get_mut(sku) {
            comp.hard_locked = comp.hard_locked.saturating_sub(qty);
            comp.soft_reserved += qty;
        }
        self.apply_soft_reserve_counterless(order_id, sku, qty, now);
    }

    /// 仅并入软预留行,不动计数器(move_hard_to_soft 已迁移计数器)
    fn apply_soft_reserve_counterless(
        &mut self,
        order_id: &str,
        sku: &str,
        qty: u32,
        now: DateTime<Utc>,
    ) {
        if let Some(row) = self
            .reservations
            .iter_mut()
            .find(|r| r.is_soft_of(order_id, sku))
        {
            row.qty += qty;
            row.updated_at = now;
        } else {
            self.reservations
                .push(Reservation::soft(order_id, sku, qty, now));
        }
    }

    /// 不变量巡检: 任何违反都属于实现缺陷
    fn check_invariant(&self) {
        for comp in self.components.values() {
            if !comp.invariant_holds() {
                tracing::error!(
                    sku = %comp.sku,
                    physical = comp.physical_stock,
                    soft = comp.soft_reserved,
                    hard = comp.hard_locked,
                    "台账不变量被破坏"
                );
                debug_assert!(false, "台账不变量被破坏: sku={}", comp.sku);
            }
        }
    }
}

// ==========================================
// ReservationLedger - 预留台账
// ==========================================
pub struct ReservationLedger {
    inner: Mutex<LedgerState>,
}

impl ReservationLedger {
    /// 创建空台账
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerState {
                components: HashMap::new(),
                reservations: Vec::new(),
                consumed_plans: HashSet::new(),
            }),
        }
    }

    /// 获取状态锁(毒化锁视为不可恢复的内部错误)
    pub(crate) fn guard(&self) -> LedgerResult<MutexGuard<'_, LedgerState>> {
        self.inner
            .lock()
            .map_err(|e| LedgerError::LockPoisoned(e.to_string()))
    }

    // ==========================================
    // 元件登记与库存同步
    // ==========================================

    /// 登记/更新元件(保留已有预留计数)
    ///
    /// 更新不得把实物量降到已有叠加层之下; 带压缩语义的下调走 sync_physical_stock
    pub fn register_component(&self, component: Component) -> LedgerResult<()> {
        let mut state = self.guard()?;
        match state.components.get_mut(&component.sku) {
            Some(existing) => {
                let overlay = existing.soft_reserved + existing.hard_locked;
                if component.physical_stock < overlay {
                    return Err(LedgerError::InsufficientStock {
                        component_sku: component.sku.clone(),
                        requested: overlay,
                        available: component.physical_stock,
                    });
                }
                existing.physical_stock = component.physical_stock;
                existing.description = component.description;
            }
            None => {
                state.components.insert(component.sku.clone(), component);
            }
        }
        state.check_invariant();
        Ok(())
    }

    /// 同步实物库存(外部库存系统权威口径)
    ///
    /// 规则:
    /// - 新 SKU 自动登记
    /// - 下调导致 soft+hard 超出实物时,压缩软预留(大持有方先压),硬锁定不可触碰
    /// - 实物低于硬锁定 → 整体拒绝 (StockBelowHardLock,致命)
    #[instrument(skip(self, levels), fields(level_count = levels.len()))]
    pub fn sync_physical_stock(&self, levels: &[(String, u32)]) -> LedgerResult<StockSyncReport> {
        let mut state = self.guard()?;

        // 先整体校验,保证全有或全无
        for (sku, qty) in levels {
            if let Some(comp) = state.components.get(sku) {
                if comp.hard_locked > *qty {
                    return Err(LedgerError::StockBelowHardLock {
                        component_sku: sku.clone(),
                        physical: *qty,
                        hard_locked: comp.hard_locked,
                    });
                }
            }
        }

        let now = Utc::now();
        let mut report = StockSyncReport::default();
        for (sku, qty) in levels {
            if !state.components.contains_key(sku) {
                state
                    .components
                    .insert(sku.clone(), Component::new(sku.clone(), *qty));
                report.created += 1;
                continue;
            }

            let (soft, hard) = match state.components.get_mut(sku) {
                Some(comp) => {
                    comp.physical_stock = *qty;
                    (comp.soft_reserved, comp.hard_locked)
                }
                None => continue,
            };
            report.updated += 1;

            // 叠加层超出新实物量: 压缩软预留
            let overlay = soft + hard;
            if overlay > *qty {
                let mut to_free = overlay - *qty;
                // 大持有方先压,同量按行序稳定
                let mut holders: Vec<(String, u32)> = state
                    .reservations
                    .iter()
                    .filter(|r| r.tier == ReservationTier::Soft && r.component_sku == *sku)
                    .map(|r| (r.order_id.clone(), r.qty))
                    .collect();
                holders.sort_by(|a, b| b.1.cmp(&a.1));

                for (order_id, held) in holders {
                    if to_free == 0 {
                        break;
                    }
                    let cut = held.min(to_free);
                    // 逆向走软预留扣减路径
                    let mut remaining = cut;
                    for row in state.reservations.iter_mut() {
                        if row.is_soft_of(&order_id, sku) {
                            let take = row.qty.min(remaining);
                            row.qty -= take;
                            row.updated_at = now;
                            remaining -= take;
                            if remaining == 0 {
                                break;
                            }
                        }
                    }
                    if let Some(comp) = state.components.get_mut(sku) {
                        comp.soft_reserved = comp.soft_reserved.saturating_sub(cut);
                    }
                    to_free -= cut;
                    report.squeezes.push(SoftSqueeze {
                        order_id,
                        component_sku: sku.clone(),
                        qty_removed: cut,
                    });
                }
                state.reservations.retain(|r| r.qty > 0);
            }
        }

        state.check_invariant();
        if !report.squeezes.is_empty() {
            tracing::warn!(
                squeeze_count = report.squeezes.len(),
                "库存下调触发软预留压缩"
            );
        }
        Ok(report)
    }

    // ==========================================
    // 软预留
    // ==========================================

    /// 建立软预留
    ///
    /// 失败: 可用量不足 → InsufficientStock,无任何副作用
    #[instrument(skip(self))]
    pub fn soft_reserve(&self, order_id: &str, component_sku: &str, qty: u32) -> LedgerResult<()> {
        if qty == 0 {
            return Ok(());
        }
        let mut state = self.guard()?;
        let comp = state
            .components
            .get(component_sku)
            .ok_or_else(|| LedgerError::UnknownComponent {
                component_sku: component_sku.to_string(),
            })?;
        let available = comp.availability();
        if available < qty {
            return Err(LedgerError::InsufficientStock {
                component_sku: component_sku.to_string(),
                requested: qty,
                available,
            });
        }

        state.apply_soft_reserve(order_id, component_sku, qty, Utc::now());
        state.check_invariant();
        Ok(())
    }

    /// 释放订单全部软预留(撤单/完工清尾)
    ///
    /// # 返回
    /// 释放的总数量
    #[instrument(skip(self))]
    pub fn release_soft_for_order(&self, order_id: &str) -> LedgerResult<u32> {
        let mut state = self.guard()?;
        let (rows, rest): (Vec<Reservation>, Vec<Reservation>) = state
            .reservations
            .drain(..)
            .partition(|r| r.tier == ReservationTier::Soft && r.order_id == order_id);
        state.reservations = rest;

        let mut total = 0;
        for row in rows {
            if let Some(comp) = state.components.get_mut(&row.component_sku) {
                comp.soft_reserved = comp.soft_reserved.saturating_sub(row.qty);
            }
            total += row.qty;
        }
        state.check_invariant();
        Ok(total)
    }

    // ==========================================
    // 硬锁定
    // ==========================================

    /// 软预留晋升硬锁定(单 SKU)
    ///
    /// 失败: 订单软持有量不足 → InsufficientSoftReservation,无任何副作用
    #[instrument(skip(self))]
    pub fn promote_to_hard(
        &self,
        order_id: &str,
        batch_id: &str,
        component_sku: &str,
        qty: u32,
    ) -> LedgerResult<()> {
        if qty == 0 {
            return Ok(());
        }
        let mut state = self.guard()?;
        let reserved = state.soft_qty(order_id, component_sku);
        if reserved < qty {
            return Err(LedgerError::InsufficientSoftReservation {
                order_id: order_id.to_string(),
                component_sku: component_sku.to_string(),
                requested: qty,
                reserved,
            });
        }
        state.move_soft_to_hard(order_id, batch_id, component_sku, qty, Utc::now());
        state.check_invariant();
        Ok(())
    }

    /// 批次提交预留(原子全有或全无)
    ///
    /// 每个 (订单, SKU) 需求先吃自有软预留,缺口从自由可用量补足;
    /// 任一 SKU 补足量超出可用量 → ConcurrentStockChange,整体不落账
    #[instrument(skip(self, demands), fields(demand_count = demands.len()))]
    pub fn commit_batch_reservations(
        &self,
        batch_id: &str,
        demands: &[BatchDemand],
    ) -> LedgerResult<()> {
        let mut state = self.guard()?;

        // 聚合需求(BTreeMap 保证确定性遍历序)
        let mut need: BTreeMap<(String, String), u32> = BTreeMap::new();
        for d in demands {
            if d.qty == 0 {
                continue;
            }
            *need
                .entry((d.order_id.clone(), d.component_sku.clone()))
                .or_insert(0) += d.qty;
        }

        // 校验阶段: 计算每组缺口,并按 SKU 聚合对照可用量
        let mut topups: BTreeMap<(String, String), u32> = BTreeMap::new();
        let mut extra_per_sku: BTreeMap<String, u32> = BTreeMap::new();
        for ((order_id, sku), qty) in &need {
            if !state.components.contains_key(sku) {
                return Err(LedgerError::UnknownComponent {
                    component_sku: sku.clone(),
                });
            }
            let have = state.soft_qty(order_id, sku);
            let extra = qty.saturating_sub(have);
            if extra > 0 {
                topups.insert((order_id.clone(), sku.clone()), extra);
                *extra_per_sku.entry(sku.clone()).or_insert(0) += extra;
            }
        }

        let mut shortfalls = Vec::new();
        for (sku, extra) in &extra_per_sku {
            let available = state.availability_of(sku);
            if available < *extra {
                shortfalls.push(CommitShortfall {
                    component_sku: sku.clone(),
                    requested_extra: *extra,
                    available,
                });
            }
        }
        if !shortfalls.is_empty() {
            return Err(LedgerError::ConcurrentStockChange { shortfalls });
        }

        // 落账阶段(校验通过后不可失败)
        let now = Utc::now();
        for ((order_id, sku), qty) in need {
            if let Some(extra) = topups.get(&(order_id.clone(), sku.clone())) {
                state.apply_soft_reserve(&order_id, &sku, *extra, now);
            }
            state.move_soft_to_hard(&order_id, batch_id, &sku, qty, now);
        }
        state.check_invariant();
        Ok(())
    }

    /// 释放批次全部硬锁定
    ///
    /// Consume: 完工消耗,实物库存同步扣除,可用量不变
    /// ReturnToSoft: 取消退回,数量回到来源订单的软预留
    ///
    /// # 返回
    /// 释放的总数量
    #[instrument(skip(self))]
    pub fn release_hard(&self, batch_id: &str, disposition: HardRelease) -> LedgerResult<u32> {
        let mut state = self.guard()?;
        let (rows, rest): (Vec<Reservation>, Vec<Reservation>) = state
            .reservations
            .drain(..)
            .partition(|r| r.is_hard_of(batch_id));
        state.reservations = rest;

        let now = Utc::now();
        let mut total = 0;
        for row in rows {
            if let Some(comp) = state.components.get_mut(&row.component_sku) {
                comp.hard_locked = comp.hard_locked.saturating_sub(row.qty);
                match disposition {
                    HardRelease::Consume => {
                        comp.physical_stock = comp.physical_stock.saturating_sub(row.qty);
                    }
                    HardRelease::ReturnToSoft => {
                        comp.soft_reserved += row.qty;
                    }
                }
            }
            if disposition == HardRelease::ReturnToSoft {
                state.apply_soft_reserve_counterless(
                    &row.order_id,
                    &row.component_sku,
                    row.qty,
                    now,
                );
            }
            total += row.qty;
        }
        state.check_invariant();
        Ok(total)
    }

    /// 在制批次数量调整的预留联动(审计化的"口头改量"替代)
    ///
    /// deltas 为 (SKU, 数量增减);增走提交路径(软补足后晋升),减退回软预留
    #[instrument(skip(self, deltas), fields(delta_count = deltas.len()))]
    pub fn adjust_batch_reservation(
        &self,
        batch_id: &str,
        order_id: &str,
        deltas: &[(String, i64)],
    ) -> LedgerResult<()> {
        let mut state = self.guard()?;

        // 校验阶段
        let mut extra_per_sku: BTreeMap<String, u32> = BTreeMap::new();
        for (sku, delta) in deltas {
            if *delta == 0 {
                continue;
            }
            if !state.components.contains_key(sku) {
                return Err(LedgerError::UnknownComponent {
                    component_sku: sku.clone(),
                });
            }
            if *delta > 0 {
                let inc = *delta as u32;
                let have = state.soft_qty(order_id, sku);
                let extra = inc.saturating_sub(have);
                if extra > 0 {
                    *extra_per_sku.entry(sku.clone()).or_insert(0) += extra;
                }
            } else {
                let dec = delta.unsigned_abs() as u32;
                let locked: u32 = state
                    .reservations
                    .iter()
                    .filter(|r| {
                        r.is_hard_of(batch_id)
                            && r.order_id == order_id
                            && r.component_sku == *sku
                    })
                    .map(|r| r.qty)
                    .sum();
                if locked < dec {
                    return Err(LedgerError::InsufficientHardLock {
                        batch_id: batch_id.to_string(),
                        component_sku: sku.clone(),
                        requested: dec,
                        locked,
                    });
                }
            }
        }
        let mut shortfalls = Vec::new();
        for (sku, extra) in &extra_per_sku {
            let available = state.availability_of(sku);
            if available < *extra {
                shortfalls.push(CommitShortfall {
                    component_sku: sku.clone(),
                    requested_extra: *extra,
                    available,
                });
            }
        }
        if !shortfalls.is_empty() {
            return Err(LedgerError::ConcurrentStockChange { shortfalls });
        }

        // 落账阶段
        let now = Utc::now();
        for (sku, delta) in deltas {
            if *delta > 0 {
                let inc = *delta as u32;
                let have = state.soft_qty(order_id, sku);
                let extra = inc.saturating_sub(have);
                if extra > 0 {
                    state.apply_soft_reserve(order_id, sku, extra, now);
                }
                state.move_soft_to_hard(order_id, batch_id, sku, inc, now);
            } else if *delta < 0 {
                let dec = delta.unsigned_abs() as u32;
                state.move_hard_to_soft(order_id, batch_id, sku, dec, now);
            }
        }
        state.check_invariant();
        Ok(())
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 计划可用量 = 实物库存 - 软预留 - 硬锁定
    pub fn availability(&self, component_sku: &str) -> LedgerResult<u32> {
        let state = self.guard()?;
        let comp = state
            .components
            .get(component_sku)
            .ok_or_else(|| LedgerError::UnknownComponent {
                component_sku: component_sku.to_string(),
            })?;
        Ok(comp.availability())
    }

    /// 订单行项的可建数量(供给口径,未按剩余需求封顶)
    pub fn buildable_quantity(&self, order_id: &str, item: &LineItem) -> LedgerResult<u32> {
        let state = self.guard()?;
        Ok(state.buildable_for(order_id, item, None))
    }

    /// 订单对某 SKU 的软预留持有量
    pub fn soft_reserved_for(&self, order_id: &str, component_sku: &str) -> LedgerResult<u32> {
        let state = self.guard()?;
        Ok(state.soft_qty(order_id, component_sku))
    }

    /// 订单的硬锁定余量(完工审计用,应为 0)
    pub fn hard_locked_for_order(&self, order_id: &str) -> LedgerResult<u32> {
        let state = self.guard()?;
        Ok(state
            .reservations
            .iter()
            .filter(|r| r.tier == ReservationTier::Hard && r.order_id == order_id)
            .map(|r| r.qty)
            .sum())
    }

    /// 元件快照(按 SKU 排序)
    pub fn snapshot_components(&self) -> LedgerResult<Vec<Component>> {
        let state = self.guard()?;
        let mut comps: Vec<Component> = state.components.values().cloned().collect();
        comps.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(comps)
    }

    /// 预留行快照
    pub fn snapshot_reservations(&self) -> LedgerResult<Vec<Reservation>> {
        let state = self.guard()?;
        Ok(state.reservations.clone())
    }
}

impl Default for ReservationLedger {
    fn default() -> Self {
        Self::new()
    }
}
