// ==========================================
// LED模组批次排产系统 - 单元序列号分配器
// ==========================================
// 职责: 永久唯一序列号签发 + 成品单元登记
// 地址空间: 20 位 (0-1048575),零填充 8 位渲染
// 红线: 序列号永不复用,作废只翻状态位
// 签发记录为追加式日志,不回收空洞
// ==========================================

use crate::domain::types::UnitStatus;
use crate::domain::unit::{ManufacturedUnit, UnitSerial, SERIAL_SPACE};
use crate::engine::error::{EngineError, EngineResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use tracing::instrument;

/// 随机抽取碰撞上限,超过后转线性探查保证有界完成
const MAX_RANDOM_DRAWS: u32 = 64;

// ==========================================
// UnitSerialAllocator - 序列号分配器
// ==========================================
struct AllocatorState {
    issued: HashSet<u32>,
    issued_log: Vec<u32>, // 追加式签发日志(审计)
    rng: StdRng,
}

pub struct UnitSerialAllocator {
    inner: Mutex<AllocatorState>,
}

impl UnitSerialAllocator {
    /// 创建分配器(系统熵源)
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// 创建固定种子分配器(测试/回放用)
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Mutex::new(AllocatorState {
                issued: HashSet::new(),
                issued_log: Vec::new(),
                rng,
            }),
        }
    }

    /// 从历史签发记录恢复(启动时由审计日志重建)
    pub fn restore(&self, issued: impl IntoIterator<Item = u32>) -> EngineResult<usize> {
        let mut state = self.guard()?;
        let mut loaded = 0;
        for serial in issued {
            if serial < SERIAL_SPACE && state.issued.insert(serial) {
                state.issued_log.push(serial);
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    fn guard(&self) -> EngineResult<MutexGuard<'_, AllocatorState>> {
        self.inner
            .lock()
            .map_err(|e| EngineError::LockPoisoned(e.to_string()))
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 批量签发序列号(每个确认批次调用一次,n = 承诺单元总数)
    ///
    /// 全局唯一性对照全部历史签发(含已作废); 碰撞即换新抽
    /// 失败: 地址空间耗尽 → SerialSpaceExhausted (致命,与普通失败区分)
    #[instrument(skip(self))]
    pub fn allocate(&self, n: usize) -> EngineResult<Vec<UnitSerial>> {
        let mut state = self.guard()?;

        if state.issued.len() + n > SERIAL_SPACE as usize {
            return Err(EngineError::SerialSpaceExhausted {
                issued: state.issued.len(),
                requested: n,
            });
        }

        let mut serials = Vec::with_capacity(n);
        for _ in 0..n {
            let value = Self::draw_unique(&mut state);
            state.issued.insert(value);
            state.issued_log.push(value);
            // 地址空间边界由 SERIAL_SPACE 内的抽取保证
            if let Some(serial) = UnitSerial::new(value) {
                serials.push(serial);
            }
        }
        tracing::debug!(
            issued_total = state.issued.len(),
            "序列号签发完成"
        );
        Ok(serials)
    }

    /// 抽取一个未签发值(容量已在外层校验,必然成功)
    fn draw_unique(state: &mut AllocatorState) -> u32 {
        let mut last = 0;
        for _ in 0..MAX_RANDOM_DRAWS {
            let candidate = state.rng.random_range(0..SERIAL_SPACE);
            if !state.issued.contains(&candidate) {
                return candidate;
            }
            last = candidate;
        }
        // 高占用率下随机抽取碰撞过多: 从最后一次抽取处环形线性探查
        for offset in 1..SERIAL_SPACE {
            let candidate = (last + offset) % SERIAL_SPACE;
            if !state.issued.contains(&candidate) {
                return candidate;
            }
        }
        // 容量校验保证不可达
        last
    }

    /// 已签发总数
    pub fn issued_count(&self) -> EngineResult<usize> {
        Ok(self.guard()?.issued.len())
    }

    /// 签发日志快照(追加序)
    pub fn issued_log(&self) -> EngineResult<Vec<u32>> {
        Ok(self.guard()?.issued_log.clone())
    }
}

impl Default for UnitSerialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// UnitRegistry - 成品单元登记簿
// ==========================================
// 永久记录,插入序即签发序,复导出依赖该顺序确定性
pub struct UnitRegistry {
    inner: Mutex<Vec<ManufacturedUnit>>,
}

impl UnitRegistry {
    /// 创建空登记簿
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }

    fn guard(&self) -> EngineResult<MutexGuard<'_, Vec<ManufacturedUnit>>> {
        self.inner
            .lock()
            .map_err(|e| EngineError::LockPoisoned(e.to_string()))
    }

    /// 登记成品单元
    pub fn register(&self, unit: ManufacturedUnit) -> EngineResult<()> {
        self.guard()?.push(unit);
        Ok(())
    }

    /// 作废单元(报废/弃单): 只翻状态位,序列号不回收
    #[instrument(skip(self), fields(serial = %serial))]
    pub fn void_unit(&self, serial: UnitSerial) -> EngineResult<()> {
        let mut units = self.guard()?;
        match units.iter_mut().find(|u| u.serial == serial) {
            Some(unit) => {
                unit.status = UnitStatus::Void;
                Ok(())
            }
            None => Err(EngineError::NotFound {
                entity: "ManufacturedUnit".to_string(),
                id: serial.to_string(),
            }),
        }
    }

    /// 批次内单元(签发序)
    pub fn units_for_batch(&self, batch_id: &str) -> EngineResult<Vec<ManufacturedUnit>> {
        Ok(self
            .guard()?
            .iter()
            .filter(|u| u.batch_id == batch_id)
            .cloned()
            .collect())
    }

    /// 批次内行项的在册单元(签发序)
    pub fn active_units_for_line(
        &self,
        batch_id: &str,
        line_item_id: &str,
    ) -> EngineResult<Vec<ManufacturedUnit>> {
        Ok(self
            .guard()?
            .iter()
            .filter(|u| {
                u.batch_id == batch_id
                    && u.line_item_id == line_item_id
                    && u.status == UnitStatus::Active
            })
            .cloned()
            .collect())
    }

    /// 全量快照
    pub fn snapshot(&self) -> EngineResult<Vec<ManufacturedUnit>> {
        Ok(self.guard()?.clone())
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// 单元测试
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_unit(serial: UnitSerial, batch_id: &str, line_item_id: &str) -> ManufacturedUnit {
        ManufacturedUnit {
            serial,
            batch_id: batch_id.to_string(),
            order_id: "SO-1".to_string(),
            line_item_id: line_item_id.to_string(),
            module_sku: "MOD-1".to_string(),
            status: UnitStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_allocate_unique_serials() {
        let allocator = UnitSerialAllocator::with_seed(42);
        let serials = allocator.allocate(1000).unwrap();

        let unique: HashSet<u32> = serials.iter().map(|s| s.value()).collect();
        assert_eq!(unique.len(), 1000);
        assert!(serials.iter().all(|s| s.value() < SERIAL_SPACE));
        assert_eq!(allocator.issued_count().unwrap(), 1000);
    }

    #[test]
    fn test_allocate_never_repeats_across_calls() {
        let allocator = UnitSerialAllocator::with_seed(7);
        let first = allocator.allocate(500).unwrap();
        let second = allocator.allocate(500).unwrap();

        let all: HashSet<u32> = first
            .iter()
            .chain(second.iter())
            .map(|s| s.value())
            .collect();
        assert_eq!(all.len(), 1000);
    }

    #[test]
    fn test_restored_serials_never_reissued() {
        let allocator = UnitSerialAllocator::with_seed(1);
        let loaded = allocator.restore(0..1000u32).unwrap();
        assert_eq!(loaded, 1000);

        let fresh = allocator.allocate(2000).unwrap();
        assert!(fresh.iter().all(|s| !(0..1000).contains(&s.value())));
    }

    #[test]
    fn test_exhaustion_is_distinct_fatal_error() {
        let allocator = UnitSerialAllocator::with_seed(3);
        // 预占几乎整个地址空间
        allocator.restore(0..SERIAL_SPACE - 10).unwrap();

        // 剩 10 个: 申请 11 个必须报耗尽
        let err = allocator.allocate(11).unwrap_err();
        assert!(matches!(err, EngineError::SerialSpaceExhausted { .. }));

        // 申请 10 个仍可成功(线性探查兜底)
        let serials = allocator.allocate(10).unwrap();
        assert_eq!(serials.len(), 10);
        let unique: HashSet<u32> = serials.iter().map(|s| s.value()).collect();
        assert_eq!(unique.len(), 10);
        assert!(unique.iter().all(|v| *v >= SERIAL_SPACE - 10));
    }

    #[test]
    fn test_void_unit_flips_status_only() {
        let registry = UnitRegistry::new();
        let serial = UnitSerial::new(123).unwrap();
        registry.register(make_unit(serial, "B-1", "LI-1")).unwrap();

        registry.void_unit(serial).unwrap();

        let units = registry.units_for_batch("B-1").unwrap();
        assert_eq!(units.len(), 1); // 永不删除
        assert_eq!(units[0].status, UnitStatus::Void);
    }

    #[test]
    fn test_void_unknown_serial_not_found() {
        let registry = UnitRegistry::new();
        let err = registry.void_unit(UnitSerial::new(99).unwrap()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_units_for_batch_keeps_issue_order() {
        let registry = UnitRegistry::new();
        for value in [5u32, 3, 9] {
            registry
                .register(make_unit(UnitSerial::new(value).unwrap(), "B-1", "LI-1"))
                .unwrap();
        }
        let units = registry.units_for_batch("B-1").unwrap();
        let values: Vec<u32> = units.iter().map(|u| u.serial.value()).collect();
        assert_eq!(values, vec![5, 3, 9]); // 签发序,非数值序
    }
}
