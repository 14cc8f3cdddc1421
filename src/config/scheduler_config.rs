// ==========================================
// LED模组批次排产系统 - 调度配置
// ==========================================
// 全部参数带默认值,可从 JSON 配置文件整体加载
// ==========================================

use crate::domain::types::PriorityTier;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ==========================================
// PriorityConfig - 优先级参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityConfig {
    /// "临近交期"提升窗口(天): 距承诺交期不足该天数时抬升至 L1
    #[serde(default = "default_almost_due_window_days")]
    pub almost_due_window_days: i64,
}

fn default_almost_due_window_days() -> i64 {
    2
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            almost_due_window_days: default_almost_due_window_days(),
        }
    }
}

// ==========================================
// ComposerConfig - 批次构图参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerConfig {
    /// 该等级及以上的行项取全量可建数量,不做阵列裁边
    /// 红线: 高优先级完整性始终压倒制造效率
    #[serde(default = "default_full_quantity_min_tier")]
    pub full_quantity_min_tier: PriorityTier,

    /// commit 时检测到库存并发变化,是否允许收缩草案数量自动恢复一次
    #[serde(default = "default_allow_shrink_on_commit")]
    pub allow_shrink_on_commit: bool,

    /// commit 最大尝试次数(含首次),超过即向调用方报错,不无限重试
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,
}

fn default_full_quantity_min_tier() -> PriorityTier {
    PriorityTier::L2
}

fn default_allow_shrink_on_commit() -> bool {
    true
}

fn default_max_commit_attempts() -> u32 {
    2
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            full_quantity_min_tier: default_full_quantity_min_tier(),
            allow_shrink_on_commit: default_allow_shrink_on_commit(),
            max_commit_attempts: default_max_commit_attempts(),
        }
    }
}

// ==========================================
// StallConfig - 停滞监控参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StallConfig {
    /// 停滞判定阈值(小时): 在制批次无活动超过该时长触发首次告警
    #[serde(default = "default_stall_threshold_hours")]
    pub stall_threshold_hours: i64,

    /// 升级提醒间隔(小时)
    #[serde(default = "default_reminder_interval_hours")]
    pub reminder_interval_hours: i64,

    /// 升级等级上限(到顶后不再加码,仍按间隔提醒)
    #[serde(default = "default_max_escalation_level")]
    pub max_escalation_level: u32,

    /// 扫描周期(秒)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_stall_threshold_hours() -> i64 {
    24
}

fn default_reminder_interval_hours() -> i64 {
    8
}

fn default_max_escalation_level() -> u32 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            stall_threshold_hours: default_stall_threshold_hours(),
            reminder_interval_hours: default_reminder_interval_hours(),
            max_escalation_level: default_max_escalation_level(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

// ==========================================
// SchedulerConfig - 调度配置聚合
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub priority: PriorityConfig,

    #[serde(default)]
    pub composer: ComposerConfig,

    #[serde(default)]
    pub stall: StallConfig,
}

impl SchedulerConfig {
    /// 从 JSON 字符串解析配置(缺省字段取默认值)
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("调度配置 JSON 解析失败")
    }

    /// 从 JSON 文件加载配置
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        Self::from_json_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.priority.almost_due_window_days, 2);
        assert_eq!(config.composer.full_quantity_min_tier, PriorityTier::L2);
        assert!(config.composer.allow_shrink_on_commit);
        assert_eq!(config.composer.max_commit_attempts, 2);
        assert_eq!(config.stall.stall_threshold_hours, 24);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config = SchedulerConfig::from_json_str(
            r#"{"stall": {"stall_threshold_hours": 48}}"#,
        )
        .unwrap();
        assert_eq!(config.stall.stall_threshold_hours, 48);
        assert_eq!(config.stall.reminder_interval_hours, 8); // 默认值
        assert_eq!(config.priority.almost_due_window_days, 2); // 默认值
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"priority": {{"almost_due_window_days": 5}}, "composer": {{"allow_shrink_on_commit": false}}}}"#
        )
        .unwrap();

        let config = SchedulerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.priority.almost_due_window_days, 5);
        assert!(!config.composer.allow_shrink_on_commit);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(SchedulerConfig::from_json_str("not json").is_err());
    }
}
