// ==========================================
// LED模组批次排产系统 - 批次停滞监控
// ==========================================
// 职责: 周期扫描在制批次,超过阈值无活动即升级告警
// 红线: 监控只读,从不改动台账/批次状态
//       消解(取消/完工/touch)永远是外部显式动作
// 升级节奏: 阈值处首告,之后按提醒间隔逐级加码至上限
// ==========================================

use crate::config::scheduler_config::StallConfig;
use crate::domain::batch::Batch;
use crate::domain::types::BatchStatus;
use crate::engine::events::{AlertKind, AlertMessage, AlertSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::instrument;

// ==========================================
// StallAlert - 停滞告警
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StallAlert {
    pub batch_id: String,
    pub idle_hours: i64,
    pub escalation_level: u32,
    pub raised_at: DateTime<Utc>,
}

// ==========================================
// 在制批次快照源
// ==========================================
// 编排层实现; 监控只拿快照,不持有批次可变引用
pub trait InProgressBatchSource: Send + Sync {
    fn in_progress_batches(&self) -> Vec<Batch>;
}

// ==========================================
// StallMonitor - 停滞监控
// ==========================================
pub struct StallMonitor {
    config: StallConfig,
    alert_sink: Arc<dyn AlertSink>,
    // 每批次最后投递的升级等级(活动恢复即清除)
    emitted_levels: Mutex<HashMap<String, u32>>,
}

impl StallMonitor {
    /// 构造函数
    pub fn new(config: StallConfig, alert_sink: Arc<dyn AlertSink>) -> Self {
        Self {
            config,
            alert_sink,
            emitted_levels: Mutex::new(HashMap::new()),
        }
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 单轮扫描
    ///
    /// 只对"升级等级超过上次投递"的批次发出告警,同级不重复刷屏
    ///
    /// # 返回
    /// 本轮新投递的告警列表
    #[instrument(skip(self, batches), fields(batch_count = batches.len()))]
    pub fn sweep(&self, batches: &[Batch], now: DateTime<Utc>) -> Vec<StallAlert> {
        let mut emitted = match self.emitted_levels.lock() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!(error = %e, "停滞监控状态锁获取失败,本轮跳过");
                return Vec::new();
            }
        };

        let mut alerts = Vec::new();
        let mut seen: Vec<&str> = Vec::new();
        for batch in batches {
            if batch.status != BatchStatus::InProgress {
                continue;
            }
            seen.push(batch.batch_id.as_str());

            let idle_hours = (now - batch.last_activity).num_hours();
            if idle_hours <= self.config.stall_threshold_hours {
                // 活动已恢复: 清除升级记忆,下次停滞重新从一级开始
                emitted.remove(&batch.batch_id);
                continue;
            }

            let over = idle_hours - self.config.stall_threshold_hours;
            let level = (1 + over / self.config.reminder_interval_hours.max(1)) as u32;
            let level = level.min(self.config.max_escalation_level.max(1));

            let last = emitted.get(&batch.batch_id).copied().unwrap_or(0);
            if level <= last {
                continue;
            }

            let alert = StallAlert {
                batch_id: batch.batch_id.clone(),
                idle_hours,
                escalation_level: level,
                raised_at: now,
            };
            let message = AlertMessage::new(
                AlertKind::BatchStalled,
                batch.batch_id.clone(),
                json!({
                    "idle_hours": alert.idle_hours,
                    "escalation_level": alert.escalation_level,
                    "last_activity": batch.last_activity,
                }),
            );
            if let Err(e) = self.alert_sink.publish(message) {
                tracing::warn!(batch_id = %batch.batch_id, error = %e, "停滞告警投递失败");
            }
            tracing::warn!(
                batch_id = %batch.batch_id,
                idle_hours,
                escalation_level = level,
                "在制批次停滞"
            );
            emitted.insert(batch.batch_id.clone(), level);
            alerts.push(alert);
        }

        // 不再在制的批次(完工/取消)清除记忆
        emitted.retain(|batch_id, _| seen.contains(&batch_id.as_str()));

        alerts
    }

    /// 周期扫描循环(tokio 任务)
    ///
    /// 扫描节奏由 StallConfig::sweep_interval_secs 决定
    pub async fn run(self: Arc<Self>, source: Arc<dyn InProgressBatchSource>) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(self.config.sweep_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let batches = source.in_progress_batches();
            let alerts = self.sweep(&batches, Utc::now());
            if !alerts.is_empty() {
                tracing::info!(alert_count = alerts.len(), "停滞扫描轮完成");
            }
        }
    }
}
