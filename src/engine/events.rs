// ==========================================
// LED模组批次排产系统 - 协作方接口
// ==========================================
// 职责: 定义交接/告警/库存源 trait,实现依赖倒置
// 说明: 本核心只定义接口并在台账事务提交后即发即弃地通知,
//       投递机制与下游履约逻辑均不属于本核心
// ==========================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Mutex;

// ==========================================
// 生产完工交接
// ==========================================

/// 生产完工事件(幂等: 同一订单只会投递一次)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandOffEvent {
    pub order_id: String,
    pub total_built: u32,
    pub completed_at: DateTime<Utc>,
}

/// 交接接收方 Trait
///
/// 下游履约系统实现; 投递失败只记日志,不回滚台账事务
pub trait HandOffSink: Send + Sync {
    fn deliver(&self, event: HandOffEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作交接接收方(单元测试/未接线场景)
#[derive(Debug, Clone, Default)]
pub struct NoOpHandOffSink;

impl HandOffSink for NoOpHandOffSink {
    fn deliver(&self, event: HandOffEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(order_id = %event.order_id, "NoOpHandOffSink: 跳过交接投递");
        Ok(())
    }
}

/// 内存交接接收方(测试断言用)
#[derive(Debug, Default)]
pub struct MemoryHandOffSink {
    events: Mutex<Vec<HandOffEvent>>,
}

impl MemoryHandOffSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HandOffEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl HandOffSink for MemoryHandOffSink {
    fn deliver(&self, event: HandOffEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(())
    }
}

// ==========================================
// 告警
// ==========================================

/// 告警类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    BatchStalled,         // 批次停滞
    ReallocationImpact,   // 调拨影响通报
    ReservationShortfall, // 订单入队时软预留缺口
    StockSqueeze,         // 库存下调压缩软预留
    RequiredQtyChanged,   // 外部订单变更调整需求量(只标记)
    QuantityAdjusted,     // 在制批次数量调整
}

impl AlertKind {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            AlertKind::BatchStalled => "BatchStalled",
            AlertKind::ReallocationImpact => "ReallocationImpact",
            AlertKind::ReservationShortfall => "ReservationShortfall",
            AlertKind::StockSqueeze => "StockSqueeze",
            AlertKind::RequiredQtyChanged => "RequiredQtyChanged",
            AlertKind::QuantityAdjusted => "QuantityAdjusted",
        }
    }
}

/// 告警消息(对投递方不透明的结构化载荷)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    pub kind: AlertKind,
    pub subject_id: String, // 批次号/订单号等主体标识
    pub payload: serde_json::Value,
    pub raised_at: DateTime<Utc>,
}

impl AlertMessage {
    pub fn new(kind: AlertKind, subject_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind,
            subject_id: subject_id.into(),
            payload,
            raised_at: Utc::now(),
        }
    }
}

/// 告警接收方 Trait
pub trait AlertSink: Send + Sync {
    fn publish(&self, alert: AlertMessage) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作告警接收方
#[derive(Debug, Clone, Default)]
pub struct NoOpAlertSink;

impl AlertSink for NoOpAlertSink {
    fn publish(&self, alert: AlertMessage) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            kind = alert.kind.as_str(),
            subject_id = %alert.subject_id,
            "NoOpAlertSink: 跳过告警投递"
        );
        Ok(())
    }
}

/// 内存告警接收方(测试断言用)
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    messages: Mutex<Vec<AlertMessage>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<AlertMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn messages_of(&self, kind: AlertKind) -> Vec<AlertMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.kind == kind)
            .collect()
    }
}

impl AlertSink for MemoryAlertSink {
    fn publish(&self, alert: AlertMessage) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(alert);
        }
        Ok(())
    }
}

// ==========================================
// 库存源
// ==========================================

/// 元件实物库存水位
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLevel {
    pub component_sku: String,
    pub physical_qty: u32,
}

/// 外部库存源 Trait (实物库存的权威口径)
#[async_trait]
pub trait StockSource: Send + Sync {
    async fn fetch_stock_levels(&self) -> anyhow::Result<Vec<StockLevel>>;
}

// ==========================================
// 单元测试
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_noop_sinks_accept_everything() {
        let handoff = NoOpHandOffSink;
        assert!(handoff
            .deliver(HandOffEvent {
                order_id: "SO-1".to_string(),
                total_built: 10,
                completed_at: Utc::now(),
            })
            .is_ok());

        let alerts = NoOpAlertSink;
        assert!(alerts
            .publish(AlertMessage::new(
                AlertKind::BatchStalled,
                "B-1",
                json!({"idle_hours": 30}),
            ))
            .is_ok());
    }

    #[test]
    fn test_memory_alert_sink_filters_by_kind() {
        let sink = MemoryAlertSink::new();
        sink.publish(AlertMessage::new(AlertKind::BatchStalled, "B-1", json!({})))
            .unwrap();
        sink.publish(AlertMessage::new(AlertKind::StockSqueeze, "LED-W3", json!({})))
            .unwrap();

        assert_eq!(sink.messages().len(), 2);
        assert_eq!(sink.messages_of(AlertKind::BatchStalled).len(), 1);
    }
}
