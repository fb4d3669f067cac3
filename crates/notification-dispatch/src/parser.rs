//! 入站消息解析
//!
//! 外部系统投递到事件 topic 的消息格式不受本服务控制，
//! 解析必须宽容：能按结构化字段解码的尽量解码，未知字段忽略，
//! 完全无法解码的消息降级为纯文本记录。解析永远不会使调用方失败。

use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::warn;

/// 入站消息的结构化表示
///
/// 所有字段均可缺省。`data` 保留任意嵌套的键值结构
/// （数值、布尔、嵌套对象、数组原样传递到格式化层）。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationRecord {
    /// 外部系统标注的事件标签
    pub event: Option<String>,
    /// 外部系统标注的来源系统标签
    pub system: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// 自由文本消息；解析失败时承载原始负载
    pub message: Option<String>,
    pub severity: Option<String>,
    /// 附加数据，保持到达顺序
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

impl NotificationRecord {
    /// 解析原始消息字节
    ///
    /// JSON 解码失败时返回只含 `message`（原始文本）和当前时间戳的记录，
    /// 保证每条消息都能走完通知管道。
    pub fn parse(raw: &[u8]) -> Self {
        match serde_json::from_slice(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "消息非结构化 JSON，降级为纯文本记录");
                Self {
                    message: Some(String::from_utf8_lossy(raw).into_owned()),
                    timestamp: Some(Utc::now().naive_utc()),
                    ..Self::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_message() {
        let raw = br#"{
            "event": "order-created",
            "system": "shop",
            "title": "New order",
            "description": "Order #1024 placed",
            "message": "details attached",
            "severity": "info",
            "timestamp": "2024-06-01T10:30:00"
        }"#;

        let record = NotificationRecord::parse(raw);
        assert_eq!(record.event.as_deref(), Some("order-created"));
        assert_eq!(record.system.as_deref(), Some("shop"));
        assert_eq!(record.title.as_deref(), Some("New order"));
        assert_eq!(record.description.as_deref(), Some("Order #1024 placed"));
        assert_eq!(record.message.as_deref(), Some("details attached"));
        assert_eq!(record.severity.as_deref(), Some("info"));
        assert!(record.timestamp.is_some());
        assert!(record.data.is_none());
    }

    #[test]
    fn test_parse_preserves_nested_data() {
        let raw = br#"{
            "title": "Deploy finished",
            "data": {
                "version": "1.4.2",
                "duration_seconds": 87,
                "healthy": true,
                "stages": ["build", "push", "rollout"],
                "cluster": {"region": "eu-west-1", "nodes": 12}
            }
        }"#;

        let record = NotificationRecord::parse(raw);
        let data = record.data.expect("data 应被保留");

        // 键保持到达顺序
        let keys: Vec<&str> = data.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["version", "duration_seconds", "healthy", "stages", "cluster"]
        );

        // 数值/布尔/数组/嵌套对象原样保留
        assert_eq!(data["duration_seconds"], serde_json::json!(87));
        assert_eq!(data["healthy"], serde_json::json!(true));
        assert_eq!(data["stages"].as_array().unwrap().len(), 3);
        assert_eq!(data["cluster"]["nodes"], serde_json::json!(12));
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let raw = br#"{"title": "hi", "unexpected": {"deep": 1}, "another": 42}"#;
        let record = NotificationRecord::parse(raw);
        assert_eq!(record.title.as_deref(), Some("hi"));
        assert!(record.data.is_none());
    }

    #[test]
    fn test_parse_malformed_falls_back_to_raw_text() {
        let raw = b"plain text alert: disk almost full";
        let record = NotificationRecord::parse(raw);

        // 原始输入完整保留在 message 中
        assert_eq!(
            record.message.as_deref(),
            Some("plain text alert: disk almost full")
        );
        assert!(record.timestamp.is_some());
        assert!(record.title.is_none());
        assert!(record.data.is_none());
    }

    #[test]
    fn test_parse_truncated_json_falls_back() {
        let raw = br#"{"title": "New or"#;
        let record = NotificationRecord::parse(raw);
        assert_eq!(record.message.as_deref(), Some(r#"{"title": "New or"#));
        assert!(record.title.is_none());
    }

    #[test]
    fn test_parse_non_object_json_falls_back() {
        // 合法 JSON 但不是对象，同样走纯文本降级
        let raw = br#"[1, 2, 3]"#;
        let record = NotificationRecord::parse(raw);
        assert_eq!(record.message.as_deref(), Some("[1, 2, 3]"));
    }

    #[test]
    fn test_parse_empty_object() {
        let record = NotificationRecord::parse(b"{}");
        assert!(record.event.is_none());
        assert!(record.message.is_none());
        assert!(record.timestamp.is_none());
    }
}
