//! 通知文本格式化
//!
//! 将结构化通知记录渲染为 Telegram HTML 子集的可读文本。
//! Telegram 会解析消息中的受限 HTML 标记，所有来自消息负载的
//! 键和值在插入前必须转义，否则可以借构造的负载破坏或劫持消息渲染。

use serde_json::Value;

use crate::parser::NotificationRecord;
use crate::store::EventDefinition;

/// 渲染一条完整的通知文本
///
/// 结构：事件/系统头部 → 存在的可选字段（时间、标题、描述、消息、级别）
/// → 附加数据的递归渲染（嵌套对象逐级缩进，数组渲染为列表项）。
pub fn format_notification(record: &NotificationRecord, event: &EventDefinition) -> String {
    let mut out = String::new();

    out.push_str("🔔 <b>Event Notification</b>\n\n");
    out.push_str(&format!(
        "📊 <b>System:</b> {}\n",
        escape_html(&event.system_name)
    ));
    out.push_str(&format!(
        "📋 <b>Event:</b> {}\n",
        escape_html(&event.event_name)
    ));

    if let Some(ts) = &record.timestamp {
        out.push_str(&format!(
            "⏰ <b>Time:</b> {}\n",
            ts.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    out.push('\n');

    if let Some(title) = non_blank(&record.title) {
        out.push_str(&format!("📌 <b>Title:</b> {}\n", escape_html(title)));
    }
    if let Some(description) = non_blank(&record.description) {
        out.push_str(&format!(
            "📝 <b>Description:</b> {}\n",
            escape_html(description)
        ));
    }
    if let Some(message) = non_blank(&record.message) {
        out.push_str(&format!("💬 <b>Message:</b> {}\n", escape_html(message)));
    }
    if let Some(severity) = non_blank(&record.severity) {
        out.push_str(&format!(
            "⚠️ <b>Severity:</b> {} {}\n",
            severity_glyph(severity),
            escape_html(severity)
        ));
    }

    if let Some(data) = &record.data
        && !data.is_empty()
    {
        out.push_str("\n📊 <b>Additional Data:</b>\n");
        render_map(data, &mut out, 1);
    }

    out
}

/// 级别对应的指示符
///
/// 固定词表之外的级别一律使用默认指示符，不因上游拼写差异丢通知。
fn severity_glyph(severity: &str) -> &'static str {
    match severity.to_lowercase().as_str() {
        "critical" | "error" => "🔴",
        "warning" | "warn" => "🟡",
        "info" | "information" => "🔵",
        "success" => "🟢",
        _ => "ℹ️",
    }
}

/// 转义 Telegram HTML 解析器的控制字符
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// 过滤 None 与纯空白字符串
fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// 渲染键值映射，嵌套层级逐级缩进
fn render_map(map: &serde_json::Map<String, Value>, out: &mut String, depth: usize) {
    let indent = "  ".repeat(depth);
    for (key, value) in map {
        out.push_str(&format!("{indent}• <b>{}:</b>", escape_html(key)));
        match value {
            Value::Object(nested) => {
                out.push('\n');
                render_map(nested, out, depth + 1);
            }
            Value::Array(items) => {
                out.push('\n');
                render_array(items, out, depth + 1);
            }
            scalar => {
                out.push(' ');
                out.push_str(&escape_html(&scalar_text(scalar)));
                out.push('\n');
            }
        }
    }
}

/// 渲染数组为列表项
fn render_array(items: &[Value], out: &mut String, depth: usize) {
    let indent = "  ".repeat(depth);
    for item in items {
        match item {
            Value::Object(nested) => {
                out.push_str(&format!("{indent}•\n"));
                render_map(nested, out, depth + 1);
            }
            Value::Array(nested) => {
                out.push_str(&format!("{indent}•\n"));
                render_array(nested, out, depth + 1);
            }
            scalar => {
                out.push_str(&format!(
                    "{indent}• {}\n",
                    escape_html(&scalar_text(scalar))
                ));
            }
        }
    }
}

/// 标量值的文本形式：字符串去引号，其余类型用 JSON 字面量
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
