//! 事件与订阅数据访问
//!
//! 定义存储接口 trait，便于消息处理层依赖抽象而非具体实现，支持 mock 测试。
//! 订阅者数据在行映射时即拷贝为独立快照——通知分发运行在消费线程上，
//! 不允许任何数据库会话绑定的引用跨越该边界。

use async_trait::async_trait;
use sqlx::PgPool;

use herald_shared::error::Result;

// ---------------------------------------------------------------------------
// 数据模型
// ---------------------------------------------------------------------------

/// 事件定义
///
/// 由外部 CRUD 服务维护，本服务只读。topic 在事件定义间唯一
/// （由存储层唯一约束保证）。
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventDefinition {
    pub id: i64,
    pub system_name: String,
    pub event_name: String,
    pub topic: String,
    pub description: Option<String>,
}

/// 订阅者的通知端点快照
///
/// 所有字段在查询时即完整拷贝，不持有任何连接或会话引用。
#[derive(Debug, Clone, PartialEq)]
pub struct Subscriber {
    pub username: String,
    /// 主接收端点（用户激活机器人后绑定的 chat id）
    pub chat_id: Option<String>,
    /// 额外接收端点，源数据以分号分隔
    pub extra_chat_ids: Vec<String>,
}

impl Subscriber {
    /// 是否配置了至少一个接收端点
    pub fn has_endpoints(&self) -> bool {
        self.chat_id.is_some() || !self.extra_chat_ids.is_empty()
    }
}

/// 订阅者数据库行
#[derive(sqlx::FromRow)]
struct SubscriberRow {
    username: String,
    telegram_chat_id: Option<String>,
    telegram_recipients: Option<String>,
}

impl From<SubscriberRow> for Subscriber {
    fn from(row: SubscriberRow) -> Self {
        let extra_chat_ids = row
            .telegram_recipients
            .as_deref()
            .map(split_recipients)
            .unwrap_or_default();

        Self {
            username: row.username,
            // 空白 chat id 视为未绑定
            chat_id: row
                .telegram_chat_id
                .filter(|id| !id.trim().is_empty())
                .map(|id| id.trim().to_string()),
            extra_chat_ids,
        }
    }
}

/// 拆分分号分隔的接收端点列表，忽略空白项
fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// EventStore trait
// ---------------------------------------------------------------------------

/// 事件与订阅存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// 按 topic 查找事件定义，未绑定时返回 None
    async fn find_event_by_topic(&self, topic: &str) -> Result<Option<EventDefinition>>;

    /// 查询事件的全部订阅者，所有字段均已物化
    async fn find_subscribers_by_event(&self, event_id: i64) -> Result<Vec<Subscriber>>;

    /// 列出全部事件定义（用于启动时恢复监听）
    async fn list_events(&self) -> Result<Vec<EventDefinition>>;
}

// ---------------------------------------------------------------------------
// PgEventStore — PostgreSQL 实现
// ---------------------------------------------------------------------------

/// 基于 PostgreSQL 的事件存储实现
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn find_event_by_topic(&self, topic: &str) -> Result<Option<EventDefinition>> {
        let event = sqlx::query_as::<_, EventDefinition>(
            r#"
            SELECT id, system_name, event_name, topic, description
            FROM events
            WHERE topic = $1
            "#,
        )
        .bind(topic)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn find_subscribers_by_event(&self, event_id: i64) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query_as::<_, SubscriberRow>(
            r#"
            SELECT u.username, u.telegram_chat_id, u.telegram_recipients
            FROM subscriptions s
            JOIN users u ON u.id = s.user_id
            WHERE s.event_id = $1
            ORDER BY u.username
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_events(&self) -> Result<Vec<EventDefinition>> {
        let events = sqlx::query_as::<_, EventDefinition>(
            r#"
            SELECT id, system_name, event_name, topic, description
            FROM events
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_recipients() {
        assert_eq!(split_recipients("111;222;333"), vec!["111", "222", "333"]);
        // 空白项与多余分隔符被忽略
        assert_eq!(split_recipients(" 111 ; ;222; "), vec!["111", "222"]);
        assert!(split_recipients("").is_empty());
        assert!(split_recipients(";;;").is_empty());
    }

    #[test]
    fn test_subscriber_from_row() {
        let row = SubscriberRow {
            username: "alice".to_string(),
            telegram_chat_id: Some("111".to_string()),
            telegram_recipients: Some("222;333".to_string()),
        };

        let subscriber = Subscriber::from(row);
        assert_eq!(subscriber.username, "alice");
        assert_eq!(subscriber.chat_id.as_deref(), Some("111"));
        assert_eq!(subscriber.extra_chat_ids, vec!["222", "333"]);
        assert!(subscriber.has_endpoints());
    }

    #[test]
    fn test_subscriber_from_row_blank_chat_id() {
        let row = SubscriberRow {
            username: "bob".to_string(),
            telegram_chat_id: Some("   ".to_string()),
            telegram_recipients: None,
        };

        let subscriber = Subscriber::from(row);
        // 空白 chat id 归一化为 None
        assert!(subscriber.chat_id.is_none());
        assert!(subscriber.extra_chat_ids.is_empty());
        assert!(!subscriber.has_endpoints());
    }

    #[test]
    fn test_subscriber_has_endpoints() {
        let with_extra_only = Subscriber {
            username: "carol".to_string(),
            chat_id: None,
            extra_chat_ids: vec!["444".to_string()],
        };
        assert!(with_extra_only.has_endpoints());

        let without_any = Subscriber {
            username: "dave".to_string(),
            chat_id: None,
            extra_chat_ids: vec![],
        };
        assert!(!without_any.has_endpoints());
    }
}
