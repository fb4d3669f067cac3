//! 启动时恢复监听
//!
//! 进程启动后为存储中每个事件定义的 topic 启动消费者，
//! 单个 topic 的失败不影响其他 topic，最终记录聚合结果。

use tracing::{info, warn};

use herald_shared::error::Result;

use crate::listener::ListenerManager;
use crate::store::EventStore;

/// 为全部已知事件 topic 启动监听器
///
/// 返回（成功数, 失败数）。未配置 topic 的事件计入失败并记录警告；
/// 存储查询失败向上传播，由调用方决定是否继续启动服务。
pub async fn start_all_listeners(
    store: &dyn EventStore,
    manager: &ListenerManager,
) -> Result<(usize, usize)> {
    let events = store.list_events().await?;

    if events.is_empty() {
        info!("存储中没有事件定义，无需启动监听器");
        return Ok((0, 0));
    }

    info!(count = events.len(), "开始为已有事件启动 Kafka 监听器");

    let mut success = 0usize;
    let mut failure = 0usize;

    for event in &events {
        let topic = event.topic.trim();

        if topic.is_empty() {
            warn!(
                event = %event.event_name,
                event_id = event.id,
                "事件未配置 topic，跳过"
            );
            failure += 1;
            continue;
        }

        if manager.start_listening(topic) {
            info!(event = %event.event_name, topic, "监听器已启动");
            success += 1;
        } else {
            warn!(
                event = %event.event_name,
                topic,
                "监听器启动失败或已在监听"
            );
            failure += 1;
        }
    }

    info!(success, failure, "Kafka 监听器初始化完成");
    Ok((success, failure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::MessageProcessor;
    use crate::resolver::SubscriberResolver;
    use crate::store::{EventDefinition, MockEventStore};
    use crate::telegram::MockDeliveryClient;
    use herald_shared::config::KafkaConfig;
    use herald_shared::kafka::KafkaProducer;
    use std::sync::Arc;

    fn make_manager() -> ListenerManager {
        let processor = Arc::new(MessageProcessor::new(
            SubscriberResolver::new(Arc::new(MockEventStore::new())),
            Arc::new(MockDeliveryClient::new()),
        ));
        let kafka = KafkaConfig::default();
        let producer = KafkaProducer::new(&kafka).expect("创建生产者失败");
        ListenerManager::new(kafka, processor, producer)
    }

    fn make_event(id: i64, name: &str, topic: &str) -> EventDefinition {
        EventDefinition {
            id,
            system_name: "shop".to_string(),
            event_name: name.to_string(),
            topic: topic.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_start_all_with_no_events() {
        let mut store = MockEventStore::new();
        store.expect_list_events().returning(|| Ok(vec![]));

        let manager = make_manager();
        let (success, failure) = start_all_listeners(&store, &manager).await.unwrap();

        assert_eq!((success, failure), (0, 0));
        assert!(manager.active_listeners().is_empty());
    }

    #[tokio::test]
    async fn test_start_all_counts_success_and_failure() {
        let mut store = MockEventStore::new();
        store.expect_list_events().returning(|| {
            Ok(vec![
                make_event(1, "order-created", "orders.created"),
                // 未配置 topic 的事件计入失败
                make_event(2, "legacy-event", "   "),
                make_event(3, "payment-settled", "payments.settled"),
            ])
        });

        let manager = make_manager();
        let (success, failure) = start_all_listeners(&store, &manager).await.unwrap();

        assert_eq!((success, failure), (2, 1));
        assert!(manager.is_listening("orders.created"));
        assert!(manager.is_listening("payments.settled"));

        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_start_all_duplicate_topic_counts_as_failure() {
        // 两个事件指向同一 topic：第二次启动是幂等空操作，计入失败
        let mut store = MockEventStore::new();
        store.expect_list_events().returning(|| {
            Ok(vec![
                make_event(1, "order-created", "orders.created"),
                make_event(2, "order-created-v2", "orders.created"),
            ])
        });

        let manager = make_manager();
        let (success, failure) = start_all_listeners(&store, &manager).await.unwrap();

        assert_eq!((success, failure), (1, 1));
        assert_eq!(manager.active_listeners().len(), 1);

        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_start_all_store_error_propagates() {
        let mut store = MockEventStore::new();
        store.expect_list_events().returning(|| {
            Err(herald_shared::error::HeraldError::Database(
                sqlx::Error::PoolTimedOut,
            ))
        });

        let manager = make_manager();
        let result = start_all_listeners(&store, &manager).await;
        assert!(result.is_err());
    }
}
