//! 通知目标解析
//!
//! 根据 topic 找到其绑定的事件定义与全部订阅者快照。
//! "topic 未绑定事件" 与 "事件没有订阅者" 都是合法的终止状态，
//! 以返回值而非错误表达，由调用方短路后续分发。

use std::sync::Arc;

use herald_shared::error::Result;

use crate::store::{EventDefinition, EventStore, Subscriber};

/// 订阅者解析器
pub struct SubscriberResolver {
    store: Arc<dyn EventStore>,
}

impl SubscriberResolver {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// 解析 topic 对应的事件及其订阅者
    ///
    /// 返回 `None` 表示 topic 未绑定任何事件定义；
    /// 返回的订阅者列表可能为空（事件存在但无人订阅）。
    /// 存储层错误原样向上传播，交由消息级重试策略处理。
    pub async fn resolve(
        &self,
        topic: &str,
    ) -> Result<Option<(EventDefinition, Vec<Subscriber>)>> {
        let Some(event) = self.store.find_event_by_topic(topic).await? else {
            return Ok(None);
        };

        let subscribers = self.store.find_subscribers_by_event(event.id).await?;
        Ok(Some((event, subscribers)))
    }
}
