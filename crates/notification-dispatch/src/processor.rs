//! 消息处理管道
//!
//! 单条入站消息的完整处理流程：解析 → 解析订阅目标 → 格式化 →
//! 逐个订阅者送达并统计结果。存储层错误向上传播，
//! 由监听器的消息级重试策略决定重投或进入死信 topic。

use std::sync::Arc;

use tracing::{info, warn};

use herald_shared::error::Result;

use crate::formatter::format_notification;
use crate::parser::NotificationRecord;
use crate::resolver::SubscriberResolver;
use crate::telegram::DeliveryClient;

/// 单条消息的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// topic 未绑定事件定义，消息被跳过
    NoEvent,
    /// 事件存在但没有订阅者
    NoSubscribers,
    /// 已向订阅者分发，附带成功/失败计数
    Delivered { success: u32, failure: u32 },
}

/// 消息处理器
pub struct MessageProcessor {
    resolver: SubscriberResolver,
    delivery: Arc<dyn DeliveryClient>,
}

impl MessageProcessor {
    pub fn new(resolver: SubscriberResolver, delivery: Arc<dyn DeliveryClient>) -> Self {
        Self { resolver, delivery }
    }

    /// 处理一条入站消息
    ///
    /// 解析不会失败（无法解码的负载降级为纯文本记录）；
    /// "topic 未绑定事件" 和 "事件无订阅者" 是正常终止，不产生送达副作用。
    pub async fn process(&self, topic: &str, payload: &[u8]) -> Result<ProcessOutcome> {
        let record = NotificationRecord::parse(payload);

        let Some((event, subscribers)) = self.resolver.resolve(topic).await? else {
            warn!(topic, "topic 未绑定事件定义，跳过消息处理");
            return Ok(ProcessOutcome::NoEvent);
        };

        if subscribers.is_empty() {
            info!(
                topic,
                event = %event.event_name,
                "事件没有订阅者，跳过通知"
            );
            return Ok(ProcessOutcome::NoSubscribers);
        }

        info!(
            topic,
            event = %event.event_name,
            subscribers = subscribers.len(),
            "开始分发通知"
        );

        let text = format_notification(&record, &event);

        // 顺序发送，限制订阅者数量突增时的资源占用；
        // 跨订阅者的送达顺序不属于对外契约。
        let mut success: u32 = 0;
        let mut failure: u32 = 0;
        for subscriber in &subscribers {
            if self.delivery.send_to_subscriber(subscriber, &text).await {
                success += 1;
            } else {
                failure += 1;
            }
        }

        info!(topic, success, failure, "通知分发完成");
        Ok(ProcessOutcome::Delivered { success, failure })
    }
}
