//! 动态 topic 监听管理
//!
//! 管理当前活跃的每 topic 消费任务：运行时启动、停止、去重，
//! 并把每个消费任务的消息回调接到 解析 → 目标解析 → 格式化 → 送达 管道上。
//! 处理失败的消息按指数退避重试，重试耗尽或遇到毒消息错误时
//! 将原始负载发布到 `<topic>.DLT`。
//!
//! 注册表以 topic 本身为键。启动时的查重插入与停止时的查重移除
//! 都是 DashMap 分片锁内的单次原子操作，同一 topic 上并发的
//! start/stop 交错不会造成重复注册或漏停。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use herald_shared::config::KafkaConfig;
use herald_shared::error::HeraldError;
use herald_shared::kafka::{ConsumerMessage, KafkaConsumer, KafkaProducer, dlt_topic};
use herald_shared::retry::{RetryPolicy, retry_with_policy};

use crate::processor::MessageProcessor;

// ---------------------------------------------------------------------------
// ListenerHandle
// ---------------------------------------------------------------------------

/// 单个 topic 的活跃监听句柄
///
/// 持有消费任务的关闭信号与任务句柄。句柄从注册表移除并发出关闭信号后，
/// 消费循环在处理完在途消息后自然退出——停止从不打断正在执行的回调。
struct ListenerHandle {
    topic: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    created_at: DateTime<Utc>,
}

/// 对外暴露的监听器快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerInfo {
    pub topic: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ListenerManager
// ---------------------------------------------------------------------------

/// 动态监听管理器
///
/// 注册表是本服务唯一的可变共享状态；Kafka 生产者与消息处理器
/// 构造后只读共享，可安全跨消费任务并发使用。
pub struct ListenerManager {
    registry: DashMap<String, ListenerHandle>,
    kafka: KafkaConfig,
    processor: Arc<MessageProcessor>,
    producer: KafkaProducer,
    retry: RetryPolicy,
}

impl ListenerManager {
    pub fn new(
        kafka: KafkaConfig,
        processor: Arc<MessageProcessor>,
        producer: KafkaProducer,
    ) -> Self {
        Self {
            registry: DashMap::new(),
            kafka,
            processor,
            producer,
            retry: RetryPolicy::default(),
        }
    }

    /// 开始监听指定 topic
    ///
    /// 返回 false 的三种情况都不产生副作用：topic 为空白、
    /// 已在监听（幂等空操作）、消费者创建/订阅失败（记日志，不向调用方抛错）。
    pub fn start_listening(&self, topic: &str) -> bool {
        let topic = topic.trim();
        if topic.is_empty() {
            warn!("不能监听空白 topic");
            return false;
        }

        match self.registry.entry(topic.to_string()) {
            Entry::Occupied(_) => {
                info!(topic, "已在监听该 topic，忽略重复启动");
                false
            }
            Entry::Vacant(entry) => {
                let consumer = match KafkaConsumer::new(&self.kafka, None) {
                    Ok(consumer) => consumer,
                    Err(e) => {
                        error!(topic, error = %e, "创建消费者失败");
                        return false;
                    }
                };
                if let Err(e) = consumer.subscribe(&[topic]) {
                    error!(topic, error = %e, "订阅 topic 失败");
                    return false;
                }

                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let task = tokio::spawn(consume_loop(
                    consumer,
                    shutdown_rx,
                    topic.to_string(),
                    self.processor.clone(),
                    self.producer.clone(),
                    self.retry.clone(),
                ));

                entry.insert(ListenerHandle {
                    topic: topic.to_string(),
                    shutdown: shutdown_tx,
                    task,
                    created_at: Utc::now(),
                });

                info!(topic, "已开始监听 topic");
                true
            }
        }
    }

    /// 停止监听指定 topic
    ///
    /// 仅发出关闭信号并移除注册项；在途消息的处理不受影响，
    /// 消费任务在后台自然退出。
    pub fn stop_listening(&self, topic: &str) -> bool {
        let topic = topic.trim();
        if topic.is_empty() {
            warn!("不能停止空白 topic");
            return false;
        }

        let Some((_, handle)) = self.registry.remove(topic) else {
            info!(topic, "未在监听该 topic");
            return false;
        };

        // 接收端随任务退出而关闭时 send 会失败，忽略即可
        let _ = handle.shutdown.send(true);
        info!(topic, "已停止监听 topic");
        true
    }

    /// 是否正在监听指定 topic（纯注册表查询，不触碰 broker）
    pub fn is_listening(&self, topic: &str) -> bool {
        self.registry.contains_key(topic.trim())
    }

    /// 当前活跃监听器快照，按 topic 排序
    pub fn active_listeners(&self) -> Vec<ListenerInfo> {
        let mut items: Vec<ListenerInfo> = self
            .registry
            .iter()
            .map(|entry| ListenerInfo {
                topic: entry.value().topic.clone(),
                created_at: entry.value().created_at,
            })
            .collect();
        items.sort_by(|a, b| a.topic.cmp(&b.topic));
        items
    }

    /// 停止全部监听器并等待消费任务退出
    ///
    /// 用于进程关闭：先发出所有关闭信号，再逐个等待任务排空在途消息。
    pub async fn shutdown_all(&self) {
        let topics: Vec<String> = self
            .registry
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        info!(count = topics.len(), "停止全部 topic 监听器");

        for topic in topics {
            if let Some((_, handle)) = self.registry.remove(&topic) {
                let _ = handle.shutdown.send(true);
                if let Err(e) = handle.task.await {
                    error!(topic = %handle.topic, error = %e, "等待消费任务退出失败");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 消费循环
// ---------------------------------------------------------------------------

/// 单个 topic 的消费循环，运行在独立的 tokio 任务上
///
/// broker 客户端保证每 topic 同一时刻至多一条消息在回调中（topic 内串行），
/// 不同 topic 的循环完全并行。
async fn consume_loop(
    consumer: KafkaConsumer,
    shutdown: watch::Receiver<bool>,
    topic: String,
    processor: Arc<MessageProcessor>,
    producer: KafkaProducer,
    retry: RetryPolicy,
) {
    consumer
        .start(shutdown, |msg| {
            let processor = &processor;
            let producer = &producer;
            let retry = &retry;
            async move {
                handle_message(processor.as_ref(), producer, retry, &msg).await;
                Ok(())
            }
        })
        .await;

    info!(topic, "topic 消费循环已退出");
}

/// 在消息级重试策略下处理单条消息
///
/// 可重试错误（存储、broker、外部服务故障）按退避重投整条消息；
/// 不可重试错误与重试耗尽的消息路由到死信 topic。
async fn handle_message(
    processor: &MessageProcessor,
    producer: &KafkaProducer,
    retry: &RetryPolicy,
    msg: &ConsumerMessage,
) {
    let outcome = retry_with_policy(
        retry,
        "process_message",
        |e| e.is_retryable(),
        || processor.process(&msg.topic, &msg.payload),
    )
    .await;

    if let Err(e) = outcome {
        error!(
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            error = %e,
            "消息处理失败，路由到死信 topic"
        );
        route_to_dlt(producer, msg, &e).await;
    }
}

/// 将原始负载发布到 `<topic>.DLT`
///
/// 死信投递本身失败时只能记录日志——消息可能丢失，需人工介入。
async fn route_to_dlt(producer: &KafkaProducer, msg: &ConsumerMessage, cause: &HeraldError) {
    let dlt = dlt_topic(&msg.topic);
    let key = msg.key.as_deref().unwrap_or(&msg.topic);

    match producer.send(&dlt, key, &msg.payload).await {
        Ok(_) => {
            warn!(
                topic = %msg.topic,
                dlt = %dlt,
                offset = msg.offset,
                cause = %cause,
                "消息已路由到死信 topic"
            );
        }
        Err(e) => {
            error!(
                topic = %msg.topic,
                dlt = %dlt,
                offset = msg.offset,
                cause = %cause,
                error = %e,
                "死信投递失败，消息可能丢失"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
