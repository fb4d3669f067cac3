//! Telegram 送达客户端
//!
//! 通过 `DeliveryClient` trait 抽象发送行为，便于消息处理层在测试中
//! 替换为 mock。真实实现调用 Telegram Bot API 的 sendMessage 接口，
//! 单次发送内部带指数退避重试，重试耗尽以 false 返回而非抛错，
//! 使调用方能统计失败数而不中断整批分发。

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use herald_shared::config::TelegramConfig;
use herald_shared::error::{HeraldError, Result};
use herald_shared::retry::{RetryPolicy, retry_with_policy};

use crate::store::Subscriber;

// ---------------------------------------------------------------------------
// DeliveryClient trait
// ---------------------------------------------------------------------------

/// 通知送达接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// 向单个 chat 发送消息，重试耗尽后返回 false
    async fn send_message(&self, chat_id: &str, text: &str) -> bool;

    /// 向订阅者的全部端点发送，至少一个端点成功即视为成功
    async fn send_to_subscriber(&self, subscriber: &Subscriber, text: &str) -> bool;
}

// ---------------------------------------------------------------------------
// TelegramClient
// ---------------------------------------------------------------------------

/// Telegram Bot API 客户端
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    retry: RetryPolicy,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| HeraldError::Internal(format!("构建 HTTP 客户端失败: {e}")))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            retry: RetryPolicy::per_send(),
        })
    }

    /// 覆盖重试策略（测试中用毫秒级退避缩短等待）
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 单次 sendMessage 调用
    ///
    /// 消息体使用 HTML parse_mode，与格式化层的转义约定一致。
    /// 传输错误与非 2xx 响应都归类为外部服务错误，交由重试层判断。
    async fn send_once(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| HeraldError::ExternalService {
                service: "telegram".to_string(),
                message: e.to_string(),
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(HeraldError::ExternalService {
                service: "telegram".to_string(),
                message: format!("HTTP {}", response.status()),
            })
        }
    }
}

#[async_trait]
impl DeliveryClient for TelegramClient {
    async fn send_message(&self, chat_id: &str, text: &str) -> bool {
        let result = retry_with_policy(
            &self.retry,
            "telegram_send",
            |e| e.is_retryable(),
            || self.send_once(chat_id, text),
        )
        .await;

        match result {
            Ok(()) => {
                debug!(chat_id, "消息已送达");
                true
            }
            Err(e) => {
                warn!(chat_id, error = %e, "消息发送失败，重试已耗尽");
                false
            }
        }
    }

    async fn send_to_subscriber(&self, subscriber: &Subscriber, text: &str) -> bool {
        let mut delivered = false;

        if let Some(chat_id) = &subscriber.chat_id {
            if self.send_message(chat_id, text).await {
                delivered = true;
            } else {
                warn!(
                    username = %subscriber.username,
                    chat_id = %chat_id,
                    "主端点发送失败"
                );
            }
        }

        for chat_id in &subscriber.extra_chat_ids {
            if self.send_message(chat_id, text).await {
                delivered = true;
            } else {
                warn!(
                    username = %subscriber.username,
                    chat_id = %chat_id,
                    "额外端点发送失败"
                );
            }
        }

        if !delivered {
            warn!(
                username = %subscriber.username,
                "订阅者未配置接收端点或全部发送失败"
            );
        }

        delivered
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
