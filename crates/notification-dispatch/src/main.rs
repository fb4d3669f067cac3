//! 通知分发服务
//!
//! 消费事件 topic 上的消息，向订阅用户推送 Telegram 通知，
//! 并提供监听器启停的运维 API。

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use herald_shared::config::AppConfig;
use herald_shared::database::Database;
use herald_shared::kafka::KafkaProducer;
use notification_dispatch::admin::{self, AppState};
use notification_dispatch::listener::ListenerManager;
use notification_dispatch::processor::MessageProcessor;
use notification_dispatch::resolver::SubscriberResolver;
use notification_dispatch::startup;
use notification_dispatch::store::PgEventStore;
use notification_dispatch::telegram::TelegramClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("notification-dispatch").unwrap_or_default();
    herald_shared::observability::init(&config.observability)?;

    info!("Starting notification-dispatch on {}", config.server_addr());

    // 基础设施
    let db = Database::connect(&config.database).await?;
    let store = Arc::new(PgEventStore::new(db.pool().clone()));
    let telegram = Arc::new(TelegramClient::new(&config.telegram)?);
    let producer = KafkaProducer::new(&config.kafka)?;

    // 处理管道与监听管理器
    let processor = Arc::new(MessageProcessor::new(
        SubscriberResolver::new(store.clone()),
        telegram,
    ));
    let manager = Arc::new(ListenerManager::new(
        config.kafka.clone(),
        processor,
        producer,
    ));

    // 启动时为所有已知事件 topic 恢复监听；
    // 初始化失败只记录日志，不阻止运维 API 启动
    match startup::start_all_listeners(store.as_ref(), &manager).await {
        Ok((success, failure)) => {
            info!(success, failure, "启动监听器初始化完成");
        }
        Err(e) => {
            error!(error = %e, "启动监听器初始化失败");
        }
    }

    // 运维 API
    let state = AppState {
        manager: manager.clone(),
    };
    let app = admin::routes().with_state(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Admin API listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // HTTP 已停止，等待所有消费循环排空在途消息后退出
    manager.shutdown_all().await;
    db.close().await;
    info!("notification-dispatch stopped");

    Ok(())
}

/// 等待进程退出信号
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "监听退出信号失败");
    }
    info!("收到退出信号，开始优雅关闭");
}
