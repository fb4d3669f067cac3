//! 日志初始化模块
//!
//! 基于 tracing-subscriber 提供统一的结构化日志配置。
//! 支持 pretty（人类可读）与 json（结构化）两种输出格式，
//! 日志级别可通过 RUST_LOG 环境变量或配置文件控制。

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::ObservabilityConfig;

/// 初始化全局日志订阅器
///
/// RUST_LOG 环境变量优先于配置文件中的 log_level，
/// 便于临时调整单个模块的日志级别而无需改配置。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if config.log_format == "json" {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).with_ansi(true).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent_failure() {
        // 全局订阅器只能安装一次，二次初始化返回错误而非 panic
        let config = ObservabilityConfig::default();
        let first = init(&config);
        let second = init(&config);
        // 至少有一次初始化会因重复安装失败（测试进程可能已有订阅器）
        assert!(first.is_err() || second.is_err());
    }
}
