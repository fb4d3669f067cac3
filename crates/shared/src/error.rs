//! 统一错误处理模块
//!
//! 定义系统中所有共享的错误类型，使用 thiserror 提供良好的错误信息。
//! `is_retryable` 划分瞬时故障与毒消息——监听器据此决定是重试整条消息
//! 还是直接路由到死信 topic。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum HeraldError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    // ==================== Kafka 错误 ====================
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    // ==================== 负载错误 ====================
    #[error("负载格式无效: {0}")]
    MalformedPayload(String),

    // ==================== 验证错误 ====================
    #[error("无效的参数: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    // ==================== 外部服务错误 ====================
    #[error("外部服务错误: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("外部服务超时: {service}")]
    ExternalServiceTimeout { service: String },

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, HeraldError>;

impl HeraldError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::ExternalServiceTimeout { .. } => "EXTERNAL_SERVICE_TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 负载格式、参数类错误重试也不会成功，应直接进入死信 topic；
    /// 数据库、Kafka、外部服务类错误视为瞬时故障。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Kafka(_)
                | Self::ExternalService { .. }
                | Self::ExternalServiceTimeout { .. }
                | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = HeraldError::NotFound {
            entity: "Event".to_string(),
            id: "42".to_string(),
        };
        assert_eq!(err.code(), "NOT_FOUND");

        let err = HeraldError::Kafka("broker down".to_string());
        assert_eq!(err.code(), "KAFKA_ERROR");
    }

    #[test]
    fn test_is_retryable() {
        let db_err = HeraldError::Database(sqlx::Error::PoolTimedOut);
        assert!(db_err.is_retryable());

        let kafka_err = HeraldError::Kafka("连接中断".to_string());
        assert!(kafka_err.is_retryable());

        // 毒消息类错误不应重试
        let malformed = HeraldError::MalformedPayload("非 UTF-8 数据".to_string());
        assert!(!malformed.is_retryable());

        let invalid = HeraldError::InvalidArgument {
            field: "topic".to_string(),
            message: "不能为空".to_string(),
        };
        assert!(!invalid.is_retryable());

        let not_found = HeraldError::NotFound {
            entity: "Event".to_string(),
            id: "42".to_string(),
        };
        assert!(!not_found.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = HeraldError::ExternalService {
            service: "telegram".to_string(),
            message: "HTTP 502".to_string(),
        };
        assert_eq!(err.to_string(), "外部服务错误: telegram - HTTP 502");
    }
}
