//! Ingestion 错误类型

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 负载解析失败
    #[error("failed to parse payload on '{topic}': {message}")]
    ParseFailed {
        /// 来源 topic
        topic: String,
        /// 错误消息
        message: String,
    },

    /// 数据源已在运行
    #[error("source {source_name} is already running")]
    AlreadyRunning {
        /// 数据源名称
        source_name: String,
    },
}

impl IngestionError {
    pub fn parse_failed(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseFailed {
            topic: topic.into(),
            message: message.into(),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
