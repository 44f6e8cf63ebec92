use std::time::Duration;
use thiserror::Error;

/// 入站负载无法解析，作为客户端错误返回给调用方
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("malformed {source_id} payload: {reason}")]
    MalformedPayload { source_id: String, reason: String },
}

impl ParseError {
    pub fn malformed(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ParseError::MalformedPayload {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }
}

/// 路由表或渠道配置结构非法；启动时致命，重载时保留旧配置
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("invalid routes document: {0}")]
    Document(String),

    #[error("route '{route}': {reason}")]
    InvalidRoute { route: String, reason: String },

    #[error("invalid {channel_type} channel: {reason}")]
    InvalidChannel {
        channel_type: String,
        reason: String,
    },

    #[error("invalid settings: {0}")]
    Settings(String),
}

impl ConfigError {
    pub fn channel(channel_type: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidChannel {
            channel_type: channel_type.into(),
            reason: reason.into(),
        }
    }
}

/// 渲染失败，仅影响当前渠道
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template '{template}' failed to render: {reason}")]
    Render { template: String, reason: String },

    #[error("failed to build template context: {0}")]
    Context(String),

    #[error("template '{template}' produced invalid output: {reason}")]
    InvalidOutput { template: String, reason: String },
}

/// 投递失败，仅影响当前渠道
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rejected by destination: {0}")]
    Rejected(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to sign request: {0}")]
    Signing(String),

    #[error("delivery task aborted: {0}")]
    Aborted(String),
}

impl DeliveryError {
    /// 网络/超时/5xx 类错误可以重试，目标明确拒绝的不重试
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Request(_) | DeliveryError::Timeout(_) => true,
            DeliveryError::Status { status, .. } => *status >= 500 || *status == 429,
            DeliveryError::Rejected(_) | DeliveryError::Signing(_) | DeliveryError::Aborted(_) => {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::malformed("grafana", "alerts must be an array");
        assert_eq!(
            err.to_string(),
            "malformed grafana payload: alerts must be an array"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::channel("feishu", "webhook_url is required");
        assert_eq!(
            err.to_string(),
            "invalid feishu channel: webhook_url is required"
        );
    }

    #[test]
    fn test_delivery_error_retryable() {
        assert!(DeliveryError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(DeliveryError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!DeliveryError::Status {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!DeliveryError::Rejected("code=19001".into()).is_retryable());
    }
}
