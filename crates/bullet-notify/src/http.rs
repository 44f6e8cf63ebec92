use bullet_core::{ConfigError, DeliveryError};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;
use std::time::Duration;

const ERROR_BODY_LIMIT: usize = 512;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 每个渠道一个客户端，请求超时由分发器统一控制
pub(crate) fn build_client(channel_type: &str) -> Result<Client, ConfigError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| {
            ConfigError::channel(channel_type, format!("failed to build HTTP client: {e}"))
        })
}

/// 校验渠道地址：必须是 http(s) URL
pub(crate) fn validate_url(channel_type: &str, field: &str, url: &str) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::channel(channel_type, format!("{field} is required")));
    }

    let parsed = Url::parse(url)
        .map_err(|e| ConfigError::channel(channel_type, format!("invalid {field}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::channel(
            channel_type,
            format!("{field} must use http or https, got {scheme}"),
        )),
    }
}

/// 发送请求并检查 HTTP 状态，成功时返回响应体文本
pub(crate) async fn send(request: RequestBuilder) -> Result<String, DeliveryError> {
    let response = request
        .send()
        .await
        .map_err(|e| DeliveryError::Request(e.to_string()))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(DeliveryError::Status {
            status: status.as_u16(),
            body: truncate(&body, ERROR_BODY_LIMIT),
        });
    }

    Ok(body)
}

/// 机器人类接口：HTTP 200 之后还要检查业务码
pub(crate) fn parse_json_body(body: &str) -> Result<Value, DeliveryError> {
    serde_json::from_str(body).map_err(|_| {
        DeliveryError::Rejected(format!(
            "unexpected response: {}",
            truncate(body, ERROR_BODY_LIMIT)
        ))
    })
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
