use async_trait::async_trait;
use bullet_core::{DeliveryError, Event, TemplateError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 渠道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// 飞书机器人
    Feishu,
    /// 钉钉机器人
    Dingtalk,
    /// Slack incoming webhook
    Slack,
    /// 通用 Webhook
    Webhook,
    /// Resend 邮件 API
    ResendEmail,
    /// SMTP 邮件
    SmtpEmail,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Feishu => "feishu",
            ChannelKind::Dingtalk => "dingtalk",
            ChannelKind::Slack => "slack",
            ChannelKind::Webhook => "webhook",
            ChannelKind::ResendEmail => "resend_email",
            ChannelKind::SmtpEmail => "smtp_email",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 渲染结果：标题用于日志，body 是交给 `deliver` 的渠道负载
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub title: String,
    pub body: Value,
}

impl RenderedMessage {
    pub fn new(title: impl Into<String>, body: Value) -> Self {
        Self {
            title: title.into(),
            body,
        }
    }
}

/// 通知渠道
///
/// 渲染与投递分开：渲染失败是 [`TemplateError`]，投递失败是 [`DeliveryError`]。
/// 有状态的渠道（HTTP 客户端、SMTP 连接）私有持有自己的状态，不与其他渠道共享。
#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// 渠道实例名称（日志用），未配置时为类型名
    fn name(&self) -> &str;

    fn render(&self, event: &Event) -> Result<RenderedMessage, TemplateError>;

    async fn deliver(&self, message: &RenderedMessage) -> Result<(), DeliveryError>;
}
