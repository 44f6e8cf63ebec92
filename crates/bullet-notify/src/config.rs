use crate::channel::ChannelKind;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// 路由文件中的渠道配置，按 `type` 区分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    Feishu(FeishuConfig),
    Dingtalk(DingTalkConfig),
    Slack(SlackConfig),
    Webhook(WebhookConfig),
    ResendEmail(ResendEmailConfig),
    SmtpEmail(SmtpEmailConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeishuConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub webhook_url: String,
    /// 签名校验密钥
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub template_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DingTalkConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub webhook_url: String,
    /// 加签密钥
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub template_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub webhook_url: String,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub template_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// 渲染结果必须是合法 JSON
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub template_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResendEmailConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    #[serde(default, rename = "from", alias = "from_email")]
    pub from_email: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    /// 缺省时使用服务配置或 RESEND_API_KEY
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub subject_prefix: Option<String>,
    #[serde(default)]
    pub subject_template: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub template_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpEmailConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub tls: SmtpTls,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(rename = "from", alias = "from_email")]
    pub from_email: String,
    #[serde(deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    #[serde(default)]
    pub subject_prefix: Option<String>,
    #[serde(default)]
    pub subject_template: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub template_path: Option<String>,
}

/// SMTP 传输加密方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtpTls {
    /// 465 端口直接 TLS
    Implicit,
    /// 587 端口 STARTTLS
    #[default]
    Starttls,
    /// 明文，仅用于本地中继
    None,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// 日志和接口展示时需要打码的字段
const SECRET_KEYS: &[&str] = &["webhook_url", "url", "secret", "api_key", "password"];
const MASK: &str = "***";

impl ChannelConfig {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelConfig::Feishu(_) => ChannelKind::Feishu,
            ChannelConfig::Dingtalk(_) => ChannelKind::Dingtalk,
            ChannelConfig::Slack(_) => ChannelKind::Slack,
            ChannelConfig::Webhook(_) => ChannelKind::Webhook,
            ChannelConfig::ResendEmail(_) => ChannelKind::ResendEmail,
            ChannelConfig::SmtpEmail(_) => ChannelKind::SmtpEmail,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ChannelConfig::Feishu(c) => c.name.as_deref(),
            ChannelConfig::Dingtalk(c) => c.name.as_deref(),
            ChannelConfig::Slack(c) => c.name.as_deref(),
            ChannelConfig::Webhook(c) => c.name.as_deref(),
            ChannelConfig::ResendEmail(c) => c.name.as_deref(),
            ChannelConfig::SmtpEmail(c) => c.name.as_deref(),
        }
    }

    /// 渠道实例名，未配置时为类型名
    pub fn display_name(&self) -> String {
        self.name()
            .map(str::to_string)
            .unwrap_or_else(|| self.kind().to_string())
    }

    /// 打码后的配置：URL、密钥、口令、自定义头的值都替换为 `***`
    pub fn redacted(&self) -> Value {
        let mut value = match serde_json::to_value(self) {
            Ok(v) => v,
            Err(_) => return serde_json::json!({ "type": self.kind().as_str() }),
        };

        if let Value::Object(map) = &mut value {
            for key in SECRET_KEYS {
                if let Some(v) = map.get_mut(*key) {
                    if !v.is_null() {
                        *v = Value::String(MASK.to_string());
                    }
                }
            }
            if let Some(Value::Object(headers)) = map.get_mut("headers") {
                for v in headers.values_mut() {
                    *v = Value::String(MASK.to_string());
                }
            }
        }

        value
    }
}
