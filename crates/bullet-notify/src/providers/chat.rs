use super::{link_of, MessageTemplate};
use crate::channel::{Channel, ChannelKind, RenderedMessage};
use crate::http;
use crate::template::{
    event_context, with_var, DEFAULT_MARKDOWN_TEMPLATE, DEFAULT_SLACK_TEMPLATE,
};
use async_trait::async_trait;
use base64::Engine;
use bullet_core::{DeliveryError, Event, TemplateError};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// 飞书机器人
// ============================================================================

/// 飞书卡片正文（lark_md）
const DEFAULT_FEISHU_TEMPLATE: &str = r#"**{{ display_title }}**
{% if description %}
**详情:** {{ description }}
{% endif %}
**时间:** {{ timestamp_local }}
{% if extra_labels %}
**标签:** {% for key, value in extra_labels|dictsort %}`{{ key }}={{ value }}` {% endfor %}
{% endif %}"#;

pub struct FeishuChannel {
    name: String,
    webhook_url: String,
    secret: Option<String>,
    template: MessageTemplate,
    client: Client,
}

impl FeishuChannel {
    pub fn new(
        name: impl Into<String>,
        webhook_url: impl Into<String>,
        secret: Option<String>,
        template: MessageTemplate,
        client: Client,
    ) -> Self {
        Self {
            name: name.into(),
            webhook_url: webhook_url.into(),
            secret: secret.filter(|s| !s.is_empty()),
            template,
            client,
        }
    }

    fn build_card(&self, event: &Event, content: String) -> Value {
        let (icon, status, color) = if event.is_resolved() {
            ("✅", "告警恢复", "green")
        } else {
            ("🚨", "告警触发", "red")
        };

        let mut elements = vec![json!({
            "tag": "div",
            "text": {"tag": "lark_md", "content": content}
        })];

        if let Some(url) = link_of(event) {
            elements.push(json!({
                "tag": "action",
                "actions": [{
                    "tag": "button",
                    "text": {"tag": "plain_text", "content": "查看详情"},
                    "type": "primary",
                    "url": url
                }]
            }));
        }

        elements.push(json!({"tag": "hr"}));
        elements.push(json!({
            "tag": "note",
            "elements": [{
                "tag": "plain_text",
                "content": format!("来源: {} | 类型: {}", event.source(), event.event_type())
            }]
        }));

        json!({
            "msg_type": "interactive",
            "card": {
                "config": {"wide_screen_mode": true},
                "header": {
                    "title": {
                        "tag": "plain_text",
                        "content": format!("{icon} [{}] {status}", event.source().to_uppercase())
                    },
                    "template": color
                },
                "elements": elements
            }
        })
    }
}

/// 飞书签名：以 `timestamp\nsecret` 为密钥对空串做 HmacSHA256，再 Base64
pub fn feishu_sign(timestamp: i64, secret: &str) -> Result<String, DeliveryError> {
    let key = format!("{timestamp}\n{secret}");
    let mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| DeliveryError::Signing(e.to_string()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl Channel for FeishuChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Feishu
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, event: &Event) -> Result<RenderedMessage, TemplateError> {
        // 标签行不展示 alertname
        let extra_labels: serde_json::Map<String, Value> = event
            .labels()
            .iter()
            .filter(|(key, _)| key.as_str() != "alertname")
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        let context = with_var(
            event_context(event)?,
            "extra_labels",
            Value::Object(extra_labels),
        );
        let content = self.template.render_or(DEFAULT_FEISHU_TEMPLATE, &context)?;
        Ok(RenderedMessage::new(
            event.display_title(),
            self.build_card(event, content),
        ))
    }

    async fn deliver(&self, message: &RenderedMessage) -> Result<(), DeliveryError> {
        let mut payload = message.body.clone();

        if let (Some(secret), Value::Object(map)) = (&self.secret, &mut payload) {
            let timestamp = chrono::Utc::now().timestamp();
            map.insert("timestamp".to_string(), json!(timestamp.to_string()));
            map.insert("sign".to_string(), json!(feishu_sign(timestamp, secret)?));
        }

        let body = http::send(self.client.post(&self.webhook_url).json(&payload)).await?;
        let response = http::parse_json_body(&body)?;

        let code = response
            .get("code")
            .or_else(|| response.get("StatusCode"))
            .and_then(Value::as_i64);

        match code {
            Some(0) => Ok(()),
            _ => {
                let msg = response
                    .get("msg")
                    .or_else(|| response.get("StatusMessage"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Err(DeliveryError::Rejected(format!(
                    "feishu code {}: {msg}",
                    code.map_or_else(|| "missing".to_string(), |c| c.to_string())
                )))
            }
        }
    }
}

// ============================================================================
// 钉钉机器人
// ============================================================================

pub struct DingTalkChannel {
    name: String,
    webhook_url: String,
    secret: Option<String>,
    template: MessageTemplate,
    client: Client,
}

impl DingTalkChannel {
    pub fn new(
        name: impl Into<String>,
        webhook_url: impl Into<String>,
        secret: Option<String>,
        template: MessageTemplate,
        client: Client,
    ) -> Self {
        Self {
            name: name.into(),
            webhook_url: webhook_url.into(),
            secret: secret.filter(|s| !s.is_empty()),
            template,
            client,
        }
    }

    /// 加签：毫秒时间戳与签名追加到 URL 查询串
    fn signed_url(&self) -> Result<String, DeliveryError> {
        let Some(secret) = &self.secret else {
            return Ok(self.webhook_url.clone());
        };

        let timestamp = chrono::Utc::now().timestamp_millis();
        let string_to_sign = format!("{timestamp}\n{secret}");

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| DeliveryError::Signing(e.to_string()))?;
        mac.update(string_to_sign.as_bytes());
        let sign = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        let separator = if self.webhook_url.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{}{separator}timestamp={timestamp}&sign={}",
            self.webhook_url,
            urlencoding::encode(&sign)
        ))
    }
}

#[async_trait]
impl Channel for DingTalkChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Dingtalk
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, event: &Event) -> Result<RenderedMessage, TemplateError> {
        let context = event_context(event)?;
        let text = self.template.render_or(DEFAULT_MARKDOWN_TEMPLATE, &context)?;
        let title = event.display_title();

        let body = json!({
            "msgtype": "markdown",
            "markdown": {
                "title": title,
                "text": text
            }
        });

        Ok(RenderedMessage::new(title, body))
    }

    async fn deliver(&self, message: &RenderedMessage) -> Result<(), DeliveryError> {
        let url = self.signed_url()?;
        let body = http::send(self.client.post(&url).json(&message.body)).await?;
        let response = http::parse_json_body(&body)?;

        match response.get("errcode").and_then(Value::as_i64) {
            Some(0) => Ok(()),
            code => Err(DeliveryError::Rejected(format!(
                "dingtalk errcode {}: {}",
                code.map_or_else(|| "missing".to_string(), |c| c.to_string()),
                response
                    .get("errmsg")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
            ))),
        }
    }
}

// ============================================================================
// Slack
// ============================================================================

pub struct SlackChannel {
    name: String,
    webhook_url: String,
    template: MessageTemplate,
    client: Client,
}

impl SlackChannel {
    pub fn new(
        name: impl Into<String>,
        webhook_url: impl Into<String>,
        template: MessageTemplate,
        client: Client,
    ) -> Self {
        Self {
            name: name.into(),
            webhook_url: webhook_url.into(),
            template,
            client,
        }
    }

    fn color_of(event: &Event) -> &'static str {
        if event.is_resolved() {
            return "good";
        }
        match event.label("severity") {
            Some("critical") | Some("error") => "danger",
            _ => "warning",
        }
    }
}

#[async_trait]
impl Channel for SlackChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, event: &Event) -> Result<RenderedMessage, TemplateError> {
        let context = event_context(event)?;
        let title = event.display_title();
        let text = self.template.render_or(DEFAULT_SLACK_TEMPLATE, &context)?;

        // 自定义模板直接作为消息文本
        if self.template.is_custom() {
            return Ok(RenderedMessage::new(title, json!({ "text": text })));
        }

        let prefix = if event.is_resolved() { "[RESOLVED]" } else { "[FIRING]" };

        let mut attachment = json!({
            "color": Self::color_of(event),
            "title": title,
            "text": text,
            "footer": format!("{} / {}", event.source(), event.event_type()),
            "ts": event.timestamp().timestamp()
        });
        if let Some(url) = link_of(event) {
            attachment["title_link"] = json!(url);
        }

        let body = json!({
            "text": format!("{prefix} {title}"),
            "attachments": [attachment]
        });

        Ok(RenderedMessage::new(title, body))
    }

    async fn deliver(&self, message: &RenderedMessage) -> Result<(), DeliveryError> {
        http::send(self.client.post(&self.webhook_url).json(&message.body)).await?;
        Ok(())
    }
}
