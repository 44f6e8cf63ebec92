use super::MessageTemplate;
use crate::channel::{Channel, ChannelKind, RenderedMessage};
use crate::http;
use crate::template::event_context;
use async_trait::async_trait;
use bullet_core::{DeliveryError, Event, TemplateError};
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;

/// 通用 Webhook：默认把规范化事件原样 POST 出去，
/// 配置了模板时以渲染结果（必须是 JSON）作为请求体。
pub struct WebhookChannel {
    name: String,
    url: String,
    headers: BTreeMap<String, String>,
    template: MessageTemplate,
    client: Client,
}

impl WebhookChannel {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
        template: MessageTemplate,
        client: Client,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            headers,
            template,
            client,
        }
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, event: &Event) -> Result<RenderedMessage, TemplateError> {
        let title = event.display_title();

        if !self.template.is_custom() {
            let body =
                serde_json::to_value(event).map_err(|e| TemplateError::Context(e.to_string()))?;
            return Ok(RenderedMessage::new(title, body));
        }

        let context = event_context(event)?;
        let rendered = self.template.render_or("", &context)?;
        let body: Value =
            serde_json::from_str(&rendered).map_err(|e| TemplateError::InvalidOutput {
                template: self.template.name().to_string(),
                reason: format!("rendered body is not valid JSON: {e}"),
            })?;

        Ok(RenderedMessage::new(title, body))
    }

    async fn deliver(&self, message: &RenderedMessage) -> Result<(), DeliveryError> {
        let mut request = self.client.post(&self.url);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        http::send(request.json(&message.body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateRenderer;
    use serde_json::json;
    use std::sync::Arc;

    fn channel(custom: Option<&str>) -> WebhookChannel {
        WebhookChannel::new(
            "audit",
            "http://localhost/in",
            BTreeMap::new(),
            MessageTemplate::new(
                "audit",
                custom.map(str::to_string),
                Arc::new(TemplateRenderer::new()),
            ),
            Client::new(),
        )
    }

    #[test]
    fn test_default_body_is_the_event() {
        let event = Event::builder("kline")
            .event_type("breakout")
            .label("symbol", "BTCUSDT")
            .build();

        let message = channel(None).render(&event).unwrap();
        assert_eq!(message.body["source"], "kline");
        assert_eq!(message.body["type"], "breakout");
        assert_eq!(message.body["labels"]["symbol"], "BTCUSDT");
    }

    #[test]
    fn test_template_escapes_free_text_with_tojson() {
        let event = Event::builder("kline")
            .title("BTC \"breakout\" 5%")
            .description("line1\nline2")
            .build();

        let message = channel(Some(
            r#"{"text": {{ display_title|tojson }}, "detail": {{ description|tojson }}}"#,
        ))
        .render(&event)
        .unwrap();

        assert_eq!(message.body["text"], "BTC \"breakout\" 5%");
        assert_eq!(message.body["detail"], "line1\nline2");
    }

    #[test]
    fn test_template_body_must_be_json() {
        let event = Event::builder("kline").label("symbol", "ETHUSDT").build();

        let message = channel(Some(
            r#"{"text": "{{ labels.symbol }}", "resolved": {{ is_resolved }}}"#,
        ))
        .render(&event)
        .unwrap();
        assert_eq!(message.body, json!({"text": "ETHUSDT", "resolved": false}));

        let err = channel(Some("plain {{ source }}")).render(&event).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidOutput { .. }));
    }
}
