//! 渠道实现

mod chat;
mod email;
mod webhook;

pub use chat::{DingTalkChannel, FeishuChannel, SlackChannel};
pub use email::{EmailTemplates, ResendEmailChannel, SmtpEmailChannel};
pub use webhook::WebhookChannel;

use crate::template::TemplateRenderer;
use bullet_core::{Event, TemplateError};
use serde_json::Value;
use std::sync::Arc;

/// 渠道的模板部分：自定义模板源码（可选）加共享渲染器
#[derive(Clone)]
pub struct MessageTemplate {
    name: String,
    custom: Option<String>,
    renderer: Arc<TemplateRenderer>,
}

impl MessageTemplate {
    pub fn new(
        name: impl Into<String>,
        custom: Option<String>,
        renderer: Arc<TemplateRenderer>,
    ) -> Self {
        Self {
            name: name.into(),
            custom,
            renderer,
        }
    }

    pub fn is_custom(&self) -> bool {
        self.custom.is_some()
    }

    /// 有自定义模板用自定义模板，否则用给定的内置模板
    pub fn render_or(&self, default: &str, context: &Value) -> Result<String, TemplateError> {
        match &self.custom {
            Some(source) => self.renderer.render(&self.name, source, context),
            None => self.renderer.render(&format!("{}:default", self.name), default, context),
        }
    }

    pub fn renderer(&self) -> &TemplateRenderer {
        &self.renderer
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 告警详情链接：统一告警的 generatorURL，旧版 Grafana 的 ruleUrl
pub(crate) fn link_of(event: &Event) -> Option<&str> {
    let raw = event.raw();
    raw.pointer("/alert/generatorURL")
        .or_else(|| raw.get("generatorURL"))
        .or_else(|| raw.get("ruleUrl"))
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
}
