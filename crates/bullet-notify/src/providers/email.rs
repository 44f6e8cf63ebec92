use super::MessageTemplate;
use crate::channel::{Channel, ChannelKind, RenderedMessage};
use crate::config::{SmtpEmailConfig, SmtpTls};
use crate::http;
use crate::template::{
    event_context, with_var, DEFAULT_EMAIL_HTML_TEMPLATE, DEFAULT_EMAIL_SUBJECT_TEMPLATE,
};
use async_trait::async_trait;
use bullet_core::{ConfigError, DeliveryError, Event, TemplateError};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde_json::{json, Value};

/// 邮件主题与正文模板
#[derive(Clone)]
pub struct EmailTemplates {
    subject_prefix: String,
    subject: Option<String>,
    body: MessageTemplate,
}

impl EmailTemplates {
    pub fn new(
        subject_prefix: Option<String>,
        subject: Option<String>,
        body: MessageTemplate,
    ) -> Self {
        Self {
            subject_prefix: subject_prefix.unwrap_or_default(),
            subject,
            body,
        }
    }

    /// 返回 (主题, HTML 正文)
    pub fn render(&self, event: &Event) -> Result<(String, String), TemplateError> {
        let context = with_var(
            event_context(event)?,
            "subject_prefix",
            json!(self.subject_prefix),
        );

        let subject_source = self
            .subject
            .as_deref()
            .unwrap_or(DEFAULT_EMAIL_SUBJECT_TEMPLATE);
        let subject = self.body.renderer().render(
            &format!("{}:subject", self.body.name()),
            subject_source,
            &context,
        )?;
        // 邮件头不允许换行
        let subject = subject.lines().map(str::trim).collect::<Vec<_>>().join(" ");

        let html = self.body.render_or(DEFAULT_EMAIL_HTML_TEMPLATE, &context)?;
        Ok((subject, html))
    }
}

// ============================================================================
// Resend 邮件 API
// ============================================================================

pub struct ResendEmailChannel {
    name: String,
    api_url: String,
    api_key: String,
    from: String,
    to: Vec<String>,
    reply_to: Option<String>,
    templates: EmailTemplates,
    client: Client,
}

impl ResendEmailChannel {
    pub fn new(
        name: impl Into<String>,
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
        to: Vec<String>,
        templates: EmailTemplates,
        client: Client,
    ) -> Self {
        Self {
            name: name.into(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            from: from.into(),
            to,
            reply_to: None,
            templates,
            client,
        }
    }

    pub fn with_reply_to(mut self, reply_to: Option<String>) -> Self {
        self.reply_to = reply_to.filter(|s| !s.trim().is_empty());
        self
    }
}

#[async_trait]
impl Channel for ResendEmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::ResendEmail
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, event: &Event) -> Result<RenderedMessage, TemplateError> {
        let (subject, html) = self.templates.render(event)?;

        let mut body = json!({
            "from": self.from,
            "to": self.to,
            "subject": subject,
            "html": html
        });
        if let Some(reply_to) = &self.reply_to {
            body["reply_to"] = json!(reply_to);
        }

        Ok(RenderedMessage::new(subject, body))
    }

    async fn deliver(&self, message: &RenderedMessage) -> Result<(), DeliveryError> {
        http::send(
            self.client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(&message.body),
        )
        .await?;
        Ok(())
    }
}

// ============================================================================
// SMTP 邮件
// ============================================================================

pub struct SmtpEmailChannel {
    name: String,
    from: Mailbox,
    to: Vec<Mailbox>,
    templates: EmailTemplates,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailChannel {
    /// 地址与连接参数在构造时校验；连接本身在首次发送时建立
    pub fn new(
        name: impl Into<String>,
        config: &SmtpEmailConfig,
        templates: EmailTemplates,
    ) -> Result<Self, ConfigError> {
        let kind = ChannelKind::SmtpEmail.as_str();

        if config.host.trim().is_empty() {
            return Err(ConfigError::channel(kind, "host is required"));
        }
        if config.to.is_empty() {
            return Err(ConfigError::channel(kind, "at least one recipient is required"));
        }

        let from: Mailbox = config
            .from_email
            .parse()
            .map_err(|e| ConfigError::channel(kind, format!("invalid from address: {e}")))?;

        let to = config
            .to
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>().map_err(|e| {
                    ConfigError::channel(kind, format!("invalid recipient '{addr}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = match config.tls {
            SmtpTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host),
            SmtpTls::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host),
            SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &config.host,
            )),
        }
        .map_err(|e| ConfigError::channel(kind, format!("invalid SMTP relay: {e}")))?;

        if let Some(port) = config.port {
            builder = builder.port(port);
        }
        if let Some(username) = &config.username {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            ));
        }

        Ok(Self {
            name: name.into(),
            from,
            to,
            templates,
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Channel for SmtpEmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::SmtpEmail
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, event: &Event) -> Result<RenderedMessage, TemplateError> {
        let (subject, html) = self.templates.render(event)?;
        Ok(RenderedMessage::new(
            subject.clone(),
            json!({ "subject": subject, "html": html }),
        ))
    }

    async fn deliver(&self, message: &RenderedMessage) -> Result<(), DeliveryError> {
        let html = message
            .body
            .get("html")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.title.clone());
        for mailbox in &self.to {
            builder = builder.to(mailbox.clone());
        }

        let email = builder
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(|e| DeliveryError::Request(format!("failed to build email: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| DeliveryError::Request(format!("SMTP send failed: {e}")))?;

        Ok(())
    }
}
