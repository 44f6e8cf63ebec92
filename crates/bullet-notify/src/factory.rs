use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::http::{build_client, validate_url};
use crate::providers::{
    DingTalkChannel, EmailTemplates, FeishuChannel, MessageTemplate, ResendEmailChannel,
    SlackChannel, SmtpEmailChannel, WebhookChannel,
};
use crate::template::TemplateRenderer;
use bullet_core::ConfigError;
use reqwest::header::{HeaderName, HeaderValue};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_RESEND_API_URL: &str = "https://api.resend.com/emails";

/// 渠道配置缺省值（来自服务配置）
#[derive(Debug, Clone)]
pub struct ChannelDefaults {
    pub resend_api_key: Option<String>,
    pub resend_from_email: Option<String>,
    pub resend_api_url: String,
}

impl Default for ChannelDefaults {
    fn default() -> Self {
        Self {
            resend_api_key: None,
            resend_from_email: None,
            resend_api_url: DEFAULT_RESEND_API_URL.to_string(),
        }
    }
}

/// 渠道工厂
///
/// 把配置转换为可用的渠道实例，所有结构校验都在这里完成，
/// 校验失败返回 [`ConfigError`]。
pub struct ChannelFactory {
    defaults: ChannelDefaults,
    renderer: Arc<TemplateRenderer>,
    /// `template_path` 的相对路径基准（通常是路由文件所在目录）
    base_dir: Option<PathBuf>,
}

impl ChannelFactory {
    pub fn new(defaults: ChannelDefaults) -> Self {
        Self {
            defaults,
            renderer: Arc::new(TemplateRenderer::new()),
            base_dir: None,
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    pub fn defaults(&self) -> &ChannelDefaults {
        &self.defaults
    }

    pub fn build(&self, config: &ChannelConfig) -> Result<Arc<dyn Channel>, ConfigError> {
        let kind = config.kind();
        let kind_str = kind.as_str();
        let name = config.display_name();

        let channel: Arc<dyn Channel> = match config {
            ChannelConfig::Feishu(c) => {
                validate_url(kind_str, "webhook_url", &c.webhook_url)?;
                let template = self.template(kind_str, &name, &c.template, &c.template_path)?;
                Arc::new(FeishuChannel::new(
                    name,
                    c.webhook_url.clone(),
                    c.secret.clone(),
                    template,
                    build_client(kind_str)?,
                ))
            }
            ChannelConfig::Dingtalk(c) => {
                validate_url(kind_str, "webhook_url", &c.webhook_url)?;
                let template = self.template(kind_str, &name, &c.template, &c.template_path)?;
                Arc::new(DingTalkChannel::new(
                    name,
                    c.webhook_url.clone(),
                    c.secret.clone(),
                    template,
                    build_client(kind_str)?,
                ))
            }
            ChannelConfig::Slack(c) => {
                validate_url(kind_str, "webhook_url", &c.webhook_url)?;
                let template = self.template(kind_str, &name, &c.template, &c.template_path)?;
                Arc::new(SlackChannel::new(
                    name,
                    c.webhook_url.clone(),
                    template,
                    build_client(kind_str)?,
                ))
            }
            ChannelConfig::Webhook(c) => {
                validate_url(kind_str, "url", &c.url)?;
                for (key, value) in &c.headers {
                    HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                        ConfigError::channel(kind_str, format!("invalid header name '{key}': {e}"))
                    })?;
                    HeaderValue::from_str(value).map_err(|e| {
                        ConfigError::channel(
                            kind_str,
                            format!("invalid value for header '{key}': {e}"),
                        )
                    })?;
                }
                let template = self.template(kind_str, &name, &c.template, &c.template_path)?;
                Arc::new(WebhookChannel::new(
                    name,
                    c.url.clone(),
                    c.headers.clone(),
                    template,
                    build_client(kind_str)?,
                ))
            }
            ChannelConfig::ResendEmail(c) => {
                if c.to.is_empty() {
                    return Err(ConfigError::channel(
                        kind_str,
                        "at least one recipient is required",
                    ));
                }

                let api_key = non_empty(&c.api_key)
                    .or_else(|| non_empty(&self.defaults.resend_api_key))
                    .ok_or_else(|| {
                        ConfigError::channel(
                            kind_str,
                            "api_key is not set (configure it on the channel or set RESEND_API_KEY)",
                        )
                    })?;
                let from = non_empty(&c.from_email)
                    .or_else(|| non_empty(&self.defaults.resend_from_email))
                    .ok_or_else(|| ConfigError::channel(kind_str, "from address is not set"))?;

                validate_url(kind_str, "resend_api_url", &self.defaults.resend_api_url)?;
                self.check_subject(kind_str, &name, &c.subject_template)?;

                let body = self.template(kind_str, &name, &c.template, &c.template_path)?;
                Arc::new(ResendEmailChannel::new(
                    name,
                    self.defaults.resend_api_url.clone(),
                    api_key,
                    from,
                    c.to.clone(),
                    EmailTemplates::new(c.subject_prefix.clone(), c.subject_template.clone(), body),
                    build_client(kind_str)?,
                )
                .with_reply_to(c.reply_to.clone()))
            }
            ChannelConfig::SmtpEmail(c) => {
                self.check_subject(kind_str, &name, &c.subject_template)?;
                let body = self.template(kind_str, &name, &c.template, &c.template_path)?;
                Arc::new(SmtpEmailChannel::new(
                    name,
                    c,
                    EmailTemplates::new(c.subject_prefix.clone(), c.subject_template.clone(), body),
                )?)
            }
        };

        Ok(channel)
    }

    /// 解析渠道模板：`template` 与 `template_path` 互斥，文件在加载时读取并做语法检查
    fn template(
        &self,
        kind: &str,
        name: &str,
        inline: &Option<String>,
        path: &Option<String>,
    ) -> Result<MessageTemplate, ConfigError> {
        let source = match (inline, path) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::channel(
                    kind,
                    "template and template_path are mutually exclusive",
                ))
            }
            (Some(inline), None) => Some(inline.clone()),
            (None, Some(path)) => Some(self.read_template(path)?),
            (None, None) => None,
        };

        if let Some(source) = &source {
            self.renderer
                .check(name, source)
                .map_err(|e| ConfigError::channel(kind, e.to_string()))?;
        }

        Ok(MessageTemplate::new(name, source, Arc::clone(&self.renderer)))
    }

    fn check_subject(
        &self,
        kind: &str,
        name: &str,
        subject: &Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(source) = subject {
            self.renderer
                .check(&format!("{name}:subject"), source)
                .map_err(|e| ConfigError::channel(kind, e.to_string()))?;
        }
        Ok(())
    }

    fn read_template(&self, path: &str) -> Result<String, ConfigError> {
        let resolved = match &self.base_dir {
            Some(base) if Path::new(path).is_relative() => base.join(path),
            _ => PathBuf::from(path),
        };

        std::fs::read_to_string(&resolved).map_err(|e| ConfigError::Io {
            path: resolved.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for ChannelFactory {
    fn default() -> Self {
        Self::new(ChannelDefaults::default())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
