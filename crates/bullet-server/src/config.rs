use bullet_core::ConfigError;
use bullet_notify::{factory::DEFAULT_RESEND_API_URL, ChannelDefaults, DispatchPolicy};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// 环境变量前缀，例如 `BULLET_PORT`
pub const ENV_PREFIX: &str = "BULLET";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// webhook 请求与投递的关系
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// 启动投递后立即返回 202
    #[default]
    Background,
    /// 等待所有渠道结束，返回逐个目标的结果
    Wait,
}

/// 服务配置
///
/// 加载顺序：内置默认值 → TOML 文件（可缺失）→ `BULLET_*` 环境变量。
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,

    /// 路由文件路径
    pub routes_config: String,
    /// 路由文件轮询间隔，0 表示只在 SIGHUP / 管理接口时重载
    pub reload_interval_secs: u64,

    #[serde(default)]
    pub dispatch_mode: DispatchMode,
    pub delivery_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// 关闭时等待后台投递完成的最长时间
    pub shutdown_drain_secs: u64,

    /// Prometheus exporter 监听地址，不配置则不启动
    #[serde(default)]
    pub metrics_addr: Option<String>,

    #[serde(default)]
    pub resend_api_key: Option<String>,
    #[serde(default)]
    pub resend_from_email: Option<String>,
    pub resend_api_url: String,
}

impl Settings {
    /// 从可选的配置文件和环境变量加载
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?;

        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(false));
        }

        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| ConfigError::Settings(e.to_string()))?;

        let mut settings: Settings = config
            .try_deserialize()
            .map_err(|e| ConfigError::Settings(e.to_string()))?;

        if settings.resend_api_key.is_none() {
            settings.resend_api_key = std::env::var("RESEND_API_KEY")
                .ok()
                .filter(|key| !key.is_empty());
        }

        settings.validate()?;
        Ok(settings)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let builder = Config::builder()
            .set_default("host", "0.0.0.0")
            .and_then(|b| b.set_default("port", 5032))
            .and_then(|b| b.set_default("log_level", "info"))
            .and_then(|b| b.set_default("routes_config", "routes.yaml"))
            .and_then(|b| b.set_default("reload_interval_secs", 5))
            .and_then(|b| b.set_default("delivery_timeout_secs", 30))
            .and_then(|b| b.set_default("max_retries", 0))
            .and_then(|b| b.set_default("retry_backoff_ms", 200))
            .and_then(|b| b.set_default("shutdown_drain_secs", 30))
            .and_then(|b| b.set_default("resend_api_url", DEFAULT_RESEND_API_URL))
            .map_err(|e| ConfigError::Settings(e.to_string()))?;
        Ok(builder)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.routes_config.trim().is_empty() {
            return Err(ConfigError::Settings("routes_config must not be empty".to_string()));
        }
        if self.delivery_timeout_secs == 0 {
            return Err(ConfigError::Settings(
                "delivery_timeout_secs must be greater than 0".to_string(),
            ));
        }
        self.metrics_socket()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_secs > 0).then(|| Duration::from_secs(self.reload_interval_secs))
    }

    pub fn metrics_socket(&self) -> Result<Option<SocketAddr>, ConfigError> {
        match self.metrics_addr.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(addr) => addr.parse().map(Some).map_err(|e| {
                ConfigError::Settings(format!("invalid metrics_addr `{}`: {}", addr, e))
            }),
        }
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }

    pub fn dispatch_policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            timeout: Duration::from_secs(self.delivery_timeout_secs),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn channel_defaults(&self) -> ChannelDefaults {
        ChannelDefaults {
            resend_api_key: self.resend_api_key.clone(),
            resend_from_email: self.resend_from_email.clone(),
            resend_api_url: self.resend_api_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load(Some("/nonexistent/bullet.toml")).unwrap();
        assert_eq!(settings.port, 5032);
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.routes_config, "routes.yaml");
        assert_eq!(settings.dispatch_mode, DispatchMode::Background);
        assert_eq!(settings.log_format, LogFormat::Text);
        assert_eq!(settings.reload_interval(), Some(Duration::from_secs(5)));
        assert_eq!(settings.resend_api_url, DEFAULT_RESEND_API_URL);
        assert_eq!(settings.shutdown_drain(), Duration::from_secs(30));
        assert!(settings.metrics_socket().unwrap().is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bullet.toml");
        std::fs::write(
            &path,
            r#"
port = 9000
log_format = "json"
dispatch_mode = "wait"
reload_interval_secs = 0
max_retries = 2
retry_backoff_ms = 50
metrics_addr = "127.0.0.1:9100"
resend_from_email = "alerts@example.com"
"#,
        )
        .unwrap();

        let settings = Settings::load(path.to_str()).unwrap();
        assert_eq!(settings.bind_addr(), "0.0.0.0:9000");
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.dispatch_mode, DispatchMode::Wait);
        assert!(settings.reload_interval().is_none());

        let policy = settings.dispatch_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.retry_backoff, Duration::from_millis(50));
        assert_eq!(policy.timeout, Duration::from_secs(30));

        assert_eq!(
            settings.metrics_socket().unwrap(),
            Some("127.0.0.1:9100".parse().unwrap())
        );
        assert_eq!(
            settings.channel_defaults().resend_from_email.as_deref(),
            Some("alerts@example.com")
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bullet.toml");

        std::fs::write(&path, "metrics_addr = \"not-an-addr\"\n").unwrap();
        assert!(matches!(
            Settings::load(path.to_str()),
            Err(ConfigError::Settings(_))
        ));

        std::fs::write(&path, "dispatch_mode = \"sometimes\"\n").unwrap();
        assert!(matches!(
            Settings::load(path.to_str()),
            Err(ConfigError::Settings(_))
        ));
    }
}
