use crate::provider::RoutesProvider;
use crate::router::Router;
use crate::table::RouteTable;
use bullet_core::ConfigError;
use bullet_notify::{ChannelDefaults, ChannelFactory};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 最近一次加载的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ReloadOutcome {
    Loaded { routes: usize, version: i64 },
    Failed { error: ConfigError, version: i64 },
}

/// 按提供者的配置构建路由表
pub async fn load_table(
    provider: &dyn RoutesProvider,
    defaults: &ChannelDefaults,
) -> Result<RouteTable, ConfigError> {
    let config = provider.load().await?;
    let mut factory = ChannelFactory::new(defaults.clone());
    if let Some(base_dir) = provider.base_dir() {
        factory = factory.with_base_dir(base_dir);
    }
    RouteTable::build(&config, &factory)
}

/// 路由热重载
///
/// 轮询提供者的版本号，变化后重建路由表并原子替换；
/// 新配置非法时保留旧表继续服务，直到文件再次变化。
pub struct RouteReloader {
    provider: Arc<dyn RoutesProvider>,
    router: Arc<Router>,
    defaults: ChannelDefaults,
    version: Mutex<i64>,
    tx: watch::Sender<ReloadOutcome>,
}

impl RouteReloader {
    pub fn new(
        provider: Arc<dyn RoutesProvider>,
        router: Arc<Router>,
        defaults: ChannelDefaults,
        version: i64,
    ) -> Self {
        let routes = router.snapshot().len();
        let (tx, _rx) = watch::channel(ReloadOutcome::Loaded { routes, version });
        Self {
            provider,
            router,
            defaults,
            version: Mutex::new(version),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ReloadOutcome> {
        self.tx.subscribe()
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// 立即重载（SIGHUP、管理接口），不比较版本号
    pub async fn reload_now(&self) -> Result<usize, ConfigError> {
        let mut version = self.version.lock().await;
        let new_version = match self.provider.version().await {
            Ok(v) => v,
            Err(e) => {
                warn!("Routes version check failed: {}", e);
                *version
            }
        };
        self.apply(&mut version, new_version).await
    }

    pub fn start_polling(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                let new_version = match self.provider.version().await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Routes version check failed: {}", e);
                        continue;
                    }
                };

                let mut version = self.version.lock().await;
                if new_version == *version {
                    continue;
                }

                // 失败已记录日志并广播
                let _ = self.apply(&mut version, new_version).await;
            }
        })
    }

    async fn apply(&self, version: &mut i64, new_version: i64) -> Result<usize, ConfigError> {
        *version = new_version;

        match load_table(self.provider.as_ref(), &self.defaults).await {
            Ok(table) => {
                let routes = table.len();
                self.router.replace(table);
                info!(
                    source = %self.provider.describe(),
                    routes,
                    version = new_version,
                    "Routes reloaded"
                );
                self.tx.send_replace(ReloadOutcome::Loaded {
                    routes,
                    version: new_version,
                });
                Ok(routes)
            }
            Err(error) => {
                warn!(
                    source = %self.provider.describe(),
                    version = new_version,
                    error = %error,
                    "Routes reload failed, keeping previous table"
                );
                self.tx.send_replace(ReloadOutcome::Failed {
                    error: error.clone(),
                    version: new_version,
                });
                Err(error)
            }
        }
    }
}
