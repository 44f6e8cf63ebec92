use crate::model::RoutesConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bullet_core::ConfigError;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

#[async_trait]
pub trait RoutesProvider: Send + Sync {
    async fn load(&self) -> Result<RoutesConfig, ConfigError>;

    /// 用于检测路由是否变更的版本号（变化即可）
    async fn version(&self) -> Result<i64>;

    /// 相对 `template_path` 的基准目录
    fn base_dir(&self) -> Option<PathBuf> {
        None
    }

    /// 日志用的描述
    fn describe(&self) -> String;
}

pub struct FileRoutesProvider {
    path: PathBuf,
}

impl FileRoutesProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RoutesProvider for FileRoutesProvider {
    async fn load(&self) -> Result<RoutesConfig, ConfigError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConfigError::Io {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        RoutesConfig::from_yaml(&content)
    }

    async fn version(&self) -> Result<i64> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| anyhow!("Failed to read routes metadata {}: {}", self.path.display(), e))?;
        let modified = meta
            .modified()
            .map_err(|e| anyhow!("Failed to read routes mtime {}: {}", self.path.display(), e))?;
        // 同一毫秒内的两次写入靠文件长度区分
        let ms = modified
            .duration_since(UNIX_EPOCH)
            .map_err(|e| anyhow!("Invalid mtime for {}: {}", self.path.display(), e))?
            .as_millis();
        Ok((ms as i64).wrapping_mul(31).wrapping_add(meta.len() as i64))
    }

    fn base_dir(&self) -> Option<PathBuf> {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
