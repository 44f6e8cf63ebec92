use bullet_core::{ConfigError, Event};
use bullet_notify::ChannelConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// 路由文件（YAML）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutesConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub routes: Vec<RouteRule>,
}

impl RoutesConfig {
    /// 空文档视为零条路由
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| ConfigError::Document(e.to_string()))
    }
}

/// 路由规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
    #[serde(default)]
    pub name: String,

    #[serde(default, rename = "match", deserialize_with = "null_as_default")]
    pub matcher: RouteMatch,

    #[serde(default, deserialize_with = "null_as_default")]
    pub channels: Vec<ChannelConfig>,
}

/// 匹配条件
///
/// `source` 缺省（或为空）时不限来源；`labels` 是子集匹配：
/// 每个条目都必须在事件标签中存在且值相等。空条件匹配一切。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(
        default,
        deserialize_with = "scalar_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub labels: BTreeMap<String, String>,
}

impl RouteMatch {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(source) = self.source.as_deref().filter(|s| !s.is_empty()) {
            if source != event.source() {
                return false;
            }
        }

        self.labels
            .iter()
            .all(|(key, expected)| event.label(key) == Some(expected.as_str()))
    }

    pub fn is_catch_all(&self) -> bool {
        self.source.as_deref().map_or(true, str::is_empty) && self.labels.is_empty()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// YAML 里 `code: 500`、`enabled: true` 这类标签值统一转成字符串
fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Scalar>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Scalar::Bool(b) => b.to_string(),
                Scalar::Int(i) => i.to_string(),
                Scalar::Float(f) => f.to_string(),
                Scalar::Str(s) => s,
            };
            (key, value)
        })
        .collect())
}
