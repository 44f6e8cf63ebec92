use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// 解析器无法确定类型时使用的默认事件类型
pub const DEFAULT_EVENT_TYPE: &str = "event";

/// 规范化事件
///
/// 所有解析器的产出、所有渠道的输入。构造后不可变：字段私有，
/// 只能通过 [`EventBuilder`] 创建，下游只读。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    source: String,

    #[serde(rename = "type")]
    event_type: String,

    labels: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    raw: Value,

    timestamp: DateTime<Utc>,
}

impl Event {
    pub fn builder(source: impl Into<String>) -> EventBuilder {
        EventBuilder::new(source)
    }

    /// 事件来源（grafana / alertmanager / 自定义）
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 事件类型（alert / resolved / custom ...）
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// 路由标签
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// 原始负载，供需要供应商特定字段的模板使用
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 是否为恢复类事件
    pub fn is_resolved(&self) -> bool {
        self.event_type == "resolved"
    }

    /// 展示用标题：title，否则 alertname 标签，否则 `source/type`
    pub fn display_title(&self) -> String {
        if let Some(title) = self.title() {
            return title.to_string();
        }
        if let Some(name) = self.label("alertname") {
            return name.to_string();
        }
        format!("{}/{}", self.source, self.event_type)
    }
}

/// 事件构建器
#[derive(Debug, Clone)]
pub struct EventBuilder {
    source: String,
    event_type: Option<String>,
    labels: BTreeMap<String, String>,
    title: Option<String>,
    description: Option<String>,
    raw: Value,
    timestamp: Option<DateTime<Utc>>,
}

impl EventBuilder {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            event_type: None,
            labels: BTreeMap::new(),
            title: None,
            description: None,
            raw: Value::Null,
            timestamp: None,
        }
    }

    /// 空字符串视为未设置，最终回落到 [`DEFAULT_EVENT_TYPE`]
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = non_empty(event_type.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = non_empty(title.into());
        self
    }

    pub fn title_opt(mut self, title: Option<String>) -> Self {
        self.title = title.and_then(non_empty);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = non_empty(description.into());
        self
    }

    pub fn description_opt(mut self, description: Option<String>) -> Self {
        self.description = description.and_then(non_empty);
        self
    }

    pub fn raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn timestamp_opt(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn build(self) -> Event {
        Event {
            source: self.source,
            event_type: self
                .event_type
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            labels: self.labels,
            title: self.title,
            description: self.description,
            raw: self.raw,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
