use crate::alertmanager::AlertmanagerParser;
use crate::generic::GenericParser;
use crate::grafana::GrafanaParser;
use crate::parser::SourceParser;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// 解析器注册表
///
/// 启动时填充，之后以 `Arc<ParserRegistry>` 只读共享。
/// 未注册的来源回落到通用解析器，新来源只要发送事件形状的 JSON 即可接入。
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn SourceParser>>,
    fallback: Arc<dyn SourceParser>,
}

impl ParserRegistry {
    /// 空注册表（只有通用回落）
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
            fallback: Arc::new(GenericParser::new()),
        }
    }

    /// 内置解析器：grafana、alertmanager、generic
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GrafanaParser::new()));
        registry.register(Arc::new(AlertmanagerParser::new()));
        registry.register(Arc::new(GenericParser::new()));
        registry
    }

    /// 以解析器名称注册，同名覆盖并返回旧实例
    pub fn register(&mut self, parser: Arc<dyn SourceParser>) -> Option<Arc<dyn SourceParser>> {
        let name = parser.name().to_string();
        info!(source = %name, "Registered source parser");
        self.parsers.insert(name, parser)
    }

    /// 仅返回已注册的解析器
    pub fn get(&self, source_id: &str) -> Option<Arc<dyn SourceParser>> {
        self.parsers.get(source_id).cloned()
    }

    /// 已注册则返回对应解析器，否则回落到通用解析器
    pub fn resolve(&self, source_id: &str) -> Arc<dyn SourceParser> {
        self.get(source_id)
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn is_registered(&self, source_id: &str) -> bool {
        self.parsers.contains_key(source_id)
    }

    /// 已注册的来源标识（排序）
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.parsers.keys().cloned().collect();
        sources.sort();
        sources
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bullet_core::{Event, ParseError};
    use serde_json::{json, Value};

    struct KlineParser;

    impl SourceParser for KlineParser {
        fn name(&self) -> &str {
            "kline"
        }

        fn parse(&self, _source_id: &str, _payload: &Value) -> Result<Vec<Event>, ParseError> {
            Ok(vec![Event::builder("kline").event_type("kline").build()])
        }
    }

    #[test]
    fn test_default_sources() {
        let registry = ParserRegistry::with_defaults();
        assert_eq!(
            registry.sources(),
            vec!["alertmanager", "generic", "grafana"]
        );
    }

    #[test]
    fn test_unknown_source_falls_back_to_generic() {
        let registry = ParserRegistry::with_defaults();
        assert!(registry.get("custom").is_none());

        let parser = registry.resolve("custom");
        assert_eq!(parser.name(), "generic");

        let events = parser.parse("custom", &json!({"type": "ping"})).unwrap();
        assert_eq!(events[0].source(), "custom");
    }

    #[test]
    fn test_register_custom_parser() {
        let mut registry = ParserRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.register(Arc::new(KlineParser)).is_none());
        assert!(registry.is_registered("kline"));
        assert_eq!(registry.resolve("kline").name(), "kline");

        // 同名覆盖
        assert!(registry.register(Arc::new(KlineParser)).is_some());
        assert_eq!(registry.len(), 1);
    }
}
