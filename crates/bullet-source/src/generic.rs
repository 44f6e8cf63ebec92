use crate::parser::{kind_of, opt_string, parse_timestamp, string_map, SourceParser};
use bullet_core::{Event, ParseError};
use serde_json::{Map, Value};

pub const GENERIC_SOURCE: &str = "generic";

/// 通用解析器
///
/// 没有专用实现的来源都回落到这里：直接接受事件形状的 JSON
/// （`source`、`type`、`labels`、`title`、`description`、`timestamp`），
/// 也接受这类对象组成的数组。负载中的 `source` 优先于 URL 中的来源标识。
#[derive(Debug, Default, Clone)]
pub struct GenericParser;

impl GenericParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_one(
        &self,
        source_id: &str,
        obj: &Map<String, Value>,
        item: &Value,
    ) -> Result<Event, ParseError> {
        let source = opt_string(source_id, obj, "source")?
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| source_id.to_string());

        let mut builder = Event::builder(source)
            .labels(string_map(source_id, obj.get("labels"), "labels")?)
            .title_opt(opt_string(source_id, obj, "title")?)
            .description_opt(opt_string(source_id, obj, "description")?)
            .timestamp_opt(parse_timestamp(obj.get("timestamp")))
            .raw(item.clone());

        if let Some(event_type) = opt_string(source_id, obj, "type")? {
            builder = builder.event_type(event_type);
        }

        Ok(builder.build())
    }
}

impl SourceParser for GenericParser {
    fn name(&self) -> &str {
        GENERIC_SOURCE
    }

    fn parse(&self, source_id: &str, payload: &Value) -> Result<Vec<Event>, ParseError> {
        match payload {
            Value::Object(obj) => Ok(vec![self.parse_one(source_id, obj, payload)?]),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let obj = item.as_object().ok_or_else(|| {
                        ParseError::malformed(
                            source_id,
                            format!("item {i} must be an object, got {}", kind_of(item)),
                        )
                    })?;
                    self.parse_one(source_id, obj, item)
                })
                .collect(),
            other => Err(ParseError::malformed(
                source_id,
                format!(
                    "expected an event object or an array of events, got {}",
                    kind_of(other)
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bullet_core::DEFAULT_EVENT_TYPE;
    use serde_json::json;

    #[test]
    fn test_parse_event_shaped_object() {
        let payload = json!({
            "type": "deploy",
            "labels": {"project": "backend", "env": "prod"},
            "title": "v1.2.3 released",
            "description": "rolled out to 12 pods",
            "commit": "abc123"
        });

        let events = GenericParser::new().parse("ci", &payload).unwrap();
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.source(), "ci");
        assert_eq!(event.event_type(), "deploy");
        assert_eq!(event.label("env"), Some("prod"));
        assert_eq!(event.title(), Some("v1.2.3 released"));
        assert_eq!(event.raw()["commit"], "abc123");
    }

    #[test]
    fn test_body_source_wins_over_path() {
        let payload = json!({"source": "kline", "labels": {}});
        let events = GenericParser::new().parse("custom", &payload).unwrap();
        assert_eq!(events[0].source(), "kline");

        let payload = json!({"source": "", "labels": {}});
        let events = GenericParser::new().parse("custom", &payload).unwrap();
        assert_eq!(events[0].source(), "custom");
    }

    #[test]
    fn test_missing_type_defaults() {
        let events = GenericParser::new().parse("custom", &json!({})).unwrap();
        assert_eq!(events[0].event_type(), DEFAULT_EVENT_TYPE);
        assert!(events[0].labels().is_empty());
    }

    #[test]
    fn test_parse_array() {
        let payload = json!([
            {"type": "a", "labels": {"n": 1}},
            {"type": "b"}
        ]);

        let events = GenericParser::new().parse("batch", &payload).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].label("n"), Some("1"));
        assert_eq!(events[1].event_type(), "b");
    }

    #[test]
    fn test_minimal_validation() {
        let parser = GenericParser::new();

        assert!(parser.parse("custom", &json!("text")).is_err());
        assert!(parser.parse("custom", &json!({"labels": "x"})).is_err());
        assert!(parser.parse("custom", &json!({"title": 12})).is_err());
        assert!(parser.parse("custom", &json!([{"type": "a"}, 3])).is_err());
    }

    #[test]
    fn test_round_trip_of_serialized_event() {
        let original = Event::builder("kline")
            .event_type("custom")
            .label("symbol", "BTCUSDT")
            .label("interval", "1h")
            .title("breakout")
            .build();

        let minimal = serde_json::to_value(&original).unwrap();
        let parsed = GenericParser::new().parse("ignored", &minimal).unwrap();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].source(), original.source());
        assert_eq!(parsed[0].event_type(), original.event_type());
        assert_eq!(parsed[0].labels(), original.labels());
        assert_eq!(parsed[0].title(), original.title());
        assert_eq!(parsed[0].timestamp(), original.timestamp());
    }
}
