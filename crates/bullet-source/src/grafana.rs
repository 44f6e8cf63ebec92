use crate::alert_group::parse_alert_group;
use crate::parser::{kind_of, opt_string, str_field, string_map, SourceParser};
use bullet_core::{Event, ParseError};
use serde_json::{Map, Value};

pub const GRAFANA_SOURCE: &str = "grafana";

/// Grafana webhook 解析器
///
/// 统一告警（`alerts` 数组，Alertmanager 兼容）之外，
/// 还兼容旧版面板告警（`ruleName` + `state`，无 `alerts`）。
#[derive(Debug, Default, Clone)]
pub struct GrafanaParser;

impl GrafanaParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_legacy(&self, obj: &Map<String, Value>, payload: &Value) -> Result<Event, ParseError> {
        let rule_name = opt_string(GRAFANA_SOURCE, obj, "ruleName")?;
        let state = str_field(obj, "state").unwrap_or("alerting");

        let event_type = match state {
            "alerting" => "alert",
            "ok" => "resolved",
            other => other,
        };

        let mut labels = string_map(GRAFANA_SOURCE, obj.get("tags"), "tags")?;
        if let Some(name) = &rule_name {
            labels
                .entry("alertname".to_string())
                .or_insert_with(|| name.clone());
        }

        let title = opt_string(GRAFANA_SOURCE, obj, "title")?.or(rule_name);

        Ok(Event::builder(GRAFANA_SOURCE)
            .event_type(event_type)
            .labels(labels)
            .title_opt(title)
            .description_opt(opt_string(GRAFANA_SOURCE, obj, "message")?)
            .raw(payload.clone())
            .build())
    }
}

impl SourceParser for GrafanaParser {
    fn name(&self) -> &str {
        GRAFANA_SOURCE
    }

    fn parse(&self, _source_id: &str, payload: &Value) -> Result<Vec<Event>, ParseError> {
        let obj = payload.as_object().ok_or_else(|| {
            ParseError::malformed(
                GRAFANA_SOURCE,
                format!("expected a JSON object, got {}", kind_of(payload)),
            )
        })?;

        if !obj.contains_key("alerts") && obj.contains_key("ruleName") {
            return Ok(vec![self.parse_legacy(obj, payload)?]);
        }

        parse_alert_group(GRAFANA_SOURCE, payload)
    }
}
