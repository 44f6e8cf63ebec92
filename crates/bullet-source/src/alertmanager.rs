use crate::alert_group::parse_alert_group;
use crate::parser::SourceParser;
use bullet_core::{Event, ParseError};
use serde_json::Value;

pub const ALERTMANAGER_SOURCE: &str = "alertmanager";

/// Prometheus Alertmanager webhook（version 4）解析器
#[derive(Debug, Default, Clone)]
pub struct AlertmanagerParser;

impl AlertmanagerParser {
    pub fn new() -> Self {
        Self
    }
}

impl SourceParser for AlertmanagerParser {
    fn name(&self) -> &str {
        ALERTMANAGER_SOURCE
    }

    fn parse(&self, _source_id: &str, payload: &Value) -> Result<Vec<Event>, ParseError> {
        parse_alert_group(ALERTMANAGER_SOURCE, payload)
    }
}
