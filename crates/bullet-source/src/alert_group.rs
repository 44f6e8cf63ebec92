//! Alertmanager 兼容的分组负载（Grafana 统一告警与 Prometheus Alertmanager 共用）

use crate::parser::{kind_of, parse_timestamp, str_field, string_map};
use bullet_core::{Event, ParseError};
use serde_json::{json, Map, Value};

/// 每条告警生成一个事件；`alerts` 缺失视为空批次
pub(crate) fn parse_alert_group(source: &str, payload: &Value) -> Result<Vec<Event>, ParseError> {
    let obj = payload.as_object().ok_or_else(|| {
        ParseError::malformed(
            source,
            format!("expected a JSON object, got {}", kind_of(payload)),
        )
    })?;

    let alerts = match obj.get("alerts") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(alerts)) => alerts,
        Some(other) => {
            return Err(ParseError::malformed(
                source,
                format!("`alerts` must be an array, got {}", kind_of(other)),
            ))
        }
    };

    let group_status = str_field(obj, "status");
    let group_title = str_field(obj, "title");
    let group_message = str_field(obj, "message");
    let common_labels = string_map(source, obj.get("commonLabels"), "commonLabels")?;

    let group: Map<String, Value> = obj
        .iter()
        .filter(|(k, _)| k.as_str() != "alerts")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let group = Value::Object(group);

    let mut events = Vec::with_capacity(alerts.len());
    for (i, alert) in alerts.iter().enumerate() {
        let alert_obj = alert.as_object().ok_or_else(|| {
            ParseError::malformed(
                source,
                format!("`alerts[{i}]` must be an object, got {}", kind_of(alert)),
            )
        })?;

        let mut labels = common_labels.clone();
        labels.extend(string_map(
            source,
            alert_obj.get("labels"),
            &format!("alerts[{i}].labels"),
        )?);
        let annotations = string_map(
            source,
            alert_obj.get("annotations"),
            &format!("alerts[{i}].annotations"),
        )?;

        let status = str_field(alert_obj, "status")
            .or(group_status)
            .unwrap_or("firing");

        let title = annotations
            .get("summary")
            .cloned()
            .or_else(|| labels.get("alertname").cloned())
            .or_else(|| group_title.map(str::to_string));

        let description = annotations
            .get("description")
            .cloned()
            .or_else(|| group_message.map(str::to_string));

        let event = Event::builder(source)
            .event_type(event_type_for(status))
            .labels(labels)
            .title_opt(title)
            .description_opt(description)
            .timestamp_opt(parse_timestamp(alert_obj.get("startsAt")))
            .raw(json!({ "alert": alert, "group": group }))
            .build();

        events.push(event);
    }

    Ok(events)
}

pub(crate) fn event_type_for(status: &str) -> &str {
    match status {
        "firing" => "alert",
        "resolved" => "resolved",
        other => other,
    }
}
