use bullet_core::{Event, ParseError};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 来源解析器
///
/// 把某个来源的原始 webhook 负载转换成零个或多个 [`Event`]。
/// 一次调用可能是一批告警（Alertmanager 分组），因此返回序列。
/// 缺失的可选字段用默认值补齐，只有形状不符时才返回 [`ParseError`]。
pub trait SourceParser: Send + Sync {
    /// 来源标识（注册表的键）
    fn name(&self) -> &str;

    fn parse(&self, source_id: &str, payload: &Value) -> Result<Vec<Event>, ParseError>;
}

/// 把请求体解码为 JSON；非 JSON 直接视为客户端错误
pub fn decode_body(body: &[u8]) -> Result<Value, ParseError> {
    serde_json::from_slice(body).map_err(|e| ParseError::InvalidJson(e.to_string()))
}

pub(crate) fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// 可选字符串字段：缺失或 null 返回 None，类型不对视为负载错误
pub(crate) fn opt_string(
    source_id: &str,
    obj: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, ParseError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ParseError::malformed(
            source_id,
            format!("`{key}` must be a string, got {}", kind_of(other)),
        )),
    }
}

/// 标签映射：标量值转为字符串，null 跳过，嵌套结构视为负载错误
pub(crate) fn string_map(
    source_id: &str,
    value: Option<&Value>,
    field: &str,
) -> Result<BTreeMap<String, String>, ParseError> {
    let obj = match value {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(obj)) => obj,
        Some(other) => {
            return Err(ParseError::malformed(
                source_id,
                format!("`{field}` must be an object, got {}", kind_of(other)),
            ))
        }
    };

    let mut out = BTreeMap::new();
    for (key, value) in obj {
        let value = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(ParseError::malformed(
                    source_id,
                    format!("`{field}.{key}` must be a scalar value"),
                ))
            }
        };
        out.insert(key.clone(), value);
    }
    Ok(out)
}

/// RFC 3339 字符串或 Unix 秒；无法识别时返回 None（由构建器回落到接收时间）
pub(crate) fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_body_rejects_invalid_json() {
        let err = decode_body(b"{not json").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn test_string_map_stringifies_scalars() {
        let value = json!({"a": "x", "b": 2, "c": true, "d": null});
        let map = string_map("test", Some(&value), "labels").unwrap();

        assert_eq!(map.get("a").unwrap(), "x");
        assert_eq!(map.get("b").unwrap(), "2");
        assert_eq!(map.get("c").unwrap(), "true");
        assert!(!map.contains_key("d"));
    }

    #[test]
    fn test_string_map_rejects_nested() {
        let value = json!({"a": {"nested": 1}});
        assert!(string_map("test", Some(&value), "labels").is_err());

        let value = json!(["a"]);
        assert!(string_map("test", Some(&value), "labels").is_err());
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp(Some(&json!("2024-05-01T10:00:00Z"))).unwrap();
        assert_eq!(ts.timestamp(), 1_714_557_600);

        let ts = parse_timestamp(Some(&json!(1_714_557_600))).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T10:00:00+00:00");

        assert!(parse_timestamp(Some(&json!("yesterday"))).is_none());
        assert!(parse_timestamp(None).is_none());
    }
}
