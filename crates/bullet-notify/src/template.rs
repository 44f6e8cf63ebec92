use bullet_core::{Event, TemplateError};
use chrono::Local;
use minijinja::{Environment, UndefinedBehavior};
use serde_json::{json, Value};
use tracing::debug;

/// 钉钉默认 Markdown 模板
pub const DEFAULT_MARKDOWN_TEMPLATE: &str = r#"### {% if is_resolved %}✅{% else %}🚨{% endif %} [{{ source|upper }}] {{ display_title }}

- **类型**: {{ type }}
{% if description %}
- **详情**: {{ description }}
{% endif %}
- **时间**: {{ timestamp_local }}
{% if labels %}
- **标签**: {% for key, value in labels|dictsort %}`{{ key }}={{ value }}`{% if not loop.last %} {% endif %}{% endfor %}

{% endif %}
"#;

/// Slack 默认正文（mrkdwn）
pub const DEFAULT_SLACK_TEMPLATE: &str = r#"{% if description %}{{ description }}
{% endif %}
{% for key, value in labels|dictsort %}
• *{{ key }}*: {{ value }}
{% endfor %}
_{{ timestamp_local }}_"#;

/// 邮件默认主题
pub const DEFAULT_EMAIL_SUBJECT_TEMPLATE: &str =
    "{{ subject_prefix }}[{{ source|upper }}] {% if is_resolved %}[RESOLVED] {% endif %}{{ display_title }}";

/// 邮件默认 HTML 正文
pub const DEFAULT_EMAIL_HTML_TEMPLATE: &str = r#"<html>
<body style="font-family: sans-serif;">
<h2 style="color: {% if is_resolved %}#2e7d32{% else %}#c62828{% endif %};">{{ display_title|e }}</h2>
<p><b>Source:</b> {{ source|e }} &nbsp; <b>Type:</b> {{ type|e }}</p>
{% if description %}
<p>{{ description|e }}</p>
{% endif %}
<p><b>Time:</b> {{ timestamp_local }}</p>
{% if labels %}
<table cellpadding="4" style="border-collapse: collapse;">
{% for key, value in labels|dictsort %}
<tr><td style="border: 1px solid #ddd;"><b>{{ key|e }}</b></td><td style="border: 1px solid #ddd;">{{ value|e }}</td></tr>
{% endfor %}
</table>
{% endif %}
</body>
</html>
"#;

/// minijinja 渲染器
///
/// 严格模式：引用未定义变量即渲染失败。
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        Self { env }
    }

    /// 渲染模板源码，`name` 仅用于错误信息
    pub fn render(
        &self,
        name: &str,
        source: &str,
        context: &Value,
    ) -> Result<String, TemplateError> {
        debug!(template = name, "Rendering template");

        self.env
            .render_str(source, context)
            .map_err(|e| TemplateError::Render {
                template: name.to_string(),
                reason: e.to_string(),
            })
    }

    /// 先编译一次，配置加载时用来提前发现语法错误
    pub fn check(&self, name: &str, source: &str) -> Result<(), TemplateError> {
        Environment::new()
            .template_from_str(source)
            .map(|_| ())
            .map_err(|e| TemplateError::Render {
                template: name.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// 模板上下文
///
/// 顶层变量：`event`（完整事件）、`source`、`type`、`labels`、`title`、
/// `display_title`、`description`、`raw`、`timestamp`（RFC 3339）、
/// `timestamp_local`（服务器本地时间）、`status_text`、`is_resolved`。
pub fn event_context(event: &Event) -> Result<Value, TemplateError> {
    let event_value =
        serde_json::to_value(event).map_err(|e| TemplateError::Context(e.to_string()))?;

    let timestamp = event.timestamp();
    let status_text = match event.event_type() {
        "alert" => "firing",
        other => other,
    };

    Ok(json!({
        "event": event_value,
        "source": event.source(),
        "type": event.event_type(),
        "labels": event.labels(),
        "title": event.title(),
        "display_title": event.display_title(),
        "description": event.description(),
        "raw": event.raw(),
        "timestamp": timestamp.to_rfc3339(),
        "timestamp_local": timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        "status_text": status_text,
        "is_resolved": event.is_resolved(),
    }))
}

/// 在上下文中追加变量（渠道专属，如邮件主题前缀）
pub fn with_var(mut context: Value, key: &str, value: Value) -> Value {
    if let Value::Object(map) = &mut context {
        map.insert(key.to_string(), value);
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event::builder("grafana")
            .event_type("alert")
            .label("project", "backend")
            .label("severity", "critical")
            .title("HighCPU")
            .description("CPU above 80%")
            .build()
    }

    #[test]
    fn test_render_with_event_context() {
        let renderer = TemplateRenderer::new();
        let context = event_context(&sample_event()).unwrap();

        let out = renderer
            .render(
                "inline",
                "{{ source }}/{{ type }}: {{ title }} ({{ labels.project }})",
                &context,
            )
            .unwrap();
        assert_eq!(out, "grafana/alert: HighCPU (backend)");

        let out = renderer
            .render("inline", "{{ event.labels.severity }} {{ status_text }}", &context)
            .unwrap();
        assert_eq!(out, "critical firing");
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let renderer = TemplateRenderer::new();
        let context = event_context(&sample_event()).unwrap();

        let err = renderer
            .render("strict", "{{ no_such_var }}", &context)
            .unwrap_err();
        assert!(matches!(err, TemplateError::Render { ref template, .. } if template == "strict"));
    }

    #[test]
    fn test_syntax_error_detected_by_check() {
        let renderer = TemplateRenderer::new();
        assert!(renderer.check("broken", "{{ title ").is_err());
        assert!(renderer.check("ok", "{{ title }}").is_ok());
    }

    #[test]
    fn test_default_markdown_template() {
        let renderer = TemplateRenderer::new();
        let context = event_context(&sample_event()).unwrap();

        let out = renderer
            .render("markdown", DEFAULT_MARKDOWN_TEMPLATE, &context)
            .unwrap();
        assert!(out.starts_with("### 🚨 [GRAFANA] HighCPU"));
        assert!(out.contains("- **详情**: CPU above 80%"));
        assert!(out.contains("`project=backend`"));
    }

    #[test]
    fn test_default_templates_render_minimal_event() {
        let renderer = TemplateRenderer::new();
        let event = Event::builder("custom").build();
        let context = with_var(event_context(&event).unwrap(), "subject_prefix", json!(""));

        for (name, source) in [
            ("markdown", DEFAULT_MARKDOWN_TEMPLATE),
            ("slack", DEFAULT_SLACK_TEMPLATE),
            ("subject", DEFAULT_EMAIL_SUBJECT_TEMPLATE),
            ("html", DEFAULT_EMAIL_HTML_TEMPLATE),
        ] {
            assert!(renderer.render(name, source, &context).is_ok(), "{name}");
        }

        let subject = renderer
            .render("subject", DEFAULT_EMAIL_SUBJECT_TEMPLATE, &context)
            .unwrap();
        assert_eq!(subject, "[CUSTOM] custom/event");
    }

    #[test]
    fn test_html_template_escapes_values() {
        let renderer = TemplateRenderer::new();
        let event = Event::builder("custom").title("<script>").build();
        let context = event_context(&event).unwrap();

        let html = renderer
            .render("html", DEFAULT_EMAIL_HTML_TEMPLATE, &context)
            .unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
