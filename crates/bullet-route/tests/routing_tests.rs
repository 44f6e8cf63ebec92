use bullet_core::Event;
use bullet_notify::{ChannelFactory, DispatchTarget};
use bullet_route::{RouteTable, Router, RoutesConfig};

const SCENARIO: &str = r#"
routes:
  - name: grafana-backend
    match:
      source: grafana
      labels:
        project: backend
    channels:
      - type: feishu
        name: feishu-a
        webhook_url: https://open.feishu.cn/open-apis/bot/v2/hook/a
  - name: default
    match: {}
    channels:
      - type: feishu
        name: feishu-b
        webhook_url: https://open.feishu.cn/open-apis/bot/v2/hook/b
"#;

fn router(yaml: &str) -> Router {
    let config = RoutesConfig::from_yaml(yaml).unwrap();
    Router::new(RouteTable::build(&config, &ChannelFactory::default()).unwrap())
}

fn channel_names(targets: &[DispatchTarget]) -> Vec<String> {
    targets.iter().map(|t| t.channel.name().to_string()).collect()
}

#[test]
fn test_backend_alert_reaches_project_and_default() {
    let event = Event::builder("grafana")
        .label("project", "backend")
        .label("severity", "warning")
        .build();

    let targets = router(SCENARIO).resolve(&event);
    assert_eq!(channel_names(&targets), vec!["feishu-a", "feishu-b"]);
    assert_eq!(targets[0].rule, "grafana-backend");
    assert_eq!(targets[1].rule, "default");
}

#[test]
fn test_frontend_alert_reaches_default_only() {
    let event = Event::builder("grafana").label("project", "frontend").build();

    let targets = router(SCENARIO).resolve(&event);
    assert_eq!(channel_names(&targets), vec!["feishu-b"]);
}

#[test]
fn test_catch_all_position_does_not_matter() {
    let yaml = r#"
routes:
  - name: default
    match: {}
    channels:
      - type: webhook
        name: everything
        url: http://localhost/all
  - name: critical
    match:
      labels: { severity: critical }
    channels:
      - type: webhook
        name: pager
        url: http://localhost/pager
"#;

    let event = Event::builder("alertmanager")
        .label("severity", "critical")
        .build();
    assert_eq!(
        channel_names(&router(yaml).resolve(&event)),
        vec!["everything", "pager"]
    );
}

#[test]
fn test_duplicate_channels_are_not_deduplicated() {
    let yaml = r#"
routes:
  - name: by-source
    match: { source: grafana }
    channels:
      - type: webhook
        name: same
        url: http://localhost/same
  - name: by-label
    match:
      labels: { team: ops }
    channels:
      - type: webhook
        name: same
        url: http://localhost/same
"#;

    let event = Event::builder("grafana").label("team", "ops").build();
    let targets = router(yaml).resolve(&event);
    assert_eq!(channel_names(&targets), vec!["same", "same"]);
}

#[test]
fn test_only_matching_rules_contribute() {
    let yaml = r#"
routes:
  - name: wrong-source
    match: { source: alertmanager }
    channels:
      - type: webhook
        name: a
        url: http://localhost/a
  - name: missing-label
    match:
      labels: { project: backend, env: prod }
    channels:
      - type: webhook
        name: b
        url: http://localhost/b
  - name: subset
    match:
      source: grafana
      labels: { project: backend }
    channels:
      - type: webhook
        name: c
        url: http://localhost/c
"#;

    let event = Event::builder("grafana")
        .label("project", "backend")
        .label("env", "staging")
        .build();
    assert_eq!(channel_names(&router(yaml).resolve(&event)), vec!["c"]);
}
