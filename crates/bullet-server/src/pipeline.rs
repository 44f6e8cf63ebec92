use crate::config::DispatchMode;
use crate::metrics;
use bullet_core::{Event, ParseError};
use bullet_notify::{DispatchOutcome, DispatchTarget, Dispatcher};
use bullet_route::Router;
use bullet_source::{decode_body, SourceParser};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn, Instrument};

/// webhook 处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 至少有一个投递目标
    Accepted,
    /// 没有任何投递目标
    Discarded,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Accepted => "accepted",
            Disposition::Discarded => "discarded",
        }
    }
}

/// 返回给调用方的报告
#[derive(Debug, Serialize)]
pub struct WebhookReport {
    pub status: &'static str,
    pub source: String,
    pub events: usize,
    pub targets: usize,
    /// 仅在 wait 模式下返回
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<DispatchOutcome>>,
}

impl WebhookReport {
    pub fn disposition(&self) -> Disposition {
        if self.targets == 0 {
            Disposition::Discarded
        } else {
            Disposition::Accepted
        }
    }
}

/// 解码 → 解析 → 路由 → 分发
///
/// 只有 [`ParseError`] 会中断处理；渠道错误只出现在结果和日志里。
/// 后台投递登记在 `tasks` 中，关闭时由调用方等待其结束。
pub async fn handle_webhook(
    parser: &dyn SourceParser,
    router: &Router,
    dispatcher: &Dispatcher,
    tasks: &TaskTracker,
    mode: DispatchMode,
    source_id: &str,
    body: &[u8],
) -> Result<WebhookReport, ParseError> {
    let events = decode_body(body)
        .and_then(|payload| parser.parse(source_id, &payload))
        .map_err(|e| {
            metrics::record_parse_error(source_id);
            warn!(
                source = %source_id,
                parser = %parser.name(),
                error = %e,
                "Failed to parse webhook"
            );
            e
        })?;

    let total = events.len();
    metrics::record_events_received(source_id, total);

    let mut batches: Vec<(Arc<Event>, Vec<DispatchTarget>)> = Vec::with_capacity(events.len());
    for event in events {
        let targets = router.resolve(&event);
        if targets.is_empty() {
            metrics::record_event_unrouted(event.source());
            continue;
        }
        batches.push((Arc::new(event), targets));
    }

    let mut report = WebhookReport {
        status: Disposition::Discarded.as_str(),
        source: source_id.to_string(),
        events: total,
        targets: batches.iter().map(|(_, targets)| targets.len()).sum(),
        results: None,
    };
    report.status = report.disposition().as_str();

    if batches.is_empty() {
        return Ok(report);
    }

    info!(
        source = %source_id,
        events = report.events,
        targets = report.targets,
        "Dispatching events"
    );

    match mode {
        DispatchMode::Background => {
            let dispatcher = dispatcher.clone();
            tasks.spawn(
                async move {
                    dispatch_all(&dispatcher, batches).await;
                }
                .in_current_span(),
            );
        }
        DispatchMode::Wait => {
            report.results = Some(dispatch_all(dispatcher, batches).await);
        }
    }

    Ok(report)
}

/// 各事件并发分发，结果按事件顺序拼接
async fn dispatch_all(
    dispatcher: &Dispatcher,
    batches: Vec<(Arc<Event>, Vec<DispatchTarget>)>,
) -> Vec<DispatchOutcome> {
    let handles: Vec<_> = batches
        .into_iter()
        .map(|(event, targets)| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch(event, targets).await }.in_current_span())
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(results) => {
                results.iter().for_each(metrics::record_delivery);
                outcomes.extend(results);
            }
            Err(e) => error!(error = %e, "Dispatch task aborted"),
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use bullet_notify::ChannelFactory;
    use bullet_route::{RouteTable, RoutesConfig};
    use bullet_source::{GenericParser, GrafanaParser};

    fn router(yaml: &str) -> Router {
        let config = RoutesConfig::from_yaml(yaml).unwrap();
        Router::new(RouteTable::build(&config, &ChannelFactory::default()).unwrap())
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let result = handle_webhook(
            &GrafanaParser::new(),
            &Router::default(),
            &Dispatcher::default(),
            &TaskTracker::new(),
            DispatchMode::Wait,
            "grafana",
            b"{not json",
        )
        .await;

        assert!(matches!(result, Err(ParseError::InvalidJson(_))));
    }

    #[tokio::test]
    async fn test_unrouted_event_is_discarded() {
        let router = router(
            r#"
routes:
  - name: only-grafana
    match: { source: grafana }
    channels:
      - type: webhook
        url: http://127.0.0.1:1/hook
"#,
        );

        let report = handle_webhook(
            &GenericParser::new(),
            &router,
            &Dispatcher::default(),
            &TaskTracker::new(),
            DispatchMode::Wait,
            "kline",
            br#"{"title": "BTC spike"}"#,
        )
        .await
        .unwrap();

        assert_eq!(report.disposition(), Disposition::Discarded);
        assert_eq!(report.status, "discarded");
        assert_eq!(report.targets, 0);
        assert!(report.results.is_none());
    }

    #[tokio::test]
    async fn test_background_dispatch_is_tracked() {
        let router = router(
            r#"
routes:
  - name: default
    match: {}
    channels:
      - type: webhook
        url: http://127.0.0.1:1/hook
"#,
        );
        let tasks = TaskTracker::new();

        let report = handle_webhook(
            &GenericParser::new(),
            &router,
            &Dispatcher::default(),
            &tasks,
            DispatchMode::Background,
            "kline",
            br#"{"title": "BTC spike"}"#,
        )
        .await
        .unwrap();

        assert_eq!(report.disposition(), Disposition::Accepted);
        assert!(report.results.is_none());
        assert_eq!(tasks.len(), 1);

        tasks.close();
        tokio::time::timeout(std::time::Duration::from_secs(5), tasks.wait())
            .await
            .unwrap();
        assert!(tasks.is_empty());
    }
}
