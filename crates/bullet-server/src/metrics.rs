use bullet_notify::DispatchOutcome;
use bullet_route::{ReloadOutcome, RouteReloader};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::task::JoinHandle;

/// 初始化 Prometheus metrics exporter
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_metrics();

    tracing::info!("Metrics exporter started on http://{}/metrics", addr);
    Ok(())
}

fn describe_metrics() {
    // 入站事件
    describe_counter!(
        "bullet_events_received_total",
        "Total number of events parsed from inbound webhooks"
    );
    describe_counter!(
        "bullet_events_unrouted_total",
        "Events that matched no route and were delivered nowhere"
    );
    describe_counter!(
        "bullet_parse_errors_total",
        "Inbound webhooks rejected because the payload could not be parsed"
    );

    // 投递
    describe_counter!(
        "bullet_deliveries_total",
        "Channel deliveries by channel type and outcome"
    );

    // 路由
    describe_counter!(
        "bullet_route_reloads_total",
        "Route table reloads by outcome"
    );
}

pub fn record_events_received(source: &str, count: usize) {
    counter!("bullet_events_received_total", count as u64, "source" => source.to_string());
}

pub fn record_event_unrouted(source: &str) {
    counter!("bullet_events_unrouted_total", 1, "source" => source.to_string());
}

pub fn record_parse_error(source: &str) {
    counter!("bullet_parse_errors_total", 1, "source" => source.to_string());
}

pub fn record_delivery(outcome: &DispatchOutcome) {
    counter!(
        "bullet_deliveries_total",
        1,
        "channel" => outcome.channel_type.as_str().to_string(),
        "status" => outcome.status()
    );
}

pub fn record_route_reload(outcome: &ReloadOutcome) {
    let status = match outcome {
        ReloadOutcome::Loaded { .. } => "success",
        ReloadOutcome::Failed { .. } => "failed",
    };
    counter!("bullet_route_reloads_total", 1, "status" => status);
}

/// 订阅重载结果并计数，重载器被释放后任务结束
pub fn watch_reloads(reloader: &RouteReloader) -> JoinHandle<()> {
    let mut rx = reloader.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let outcome = rx.borrow_and_update().clone();
            record_route_reload(&outcome);
        }
    })
}
