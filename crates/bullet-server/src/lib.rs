pub mod config;
pub mod logging;
pub mod metrics;
pub mod pipeline;

use bullet_notify::Dispatcher;
use bullet_route::{RouteReloader, Router};
use bullet_source::{GrafanaParser, ParserRegistry, SourceParser};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

pub use self::config::{DispatchMode, LogFormat, Settings};

// 定义 AppState（供 main.rs 和测试使用）
pub struct AppState {
    pub registry: Arc<ParserRegistry>,
    /// `/webhook/grafana` 专用，不依赖注册表内容
    pub grafana: Arc<dyn SourceParser>,
    pub router: Arc<Router>,
    pub dispatcher: Dispatcher,
    pub reloader: Option<Arc<RouteReloader>>,
    pub dispatch_mode: DispatchMode,
    /// 后台投递任务
    pub tasks: TaskTracker,
}

impl AppState {
    pub fn new(
        registry: ParserRegistry,
        router: Arc<Router>,
        dispatcher: Dispatcher,
        dispatch_mode: DispatchMode,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            grafana: Arc::new(GrafanaParser::new()),
            router,
            dispatcher,
            reloader: None,
            dispatch_mode,
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_reloader(mut self, reloader: Arc<RouteReloader>) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// 停止接收新的后台投递，并在 `timeout` 内等待已有投递结束
    ///
    /// 全部结束返回 true；超时返回 false，剩余任务随运行时一起取消。
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let pending = self.tasks.len();
        if pending > 0 {
            info!(pending, "Waiting for in-flight deliveries");
        }

        match tokio::time::timeout(timeout, self.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    remaining = self.tasks.len(),
                    "Delivery drain timed out after {:?}", timeout
                );
                false
            }
        }
    }
}

pub mod api {
    use crate::pipeline::{handle_webhook, Disposition};
    use crate::{AppState, DispatchMode};
    use axum::{
        body::Bytes,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use bullet_source::SourceParser;
    use serde_json::json;
    use std::sync::Arc;
    use tracing::{info_span, warn, Instrument};
    use uuid::Uuid;

    pub fn create_router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/sources", get(list_sources))
            .route("/routes", get(list_routes))
            .route("/routes/reload", post(reload_routes))
            .route("/webhook/grafana", post(grafana_webhook))
            .route("/webhook/:source", post(source_webhook))
            .with_state(state)
    }

    async fn health_check() -> impl IntoResponse {
        Json(json!({ "status": "healthy" }))
    }

    async fn list_sources(State(state): State<Arc<AppState>>) -> impl IntoResponse {
        Json(json!({ "sources": state.registry.sources() }))
    }

    async fn list_routes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
        Json(json!({ "routes": state.router.snapshot().describe() }))
    }

    async fn reload_routes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
        let Some(reloader) = &state.reloader else {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "status": "error", "error": "routes reload is not configured" })),
            );
        };

        match reloader.reload_now().await {
            Ok(routes) => (
                StatusCode::OK,
                Json(json!({ "status": "reloaded", "routes": routes })),
            ),
            Err(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "status": "error", "error": e.to_string() })),
            ),
        }
    }

    async fn grafana_webhook(
        State(state): State<Arc<AppState>>,
        body: Bytes,
    ) -> impl IntoResponse {
        let parser = Arc::clone(&state.grafana);
        process(state, parser, "grafana".to_string(), body).await
    }

    async fn source_webhook(
        State(state): State<Arc<AppState>>,
        Path(source): Path<String>,
        body: Bytes,
    ) -> impl IntoResponse {
        let parser = state.registry.resolve(&source);
        process(state, parser, source, body).await
    }

    async fn process(
        state: Arc<AppState>,
        parser: Arc<dyn SourceParser>,
        source: String,
        body: Bytes,
    ) -> (StatusCode, Json<serde_json::Value>) {
        let span = info_span!("webhook", request_id = %Uuid::new_v4(), source = %source);

        async move {
            let result = handle_webhook(
                parser.as_ref(),
                &state.router,
                &state.dispatcher,
                &state.tasks,
                state.dispatch_mode,
                &source,
                &body,
            )
            .await;

            match result {
                Ok(report) => {
                    let status = match (report.disposition(), state.dispatch_mode) {
                        (Disposition::Accepted, DispatchMode::Background) => StatusCode::ACCEPTED,
                        _ => StatusCode::OK,
                    };
                    match serde_json::to_value(&report) {
                        Ok(body) => (status, Json(body)),
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize webhook report");
                            (status, Json(json!({ "status": report.status })))
                        }
                    }
                }
                Err(e) => (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "status": "error", "error": e.to_string() })),
                ),
            }
        }
        .instrument(span)
        .await
    }
}
