use anyhow::Context;
use bullet_notify::Dispatcher;
use bullet_route::{load_table, FileRoutesProvider, RouteReloader, Router, RoutesProvider};
use bullet_server::{api, logging, metrics, AppState, Settings};
use bullet_source::ParserRegistry;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "bullet.toml")]
    config: String,

    /// Routes file path, overrides `routes_config`
    #[arg(short, long)]
    routes: Option<String>,

    /// Listen port, overrides `port`
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(Some(args.config.as_str()))
        .with_context(|| format!("Failed to load settings from {}", args.config))?;
    if let Some(routes) = args.routes {
        settings.routes_config = routes;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }

    logging::init_logging(&settings.log_level, settings.log_format)?;
    info!("Starting Bullet with config: {}", args.config);

    if let Some(addr) = settings.metrics_socket()? {
        metrics::init_metrics(addr)?;
    }

    // 路由表加载失败直接退出
    let provider: Arc<dyn RoutesProvider> =
        Arc::new(FileRoutesProvider::new(&settings.routes_config));
    let defaults = settings.channel_defaults();
    let table = load_table(provider.as_ref(), &defaults)
        .await
        .with_context(|| format!("Failed to load routes from {}", settings.routes_config))?;
    let version = provider.version().await.unwrap_or_default();
    info!(
        routes = table.len(),
        path = %settings.routes_config,
        "Routes loaded"
    );

    let router = Arc::new(Router::new(table));
    let reloader = Arc::new(RouteReloader::new(
        provider,
        Arc::clone(&router),
        defaults,
        version,
    ));
    metrics::watch_reloads(&reloader);

    if let Some(interval) = settings.reload_interval() {
        Arc::clone(&reloader).start_polling(interval);
        info!("Routes polling every {:?}", interval);
    }
    spawn_reload_on_hangup(Arc::clone(&reloader));

    let registry = ParserRegistry::with_defaults();
    info!(sources = ?registry.sources(), "Parsers registered");

    let state = AppState::new(
        registry,
        router,
        Dispatcher::new(settings.dispatch_policy()),
        settings.dispatch_mode,
    )
    .with_reloader(reloader);
    let state = Arc::new(state);
    let app = api::create_router(Arc::clone(&state));

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {} (dispatch mode: {:?})", addr, settings.dispatch_mode);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 等待后台投递完成，结果照常记录
    if state.drain(settings.shutdown_drain()).await {
        info!("In-flight deliveries drained");
    }

    info!("Bullet stopped");
    Ok(())
}

/// SIGHUP 立即重载路由
#[cfg(unix)]
fn spawn_reload_on_hangup(reloader: Arc<RouteReloader>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to install SIGHUP handler: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reloading routes");
            // 失败由重载器记录日志，旧表继续服务
            let _ = reloader.reload_now().await;
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_reloader: Arc<RouteReloader>) {}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to install shutdown handlers: {}, falling back to Ctrl+C", e);
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C");
}
