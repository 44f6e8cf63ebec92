use bullet_core::{ConfigError, Event};
use bullet_notify::ChannelDefaults;
use bullet_route::{
    load_table, FileRoutesProvider, ReloadOutcome, RouteReloader, Router, RoutesProvider,
};
use std::sync::Arc;
use std::time::Duration;

fn routes_yaml(names: &[&str]) -> String {
    let mut yaml = String::from("routes:\n");
    for name in names {
        yaml.push_str(&format!(
            "  - name: {name}\n    match: {{}}\n    channels:\n      - type: webhook\n        url: http://localhost/{name}\n"
        ));
    }
    yaml
}

async fn wait_for(
    rx: &mut tokio::sync::watch::Receiver<ReloadOutcome>,
    accept: impl Fn(&ReloadOutcome) -> bool,
    timeout: Duration,
) -> anyhow::Result<()> {
    let fut = async {
        loop {
            if accept(&rx.borrow()) {
                return Ok(());
            }
            rx.changed()
                .await
                .map_err(|e| anyhow::anyhow!("watch channel closed: {}", e))?;
        }
    };

    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| anyhow::anyhow!("timeout waiting for routes reload"))?
}

async fn setup(
    path: &std::path::Path,
) -> anyhow::Result<(Arc<Router>, Arc<RouteReloader>)> {
    let provider: Arc<dyn RoutesProvider> = Arc::new(FileRoutesProvider::new(path));
    let defaults = ChannelDefaults::default();

    let table = load_table(provider.as_ref(), &defaults).await?;
    let version = provider.version().await?;
    let router = Arc::new(Router::new(table));

    let reloader = Arc::new(RouteReloader::new(
        provider,
        Arc::clone(&router),
        defaults,
        version,
    ));
    Ok((router, reloader))
}

#[tokio::test]
async fn test_file_routes_hot_reload() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("routes.yaml");
    std::fs::write(&path, routes_yaml(&["first"]))?;

    let (router, reloader) = setup(&path).await?;
    assert_eq!(router.snapshot().len(), 1);

    let mut rx = reloader.subscribe();
    reloader.clone().start_polling(Duration::from_millis(50));

    // 修改文件，触发 reload
    tokio::time::sleep(Duration::from_millis(60)).await;
    std::fs::write(&path, routes_yaml(&["first", "second"]))?;

    wait_for(
        &mut rx,
        |o| matches!(o, ReloadOutcome::Loaded { routes: 2, .. }),
        Duration::from_secs(2),
    )
    .await?;

    let targets = router.resolve(&Event::builder("grafana").build());
    let rules: Vec<&str> = targets.iter().map(|t| t.rule.as_str()).collect();
    assert_eq!(rules, vec!["first", "second"]);
    Ok(())
}

#[tokio::test]
async fn test_invalid_reload_keeps_previous_table() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("routes.yaml");
    std::fs::write(&path, routes_yaml(&["stable"]))?;

    let (router, reloader) = setup(&path).await?;
    let mut rx = reloader.subscribe();
    reloader.clone().start_polling(Duration::from_millis(50));

    tokio::time::sleep(Duration::from_millis(60)).await;
    std::fs::write(
        &path,
        "routes:\n  - name: broken\n    channels:\n      - type: slack\n        webhook_url: nope\n",
    )?;

    wait_for(
        &mut rx,
        |o| matches!(o, ReloadOutcome::Failed { error: ConfigError::InvalidRoute { .. }, .. }),
        Duration::from_secs(2),
    )
    .await?;

    let snapshot = router.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.routes()[0].name(), "stable");
    Ok(())
}

#[tokio::test]
async fn test_reload_now() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("routes.yaml");
    std::fs::write(&path, routes_yaml(&["a"]))?;

    let (router, reloader) = setup(&path).await?;

    std::fs::write(&path, routes_yaml(&["a", "b", "c"]))?;
    assert_eq!(reloader.reload_now().await?, 3);
    assert_eq!(router.snapshot().len(), 3);

    std::fs::write(&path, "routes: [")?;
    assert!(matches!(
        reloader.reload_now().await,
        Err(ConfigError::Document(_))
    ));
    assert_eq!(router.snapshot().len(), 3);
    Ok(())
}
