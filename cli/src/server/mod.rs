use anyhow::Context;
use camfinder::session::TcpConnector;
use camfinder::store::JsonStore;
use camfinder::Config;
use camfinder::Service;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub async fn serve(
    listen: SocketAddr,
    store: PathBuf,
    namespace: String,
    step_timeout_ms: u64,
) -> anyhow::Result<()> {
    let config = Config {
        namespace,
        step_timeout: Duration::from_millis(step_timeout_ms),
        ..Default::default()
    };
    log::info!("Loading the registry from {}", store.display());
    let store = JsonStore::open(&store)
        .await
        .with_context(|| format!("Failed to load the registry at {}", store.display()))?;
    let service = Arc::new(Service::new(
        config,
        Arc::new(TcpConnector),
        Arc::new(store),
    ));
    service.start().await?;

    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to listen on {}", listen))?;
    tokio::select! {
        result = camfinder::serve(listener, service.clone()) => result?,
        result = tokio::signal::ctrl_c() => {
            result?;
            log::info!("Shutting down");
        }
    }
    service.shutdown().await;
    Ok(())
}
