use camfinder::session::TcpConnector;
use camfinder::store::JsonStore;
use camfinder::Config;
use camfinder::Service;
use camfinder_protocol::DiscoveryOptions;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct ScanOptions {
    /// First address of the range.
    #[arg(long)]
    start: String,

    /// Last address of the range, defaults to `start`.
    #[arg(long)]
    end: Option<String>,

    /// Comma-separated port list.
    #[arg(long)]
    ports: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    pass: Option<String>,

    /// Registry to update. Without it, nothing is persisted.
    #[arg(long)]
    store: Option<PathBuf>,
}

pub async fn scan(options: ScanOptions) -> anyhow::Result<()> {
    let store = match &options.store {
        Some(path) => JsonStore::open(path).await?,
        None => JsonStore::in_memory(),
    };
    let service = Service::new(Config::default(), Arc::new(TcpConnector), Arc::new(store));
    let reply = service
        .discovery(DiscoveryOptions {
            start_range: options.start,
            end_range: options.end,
            ports: options.ports,
            user: options.user,
            pass: options.pass,
        })
        .await;
    if let Some(error) = &reply.error {
        anyhow::bail!("Discovery failed: {}", error);
    }
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}
