mod scan;
mod server;

use clap::Parser;
use clap::Subcommand;
use std::net::SocketAddr;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    match Cli::parse().command {
        Command::Serve {
            listen,
            store,
            namespace,
            step_timeout_ms,
        } => crate::server::serve(listen, store, namespace, step_timeout_ms).await?,
        Command::Scan(options) => crate::scan::scan(options).await?,
    };
    Ok(())
}

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accepts line-delimited JSON commands over TCP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:7878")]
        listen: SocketAddr,

        /// JSON file holding the registry.
        #[arg(long)]
        store: PathBuf,

        #[arg(long, default_value = camfinder::DEFAULT_NAMESPACE)]
        namespace: String,

        #[arg(long, default_value_t = 5000)]
        step_timeout_ms: u64,
    },

    /// Runs one discovery and prints the reply as JSON.
    Scan(scan::ScanOptions),
}
