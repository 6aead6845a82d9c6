use crate::service::Service;
use camfinder_protocol::MessageCodec;
use camfinder_protocol::Request;
use camfinder_protocol::Response;
use futures_util::SinkExt;
use futures_util::Stream;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::codec::Framed;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts command connections on `listener`.
///
/// Every connection is served by its own task, so a long scan on one
/// connection does not block the others.
pub async fn serve(listener: TcpListener, service: Arc<Service>) -> std::io::Result<()> {
    log::info!("Accepting commands on {}", listener.local_addr()?);
    serve_incoming(TcpListenerStream::new(listener), service).await;
    Ok(())
}

/// Serves connections until `incoming` ends. Failed accepts are logged and skipped.
async fn serve_incoming(
    mut incoming: impl Stream<Item = std::io::Result<TcpStream>> + Unpin,
    service: Arc<Service>,
) {
    while let Some(stream) = incoming.next().await {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Failed to accept a connection: {}", e);
                // Running out of file descriptors fails every accept until some close
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        let remote_address = match stream.peer_addr() {
            Ok(address) => address,
            Err(e) => {
                log::warn!("Dropping a connection without a peer address: {}", e);
                continue;
            }
        };
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, remote_address, service).await {
                log::error!("Connection from {} failed: {}", remote_address, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    remote_address: SocketAddr,
    service: Arc<Service>,
) -> anyhow::Result<()> {
    log::debug!("Client connected from {}", remote_address);
    let mut framed = Framed::new(stream, MessageCodec::<Request, Response>::default());
    while let Some(request) = framed.next().await {
        match service.handle(request?).await {
            Ok(Some(response)) => framed.send(response).await?,
            Ok(None) => {}
            Err(e) => log::error!("Failed to handle a command from {}: {}", remote_address, e),
        }
    }
    log::debug!("Client {} disconnected", remote_address);
    Ok(())
}
