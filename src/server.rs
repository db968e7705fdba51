//! UDP and TCP transport listeners. Grounded on the teacher's
//! `run_udp_server`/`run_tcp_server` shape (`tokio::select!` over a shutdown
//! broadcast channel plus socket I/O, one spawned task per query,
//! semaphore-bounded concurrency), simplified by removing the zero-copy fast
//! path: all parsing and policy decisions now live in `Resolver`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

use crate::resolver::Resolver;
use crate::validation::{self, Transport};

const UDP_RECV_BUF_LEN: usize = 4096;

pub async fn run_udp_server(
    bind_addr: SocketAddr,
    resolver: Arc<Resolver>,
    query_semaphore: Arc<Semaphore>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
    info!(%bind_addr, "UDP listener started");

    let mut buf = vec![0u8; UDP_RECV_BUF_LEN];

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("UDP listener shutting down");
                break;
            }
            result = socket.recv_from(&mut buf) => {
                let (len, src_addr) = result?;

                if let Err(err) = validation::validate_raw_size(len, Transport::Udp) {
                    debug!(%src_addr, %err, "dropping UDP datagram outside size bounds");
                    continue;
                }

                let permit = match query_semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!(%src_addr, "max concurrent queries reached, dropping UDP query");
                        continue;
                    }
                };

                let resolver = resolver.clone();
                let socket = socket.clone();
                let query = buf[..len].to_vec();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Some(response) = resolver.handle_query(&query, src_addr, Transport::Udp).await {
                        if let Err(err) = socket.send_to(&response, src_addr).await {
                            error!(%src_addr, %err, "failed to send UDP response");
                        }
                    }
                });
            }
        }
    }

    Ok(())
}

pub async fn run_tcp_server(
    bind_addr: SocketAddr,
    resolver: Arc<Resolver>,
    query_semaphore: Arc<Semaphore>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "TCP listener started");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("TCP listener shutting down");
                break;
            }
            result = listener.accept() => {
                let (stream, src_addr) = result?;

                let permit = match query_semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!(%src_addr, "max concurrent queries reached, rejecting TCP connection");
                        continue;
                    }
                };

                let resolver = resolver.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(err) = handle_tcp_connection(stream, src_addr, resolver).await {
                        debug!(%src_addr, %err, "TCP connection ended");
                    }
                });
            }
        }
    }

    Ok(())
}

/// §4.9: one query per connection, then close.
async fn handle_tcp_connection(
    mut stream: TcpStream,
    src_addr: SocketAddr,
    resolver: Arc<Resolver>,
) -> std::io::Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let message_len = u16::from_be_bytes(len_buf) as usize;

    if let Err(err) = validation::validate_raw_size(message_len, Transport::Tcp) {
        debug!(%src_addr, %err, "closing TCP connection: message length outside size bounds");
        return Ok(());
    }

    let mut query = vec![0u8; message_len];
    stream.read_exact(&mut query).await?;

    if let Some(response) = resolver.handle_query(&query, src_addr, Transport::Tcp).await {
        let response_len = response.len() as u16;
        stream.write_all(&response_len.to_be_bytes()).await?;
        stream.write_all(&response).await?;
        stream.flush().await?;
    }

    Ok(())
}
