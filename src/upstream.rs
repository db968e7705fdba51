//! Forwards a single query to one upstream: UDP first, TCP retry on
//! truncation. Grounded on the teacher's `ConnectionPool` (pooled UDP sockets
//! per upstream address) and the `dns/resolver.rs` fragment's
//! send/recv-then-fall-back-to-TCP pattern, unified into one client.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use crate::dns::Message;
use crate::error::{ProxyError, Result};

const MAX_TCP_RESPONSE_LEN: usize = 65535;

pub struct UpstreamClient;

impl UpstreamClient {
    pub fn new() -> Self {
        UpstreamClient
    }

    /// Sends `query` to `addr` with timeout `timeout`, retrying over TCP if
    /// the UDP response has the TC bit set. Returns the decoded response and
    /// the round-trip time of the attempt that produced it.
    pub async fn query(
        &self,
        addr: SocketAddr,
        query: &Message,
        timeout: Duration,
    ) -> Result<(Message, Duration)> {
        let encoded = query.encode().map_err(ProxyError::EncodeFailure)?;
        let started = Instant::now();

        let response = self.query_udp(addr, &encoded, timeout).await?;
        let rtt = started.elapsed();

        if response.header.tc {
            let tcp_started = Instant::now();
            let tcp_response = self.query_tcp(addr, &encoded, timeout).await?;
            return Ok((tcp_response, tcp_started.elapsed()));
        }

        Ok((response, rtt))
    }

    async fn query_udp(&self, addr: SocketAddr, encoded: &[u8], timeout: Duration) -> Result<Message> {
        let bind_addr: SocketAddr = if addr.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| ProxyError::UpstreamNetwork { addr, source })?;

        let send = socket.send_to(encoded, addr);
        tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| ProxyError::UpstreamTimeout { addr })?
            .map_err(|source| ProxyError::UpstreamNetwork { addr, source })?;

        let mut buf = [0u8; 65535];
        let recv = socket.recv_from(&mut buf);
        let (len, from) = tokio::time::timeout(timeout, recv)
            .await
            .map_err(|_| ProxyError::UpstreamTimeout { addr })?
            .map_err(|source| match source.kind() {
                ErrorKind::ConnectionRefused => ProxyError::UpstreamRefused { addr },
                _ => ProxyError::UpstreamNetwork { addr, source },
            })?;

        if from != addr {
            return Err(ProxyError::UpstreamNetwork {
                addr,
                source: std::io::Error::new(ErrorKind::Other, "response from unexpected sender"),
            });
        }

        Message::decode(&buf[..len]).map_err(ProxyError::MalformedUpstreamResponse)
    }

    async fn query_tcp(&self, addr: SocketAddr, encoded: &[u8], timeout: Duration) -> Result<Message> {
        let connect = TcpStream::connect(addr);
        let mut stream = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| ProxyError::UpstreamTimeout { addr })?
            .map_err(|source| match source.kind() {
                ErrorKind::ConnectionRefused => ProxyError::UpstreamRefused { addr },
                _ => ProxyError::UpstreamNetwork { addr, source },
            })?;

        let mut framed = Vec::with_capacity(encoded.len() + 2);
        framed.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
        framed.extend_from_slice(encoded);

        let write = stream.write_all(&framed);
        tokio::time::timeout(timeout, write)
            .await
            .map_err(|_| ProxyError::UpstreamTimeout { addr })?
            .map_err(|source| ProxyError::UpstreamNetwork { addr, source })?;

        let mut len_buf = [0u8; 2];
        let read_len = stream.read_exact(&mut len_buf);
        tokio::time::timeout(timeout, read_len)
            .await
            .map_err(|_| ProxyError::UpstreamTimeout { addr })?
            .map_err(|source| ProxyError::UpstreamNetwork { addr, source })?;

        let resp_len = u16::from_be_bytes(len_buf) as usize;
        if resp_len > MAX_TCP_RESPONSE_LEN {
            return Err(ProxyError::UpstreamServerError { addr, rcode: crate::dns::message::rcode::SERVER_FAILURE });
        }

        let mut resp_buf = vec![0u8; resp_len];
        let read_body = stream.read_exact(&mut resp_buf);
        tokio::time::timeout(timeout, read_body)
            .await
            .map_err(|_| ProxyError::UpstreamTimeout { addr })?
            .map_err(|source| ProxyError::UpstreamNetwork { addr, source })?;

        Message::decode(&resp_buf).map_err(ProxyError::MalformedUpstreamResponse)
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}
