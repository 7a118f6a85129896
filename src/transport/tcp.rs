// TCP transport for Raft RPCs. Generalizes the teacher's `TcpTransport`/
// `TcpConnection` (`networking::transport::tcp`): same bind/accept/connect
// shape, same exponential-backoff reconnect loop, same `TCP_NODELAY`/
// keepalive socket tuning, but carrying one `RpcMessage` frame per call
// instead of a raw byte stream, and opening a fresh connection per RPC
// rather than holding a pooled long-lived one (a single leader-to-follower
// exchange is cheap enough that connection reuse is not worth the added
// state).

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;

use crate::common::NodeId;
use crate::error::{RaftCacheError, Result};
use crate::rpc::RpcMessage;
use crate::transport::{read_frame, write_frame};

#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub bind_addr: SocketAddr,
    pub nodelay: bool,
    pub keepalive_interval: Option<Duration>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_initial_backoff: Duration,
    pub reconnect_max_backoff: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".parse().unwrap(),
            nodelay: true,
            keepalive_interval: Some(Duration::from_secs(60)),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            max_reconnect_attempts: 3,
            reconnect_initial_backoff: Duration::from_millis(50),
            reconnect_max_backoff: Duration::from_secs(2),
        }
    }
}

pub struct TcpTransport {
    config: TcpConfig,
    listener: Option<TcpListener>,
}

impl TcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        Self { config, listener: None }
    }

    pub async fn bind(&mut self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| RaftCacheError::Network(format!("failed to bind {}: {e}", self.config.bind_addr)))?;
        tracing::info!(addr = %self.config.bind_addr, "raft transport listening");
        self.listener = Some(listener);
        Ok(())
    }

    /// The address actually bound, useful when `bind_addr` used an ephemeral
    /// port (`:0`) and the caller needs to hand out the real port to peers.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .as_ref()
            .ok_or_else(|| RaftCacheError::Network("transport not bound".to_string()))?
            .local_addr()
            .map_err(|e| RaftCacheError::Network(format!("failed to read local addr: {e}")))
    }

    /// Accept one incoming connection, read its single RPC frame, and
    /// return it alongside the stream so the caller can write the reply.
    pub async fn accept(&self) -> Result<(TcpStream, RpcMessage)> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| RaftCacheError::Network("transport not bound".to_string()))?;
        let (mut stream, peer) = listener
            .accept()
            .await
            .map_err(|e| RaftCacheError::Network(format!("accept failed: {e}")))?;
        self.configure_socket(&stream)?;
        tracing::debug!(%peer, "accepted raft rpc connection");
        let message = read_frame(&mut stream).await?;
        Ok((stream, message))
    }

    /// Send `message` to `peer_addr` and wait for its reply, with
    /// exponential-backoff retry on connection failure.
    pub async fn send_request(&self, peer_id: &NodeId, peer_addr: SocketAddr, message: &RpcMessage) -> Result<RpcMessage> {
        let mut attempt = 0;
        let mut backoff = self.config.reconnect_initial_backoff;

        loop {
            match self.try_send_once(peer_addr, message).await {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.config.max_reconnect_attempts {
                        return Err(err);
                    }
                    tracing::warn!(peer = %peer_id, %attempt, error = %err, "rpc send failed, retrying");
                    sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, self.config.reconnect_max_backoff);
                }
            }
        }
    }

    async fn try_send_once(&self, peer_addr: SocketAddr, message: &RpcMessage) -> Result<RpcMessage> {
        let mut stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(peer_addr))
            .await
            .map_err(|_| RaftCacheError::Timeout(format!("connect to {peer_addr}")))?
            .map_err(|e| RaftCacheError::Network(format!("connect to {peer_addr} failed: {e}")))?;
        self.configure_socket(&stream)?;

        tokio::time::timeout(self.config.request_timeout, write_frame(&mut stream, message))
            .await
            .map_err(|_| RaftCacheError::Timeout(format!("write to {peer_addr}")))??;

        tokio::time::timeout(self.config.request_timeout, read_frame(&mut stream))
            .await
            .map_err(|_| RaftCacheError::Timeout(format!("read from {peer_addr}")))?
    }

    fn configure_socket(&self, stream: &TcpStream) -> Result<()> {
        if self.config.nodelay {
            stream
                .set_nodelay(true)
                .map_err(|e| RaftCacheError::Network(format!("set TCP_NODELAY failed: {e}")))?;
        }
        if let Some(keepalive) = self.config.keepalive_interval {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new().with_time(keepalive).with_interval(keepalive);
            socket
                .set_tcp_keepalive(&keepalive)
                .map_err(|e| RaftCacheError::Network(format!("set keepalive failed: {e}")))?;
        }
        Ok(())
    }
}
