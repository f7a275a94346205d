use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::core::{ClientConfig, Error, Result, MAX_PACKET_SIZE};

/// A bound datagram endpoint owned by one workflow call
#[async_trait]
pub trait Transport: Send {
    /// Sends a datagram to every configured broadcast address
    async fn send_broadcast(&mut self, datagram: &[u8]) -> Result<()>;

    /// Sends a datagram to one address
    async fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> Result<()>;

    /// Waits up to `timeout` for one datagram; `None` when the window elapses
    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<(Bytes, SocketAddr)>>;

    /// Releases the endpoint
    async fn close(&mut self) -> Result<()>;
}

/// Hands out a fresh [`Transport`] per workflow call
#[async_trait]
pub trait Binder: Send + Sync + 'static {
    async fn bind(&self) -> Result<Box<dyn Transport>>;
}

/// Binds real UDP sockets
#[derive(Debug, Clone)]
pub struct UdpBinder {
    bind_addr: SocketAddr,
    broadcast_targets: Vec<SocketAddr>,
}

impl UdpBinder {
    /// Creates a binder for the configured local and broadcast addresses
    pub fn new(config: &ClientConfig) -> Self {
        UdpBinder {
            bind_addr: config.bind_addr,
            broadcast_targets: config.broadcast_targets(),
        }
    }

    fn open_socket(&self) -> Result<UdpSocket> {
        let domain = match self.bind_addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SockAddr::from(self.bind_addr))?;

        let socket = UdpSocket::from_std(socket.into())?;
        Ok(socket)
    }
}

#[async_trait]
impl Binder for UdpBinder {
    async fn bind(&self) -> Result<Box<dyn Transport>> {
        let socket = self
            .open_socket()
            .map_err(|e| Error::network(format!("Failed to bind {}: {}", self.bind_addr, e)))?;
        debug!(local = ?socket.local_addr().ok(), "bound workflow socket");

        Ok(Box::new(UdpTransport {
            socket: Some(socket),
            broadcast_targets: self.broadcast_targets.clone(),
            recv_buffer: vec![0u8; MAX_PACKET_SIZE],
        }))
    }
}

/// UDP socket transport
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    broadcast_targets: Vec<SocketAddr>,
    recv_buffer: Vec<u8>,
}

impl UdpTransport {
    fn socket(&self) -> Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| Error::network("transport already closed"))
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_broadcast(&mut self, datagram: &[u8]) -> Result<()> {
        let socket = self.socket()?;
        for target in &self.broadcast_targets {
            socket.send_to(datagram, target).await?;
            trace!(%target, len = datagram.len(), "broadcast datagram");
        }
        Ok(())
    }

    async fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> Result<()> {
        self.socket()?.send_to(datagram, addr).await?;
        trace!(%addr, len = datagram.len(), "sent datagram");
        Ok(())
    }

    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<(Bytes, SocketAddr)>> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| Error::network("transport already closed"))?;

        match tokio::time::timeout(timeout, socket.recv_from(&mut self.recv_buffer)).await {
            Err(_) => Ok(None),
            Ok(Ok((len, from))) => Ok(Some((Bytes::copy_from_slice(&self.recv_buffer[..len]), from))),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.socket.take();
        Ok(())
    }
}
