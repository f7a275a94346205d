//! Scripted in-memory transport for workflow tests

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::transport::{Binder, Transport};
use crate::core::{MacAddr, Result, DEFAULT_PORT};
use crate::protocol::{decode_frame, encode_frame, Frame, Message, ReplyMode};

/// Where a recorded datagram was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Broadcast,
    To(SocketAddr),
}

/// One datagram handed to the transport
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub frame: Frame,
    pub destination: Destination,
}

/// Computes the replies to the `n`th sent frame (zero-based, across all binds)
pub type Responder = dyn Fn(usize, &Frame) -> Vec<(Bytes, SocketAddr)> + Send + Sync;

#[derive(Default)]
struct State {
    sent: Vec<SentFrame>,
    binds: usize,
    closes: usize,
}

/// Binder whose transports record sends and replay scripted replies
#[derive(Clone)]
pub struct MockBinder {
    state: Arc<Mutex<State>>,
    responder: Arc<Responder>,
}

impl MockBinder {
    pub fn new(
        responder: impl Fn(usize, &Frame) -> Vec<(Bytes, SocketAddr)> + Send + Sync + 'static,
    ) -> Self {
        MockBinder {
            state: Arc::new(Mutex::new(State::default())),
            responder: Arc::new(responder),
        }
    }

    /// A network where nothing ever answers
    pub fn silent() -> Self {
        Self::new(|_, _| Vec::new())
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }

    /// Sent frames carrying the given message type
    pub fn sent_of_type(&self, message_type: u16) -> Vec<Frame> {
        self.sent()
            .into_iter()
            .map(|s| s.frame)
            .filter(|f| f.message.message_type() == message_type)
            .collect()
    }

    pub fn binds(&self) -> usize {
        self.state.lock().unwrap().binds
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait]
impl Binder for MockBinder {
    async fn bind(&self) -> Result<Box<dyn Transport>> {
        self.state.lock().unwrap().binds += 1;
        Ok(Box::new(MockTransport {
            binder: self.clone(),
            inbox: VecDeque::new(),
        }))
    }
}

struct MockTransport {
    binder: MockBinder,
    inbox: VecDeque<(Bytes, SocketAddr)>,
}

impl MockTransport {
    fn record(&mut self, datagram: &[u8], destination: Destination) {
        let frame = decode_frame(datagram).unwrap();
        let index = {
            let mut state = self.binder.state.lock().unwrap();
            state.sent.push(SentFrame {
                frame: frame.clone(),
                destination,
            });
            state.sent.len() - 1
        };
        self.inbox.extend((self.binder.responder)(index, &frame));
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_broadcast(&mut self, datagram: &[u8]) -> Result<()> {
        self.record(datagram, Destination::Broadcast);
        Ok(())
    }

    async fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> Result<()> {
        self.record(datagram, Destination::To(addr));
        Ok(())
    }

    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<(Bytes, SocketAddr)>> {
        match self.inbox.pop_front() {
            Some(reply) => Ok(Some(reply)),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.binder.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Socket address of the `n`th simulated device
pub fn device_addr(n: u8) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, n)), DEFAULT_PORT)
}

/// Hardware address of the `n`th simulated device
pub fn device_mac(n: u8) -> MacAddr {
    MacAddr([0xd0, 0x73, 0xd5, 0x00, 0x00, n])
}

/// Encodes a reply from `from` to `request`
pub fn reply(request: &Frame, from: MacAddr, message: Message) -> Bytes {
    let frame = Frame::request(
        request.source(),
        from,
        request.header.sequence,
        ReplyMode::FireAndForget,
        message,
    );
    let mut buf = BytesMut::new();
    encode_frame(&frame, &mut buf).unwrap();
    buf.freeze()
}
