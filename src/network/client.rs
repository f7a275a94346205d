use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::transport::{Binder, Transport, UdpBinder};
use crate::core::{ClientConfig, Device, Error, MacAddr, Result, SourceId};
use crate::protocol::{decode_frame, Frame, FrameCodec, Message, MessageKind, ReplyMode};

/// Where a request is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Every configured broadcast address, target MAC all zero
    Broadcast,
    /// One known device
    Unicast(Device),
}

impl Route {
    fn target(&self) -> MacAddr {
        match self {
            Route::Broadcast => MacAddr::BROADCAST,
            Route::Unicast(device) => device.mac,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Broadcast => f.write_str("broadcast"),
            Route::Unicast(device) => write!(f, "{}", device),
        }
    }
}

/// Parameters of one bounded send/receive loop
pub(crate) struct Exchange<'a> {
    pub route: Route,
    pub mode: ReplyMode,
    /// Reply types that satisfy the request
    pub expected: &'a [MessageKind],
    /// Distinct replies to wait for; `None` collects until attempts run out
    pub wanted: Option<usize>,
    pub timeout: Duration,
    pub attempts: u32,
}

/// A valid reply and the address it arrived from
#[derive(Debug, Clone)]
pub(crate) struct Reply {
    pub frame: Frame,
    pub from: SocketAddr,
}

/// Shared state between client handles
struct SharedState<B> {
    config: ClientConfig,
    /// Stamped on every outgoing frame
    source: SourceId,
    sequence: AtomicU8,
    /// Known devices by hardware address
    devices: RwLock<HashMap<MacAddr, Device>>,
    binder: B,
}

/// LAN protocol client
///
/// Cheap to clone; clones share the source identifier, sequence counter and
/// device table. Every workflow call binds its own transport and releases it
/// before returning.
pub struct LanClient<B = UdpBinder> {
    shared: Arc<SharedState<B>>,
    cancel: CancellationToken,
}

impl<B> Clone for LanClient<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            cancel: self.cancel.clone(),
        }
    }
}

impl LanClient<UdpBinder> {
    /// Creates a client that talks over real UDP sockets
    pub fn new(config: ClientConfig) -> Result<Self> {
        let binder = UdpBinder::new(&config);
        Self::with_binder(config, binder)
    }
}

impl<B: Binder> LanClient<B> {
    /// Creates a client over a custom transport binder
    pub fn with_binder(config: ClientConfig, binder: B) -> Result<Self> {
        config.validate()?;
        let source = SourceId::random();
        debug!(source = source.0, "created LAN client");

        Ok(LanClient {
            shared: Arc::new(SharedState {
                config,
                source,
                sequence: AtomicU8::new(0),
                devices: RwLock::new(HashMap::new()),
                binder,
            }),
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn source(&self) -> SourceId {
        self.shared.source
    }

    /// A handle sharing this client's state but observing `token`
    ///
    /// Cancelling the token aborts in-flight workflows of the returned handle
    /// between attempts.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        LanClient {
            shared: Arc::clone(&self.shared),
            cancel: token,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels in-flight and future workflows of this handle
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Snapshot of the device table, ordered by hardware address
    pub async fn devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.shared.devices.read().await.values().copied().collect();
        devices.sort_by_key(|d| d.mac);
        devices
    }

    /// Last known handle for a hardware address
    pub async fn device(&self, mac: MacAddr) -> Option<Device> {
        self.shared.devices.read().await.get(&mac).copied()
    }

    /// Adds or replaces a device table entry
    pub async fn add_device(&self, device: Device) {
        self.shared.devices.write().await.insert(device.mac, device);
    }

    /// Records the address a device was last heard from
    async fn learn(&self, mac: MacAddr, from: SocketAddr) {
        let mut devices = self.shared.devices.write().await;
        match devices.get_mut(&mac) {
            Some(device) if device.addr == from => {}
            Some(device) => {
                debug!(%mac, old = %device.addr, new = %from, "device address changed");
                device.addr = from;
            }
            None => {
                debug!(%mac, %from, "learned device");
                devices.insert(mac, Device::new(mac, from));
            }
        }
    }

    fn next_sequence(&self) -> u8 {
        self.shared.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Device count broadcast workflows wait for
    async fn expected_devices(&self) -> Option<usize> {
        if let Some(count) = self.shared.config.expected_devices {
            return Some(count);
        }
        match self.shared.devices.read().await.len() {
            0 => None,
            count => Some(count),
        }
    }

    fn encode(&self, route: Route, mode: ReplyMode, message: Message) -> Result<(Frame, BytesMut)> {
        message.validate()?;
        let frame = Frame::request(self.shared.source, route.target(), self.next_sequence(), mode, message);
        let mut datagram = BytesMut::with_capacity(frame.wire_size());
        FrameCodec::new().encode(&frame, &mut datagram)?;
        Ok((frame, datagram))
    }

    async fn send(transport: &mut dyn Transport, route: Route, datagram: &[u8]) -> Result<()> {
        match route {
            Route::Broadcast => transport.send_broadcast(datagram).await,
            Route::Unicast(device) => transport.send_to(datagram, device.addr).await,
        }
    }

    /// Runs one bounded retry loop on a fresh transport
    pub(crate) async fn exchange(&self, message: Message, ex: Exchange<'_>) -> Result<Vec<Reply>> {
        let (request, datagram) = self.encode(ex.route, ex.mode, message)?;

        let mut transport = self.shared.binder.bind().await?;
        let result = self.drive(transport.as_mut(), &request, &datagram, &ex).await;
        if let Err(e) = transport.close().await {
            warn!(error = %e, "failed to close transport");
        }
        result
    }

    async fn drive(
        &self,
        transport: &mut dyn Transport,
        request: &Frame,
        datagram: &[u8],
        ex: &Exchange<'_>,
    ) -> Result<Vec<Reply>> {
        let mut replies = Vec::new();
        let mut seen = HashSet::new();

        for attempt in 1..=ex.attempts {
            if self.cancel.is_cancelled() {
                debug!(route = %ex.route, attempt, "workflow cancelled");
                return Err(Error::Cancelled);
            }

            Self::send(transport, ex.route, datagram).await?;
            debug!(
                route = %ex.route,
                message = %request.message.name(),
                sequence = request.header.sequence,
                attempt,
                "sent request"
            );

            let deadline = Instant::now() + ex.timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }

                let (bytes, from) = match transport.recv_timeout(remaining).await {
                    Ok(Some(received)) => received,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "receive failed, ending attempt");
                        break;
                    }
                };

                let reply = match decode_frame(&bytes) {
                    Ok(frame) => frame,
                    Err(e) => {
                        trace!(%from, error = %e, "dropping undecodable datagram");
                        continue;
                    }
                };

                if !self.is_valid_reply(request, &reply, ex) {
                    trace!(%from, message = %reply.message.name(), "ignoring unrelated frame");
                    continue;
                }

                let mac = reply.target();
                if !seen.insert(mac) {
                    trace!(%mac, "duplicate reply");
                    continue;
                }

                self.learn(mac, from).await;
                debug!(%mac, message = %reply.message.name(), attempt, "received reply");
                replies.push(Reply { frame: reply, from });

                if ex.wanted.map_or(false, |wanted| replies.len() >= wanted) {
                    return Ok(replies);
                }
            }
        }

        Ok(replies)
    }

    fn is_valid_reply(&self, request: &Frame, reply: &Frame, ex: &Exchange<'_>) -> bool {
        let message_type = reply.message.message_type();
        if !ex.expected.iter().any(|kind| kind.code() == message_type) {
            return false;
        }
        if reply.source() != request.source() {
            return false;
        }
        match ex.route {
            Route::Broadcast => !reply.target().is_broadcast(),
            Route::Unicast(device) => reply.target() == device.mac,
        }
    }

    /// Sends `repeats` unacknowledged copies on a fresh transport
    async fn blast(&self, route: Route, message: Message, repeats: u32) -> Result<()> {
        let (request, datagram) = self.encode(route, ReplyMode::FireAndForget, message)?;
        let interval = self.shared.config.repeat_interval_for(repeats);

        let mut transport = self.shared.binder.bind().await?;
        let result = async {
            for copy in 0..repeats {
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if copy > 0 {
                    tokio::time::sleep(interval).await;
                }
                Self::send(transport.as_mut(), route, &datagram).await?;
            }
            debug!(%route, message = %request.message.name(), repeats, "fired request");
            Ok::<(), Error>(())
        }
        .await;

        if let Err(e) = transport.close().await {
            warn!(error = %e, "failed to close transport");
        }
        result
    }

    fn no_response(route: Route, operation: String, attempts: u32) -> Error {
        Error::NoResponse {
            target: match route {
                Route::Broadcast => "broadcast".to_string(),
                Route::Unicast(device) => device.mac.to_string(),
            },
            operation,
            attempts,
        }
    }

    /// Sends a message without waiting for any reply
    pub async fn fire_and_forget(&self, device: &Device, message: Message) -> Result<()> {
        self.blast(Route::Unicast(*device), message, self.shared.config.num_repeats)
            .await
    }

    /// Sends a message `repeats` times without waiting for any reply
    pub async fn fire_and_forget_repeated(
        &self,
        device: &Device,
        message: Message,
        repeats: u32,
    ) -> Result<()> {
        if repeats == 0 {
            return Err(Error::invalid_field("repeats", "must be at least 1"));
        }
        self.blast(Route::Unicast(*device), message, repeats).await
    }

    /// Sends a message and waits for the device's acknowledgement
    pub async fn send_with_ack(&self, device: &Device, message: Message) -> Result<()> {
        let route = Route::Unicast(*device);
        let attempts = self.shared.config.max_attempts;
        let operation = message.name();
        let replies = self
            .exchange(
                message,
                Exchange {
                    route,
                    mode: ReplyMode::Ack,
                    expected: &[MessageKind::Acknowledgement],
                    wanted: Some(1),
                    timeout: self.shared.config.timeout,
                    attempts,
                },
            )
            .await?;

        if replies.is_empty() {
            return Err(Self::no_response(route, operation, attempts));
        }
        Ok(())
    }

    /// Sends a message and waits for a reply of one of the `expected` types
    pub async fn send_with_response(
        &self,
        device: &Device,
        message: Message,
        expected: &[MessageKind],
    ) -> Result<Message> {
        let route = Route::Unicast(*device);
        let attempts = self.shared.config.max_attempts;
        let operation = message.name();
        let replies = self
            .exchange(
                message,
                Exchange {
                    route,
                    mode: ReplyMode::Response,
                    expected,
                    wanted: Some(1),
                    timeout: self.shared.config.timeout,
                    attempts,
                },
            )
            .await?;

        replies
            .into_iter()
            .next()
            .map(|reply| reply.frame.message)
            .ok_or_else(|| Self::no_response(route, operation, attempts))
    }

    /// Set-style send: unacknowledged when `rapid`, acknowledged otherwise
    pub async fn apply(&self, device: &Device, message: Message, rapid: bool) -> Result<()> {
        if rapid {
            self.fire_and_forget(device, message).await
        } else {
            self.send_with_ack(device, message).await
        }
    }

    /// Broadcasts a message without waiting for any reply
    pub async fn broadcast_fire_and_forget(&self, message: Message) -> Result<()> {
        self.blast(Route::Broadcast, message, self.shared.config.num_repeats)
            .await
    }

    /// Broadcasts a message and returns the devices that acknowledged it
    pub async fn broadcast_with_ack(&self, message: Message) -> Result<Vec<Device>> {
        let replies = self
            .broadcast(message, ReplyMode::Ack, &[MessageKind::Acknowledgement])
            .await?;
        Ok(replies.into_iter().map(|(device, _)| device).collect())
    }

    /// Broadcasts a message and returns every device's reply
    pub async fn broadcast_with_response(
        &self,
        message: Message,
        expected: &[MessageKind],
    ) -> Result<Vec<(Device, Message)>> {
        self.broadcast(message, ReplyMode::Response, expected).await
    }

    async fn broadcast(
        &self,
        message: Message,
        mode: ReplyMode,
        expected: &[MessageKind],
    ) -> Result<Vec<(Device, Message)>> {
        let wanted = self.expected_devices().await;
        let attempts = self.shared.config.max_attempts;
        let operation = message.name();
        let replies = self
            .exchange(
                message,
                Exchange {
                    route: Route::Broadcast,
                    mode,
                    expected,
                    wanted,
                    timeout: self.shared.config.timeout,
                    attempts,
                },
            )
            .await?;

        if let Some(wanted) = wanted {
            if replies.len() < wanted {
                debug!(wanted, got = replies.len(), "broadcast fell short");
                return Err(Self::no_response(Route::Broadcast, operation, attempts));
            }
        }

        let mut results = Vec::with_capacity(replies.len());
        for reply in replies {
            let mac = reply.frame.target();
            let device = self
                .device(mac)
                .await
                .unwrap_or_else(|| Device::new(mac, reply.from));
            results.push((device, reply.frame.message));
        }
        results.sort_by_key(|(device, _)| device.mac);
        Ok(results)
    }
}
