use std::net::SocketAddr;
use std::time::Duration;

use tracing::info;

use super::client::{Exchange, LanClient, Route};
use super::transport::Binder;
use crate::core::{Device, Error, Result, Service};
use crate::protocol::{Message, MessageKind, ReplyMode};

impl<B: Binder> LanClient<B> {
    /// Discovers devices with the configured discovery timeout and attempts
    pub async fn discover(&self) -> Result<Vec<Device>> {
        let config = self.config();
        self.discover_with(config.discovery_timeout, config.discovery_attempts)
            .await
    }

    /// Broadcasts GetService and collects every distinct device that answers
    ///
    /// Each attempt gets its own receive window. Stops early once the
    /// configured expected device count is reached; otherwise returns whatever
    /// answered within `attempts` windows, possibly nothing.
    pub async fn discover_with(&self, timeout: Duration, attempts: u32) -> Result<Vec<Device>> {
        if attempts == 0 {
            return Err(Error::invalid_field("attempts", "must be at least 1"));
        }

        let replies = self
            .exchange(
                Message::GetService {},
                Exchange {
                    route: Route::Broadcast,
                    mode: ReplyMode::Response,
                    expected: &[MessageKind::StateService],
                    wanted: self.config().expected_devices,
                    timeout,
                    attempts,
                },
            )
            .await?;

        let mut devices = Vec::with_capacity(replies.len());
        for reply in replies {
            let Message::StateService { service, port } = reply.frame.message else {
                continue;
            };
            let port = u16::try_from(port)
                .ok()
                .filter(|port| *port != 0)
                .unwrap_or_else(|| reply.from.port());
            let device = Device {
                mac: reply.frame.target(),
                addr: SocketAddr::new(reply.from.ip(), port),
                service: Service::from(service),
            };
            self.add_device(device).await;
            devices.push(device);
        }

        devices.sort_by_key(|d| d.mac);
        info!(count = devices.len(), "discovery finished");
        Ok(devices)
    }
}
