//! lifx_lan: LAN protocol client for networked light fixtures
//!
//! This library discovers devices on the local network by broadcast and
//! controls them over UDP. Every request is bounded: acknowledged and
//! response workflows retry a fixed number of times with a per-attempt
//! timeout, and replies are matched to requests by source identifier, target
//! address and message type.
//!
//! ```no_run
//! use lifx_lan::{ClientConfig, LanClient, Power};
//!
//! # async fn run() -> lifx_lan::Result<()> {
//! let client = LanClient::new(ClientConfig::default())?;
//! for device in client.discover().await? {
//!     client.set_power(&device, Power::On, false).await?;
//! }
//! # Ok(())
//! # }
//! ```
pub mod core;
pub mod network;
pub mod protocol;
pub mod util;

// Re-export commonly used items
pub use crate::core::{
    ClientConfig, Color, Device, Error, FanOutFailure, MacAddr, Power, Result, Service, SourceId,
};
pub use crate::network::{DeviceGroup, DeviceSnapshot, LanClient, TileChain, TileWindow};
pub use crate::protocol::{ApplyRequest, Message, MessageKind, Waveform};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
