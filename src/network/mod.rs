//! Network workflows and device communication module
//!
//! This module binds transports, discovers devices and runs the
//! fire-and-forget, acknowledged and response workflows, plus the
//! multi-request multi-zone and tile-chain operations built on them.

mod client;
mod device;
mod discovery;
mod fanout;
mod group;
mod multizone;
mod tile;
mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use self::client::LanClient;
pub use self::device::{
    DeviceSnapshot, Firmware, LightStatus, Membership, RuntimeInfo, SignalInfo, Version,
    WaveformEffect,
};
pub use self::group::DeviceGroup;
pub use self::tile::{TileChain, TileWindow};
pub use self::transport::{Binder, Transport, UdpBinder, UdpTransport};
