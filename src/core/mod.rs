//! Core types shared by the codec and the workflow client
//!
//! This module contains the error type, device identifiers, colour values and
//! client configuration.

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{Error, FanOutFailure, Result};
pub use self::types::{ClientConfig, Color, Device, MacAddr, Power, Service, SourceId};

/// Protocol number carried in every frame header
pub const PROTOCOL_NUMBER: u16 = 1024;

/// Port devices listen on
pub const DEFAULT_PORT: u16 = 56700;

/// Receive buffer size; the largest known frame is well under this
pub const MAX_PACKET_SIZE: usize = 1500;
