//! Protocol implementation module
//!
//! This module defines the binary frame layout, the message type registry
//! and the fixed-width payload field types.

pub mod codec;
pub mod message;
pub mod wire;

pub use self::codec::{
    decode_frame, decode_header, encode_frame, Frame, FrameCodec, Header, ReplyMode, HEADER_SIZE,
};
pub use self::message::{descriptor, type_name, Descriptor, Message, MessageKind, REGISTRY};
pub use self::wire::{ApplyRequest, Label, TileDevice, Waveform, WireField, LABEL_SIZE};

/// Zones carried by one StateMultiZone reply
pub const ZONES_PER_REPLY: usize = 8;

/// Pixels carried by one tile state message
pub const PIXELS_PER_TILE: usize = 64;

/// Tile descriptors carried by one StateDeviceChain reply
pub const TILES_PER_CHAIN: usize = 16;
