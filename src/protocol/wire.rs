//! Fixed-width little-endian payload fields
//!
//! Every payload schema in the registry is an ordered list of types
//! implementing [`WireField`]. A field knows its encoded width, how to write
//! itself and how to read itself back; the registry sums the widths to get
//! the schema size and checks it once before any field is read.

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::core::{Color, Error, Result};

/// Width of label-like fields
pub const LABEL_SIZE: usize = 32;

/// A value with a fixed little-endian wire representation
pub trait WireField: Sized {
    /// Encoded width in bytes
    const SIZE: usize;

    /// Appends the encoded value
    fn put<B: BufMut>(&self, dst: &mut B);

    /// Reads the value; the caller guarantees `SIZE` bytes remain
    fn take<B: Buf>(src: &mut B) -> Result<Self>;
}

macro_rules! primitive_fields {
    ($($t:ty => $put:ident, $get:ident;)*) => {
        $(
            impl WireField for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn put<B: BufMut>(&self, dst: &mut B) {
                    dst.$put(*self);
                }

                fn take<B: Buf>(src: &mut B) -> Result<Self> {
                    Ok(src.$get())
                }
            }
        )*
    };
}

primitive_fields! {
    u8 => put_u8, get_u8;
    u16 => put_u16_le, get_u16_le;
    i16 => put_i16_le, get_i16_le;
    u32 => put_u32_le, get_u32_le;
    u64 => put_u64_le, get_u64_le;
    f32 => put_f32_le, get_f32_le;
}

impl<T: WireField, const N: usize> WireField for [T; N] {
    const SIZE: usize = T::SIZE * N;

    fn put<B: BufMut>(&self, dst: &mut B) {
        for item in self {
            item.put(dst);
        }
    }

    fn take<B: Buf>(src: &mut B) -> Result<Self> {
        let items = (0..N).map(|_| T::take(src)).collect::<Result<Vec<T>>>()?;
        items
            .try_into()
            .map_err(|_| Error::malformed("array length mismatch"))
    }
}

impl WireField for Color {
    const SIZE: usize = 8;

    fn put<B: BufMut>(&self, dst: &mut B) {
        dst.put_u16_le(self.hue);
        dst.put_u16_le(self.saturation);
        dst.put_u16_le(self.brightness);
        dst.put_u16_le(self.kelvin);
    }

    fn take<B: Buf>(src: &mut B) -> Result<Self> {
        Ok(Color {
            hue: src.get_u16_le(),
            saturation: src.get_u16_le(),
            brightness: src.get_u16_le(),
            kelvin: src.get_u16_le(),
        })
    }
}

/// Null-padded 32-byte text field (device label, group or location name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Label(String);

impl Label {
    /// Creates a label, rejecting text longer than 32 bytes
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.len() > LABEL_SIZE {
            return Err(Error::PayloadTooLong {
                field: "label",
                len: text.len(),
                max: LABEL_SIZE,
            });
        }
        Ok(Label(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Label {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl WireField for Label {
    const SIZE: usize = LABEL_SIZE;

    fn put<B: BufMut>(&self, dst: &mut B) {
        let bytes = &self.0.as_bytes()[..self.0.len().min(LABEL_SIZE)];
        dst.put_slice(bytes);
        dst.put_bytes(0, LABEL_SIZE - bytes.len());
    }

    fn take<B: Buf>(src: &mut B) -> Result<Self> {
        let mut raw = [0u8; LABEL_SIZE];
        src.copy_to_slice(&mut raw);
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let mut text = String::from_utf8_lossy(&raw[..end]).into_owned();

        // A replacement character is wider than the byte it stands for
        let mut cut = text.len().min(LABEL_SIZE);
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        Ok(Label(text))
    }
}

/// How a multi-zone write is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplyRequest {
    /// Buffer the change until a later apply
    NoApply = 0,
    /// Apply this change and everything buffered
    Apply = 1,
    /// Apply buffered changes, ignoring this message's colour
    ApplyOnly = 2,
}

impl WireField for ApplyRequest {
    const SIZE: usize = 1;

    fn put<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(*self as u8);
    }

    fn take<B: Buf>(src: &mut B) -> Result<Self> {
        match src.get_u8() {
            0 => Ok(ApplyRequest::NoApply),
            1 => Ok(ApplyRequest::Apply),
            2 => Ok(ApplyRequest::ApplyOnly),
            other => Err(Error::malformed(format!("unknown apply request {other}"))),
        }
    }
}

/// Waveform of a LightSetWaveform effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Waveform {
    Saw = 0,
    Sine = 1,
    HalfSine = 2,
    Triangle = 3,
    Pulse = 4,
}

impl WireField for Waveform {
    const SIZE: usize = 1;

    fn put<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(*self as u8);
    }

    fn take<B: Buf>(src: &mut B) -> Result<Self> {
        match src.get_u8() {
            0 => Ok(Waveform::Saw),
            1 => Ok(Waveform::Sine),
            2 => Ok(Waveform::HalfSine),
            3 => Ok(Waveform::Triangle),
            4 => Ok(Waveform::Pulse),
            other => Err(Error::malformed(format!("unknown waveform {other}"))),
        }
    }
}

/// One tile descriptor inside a StateDeviceChain reply
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TileDevice {
    pub accel_meas_x: i16,
    pub accel_meas_y: i16,
    pub accel_meas_z: i16,
    pub reserved1: i16,
    pub user_x: f32,
    pub user_y: f32,
    pub width: u8,
    pub height: u8,
    pub reserved2: u8,
    pub device_version_vendor: u32,
    pub device_version_product: u32,
    pub device_version_version: u32,
    pub firmware_build: u64,
    pub reserved3: u64,
    pub firmware_version: u32,
    pub reserved4: u32,
}

impl TileDevice {
    /// Number of pixels on this tile
    pub fn pixel_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

impl WireField for TileDevice {
    const SIZE: usize = 55;

    fn put<B: BufMut>(&self, dst: &mut B) {
        dst.put_i16_le(self.accel_meas_x);
        dst.put_i16_le(self.accel_meas_y);
        dst.put_i16_le(self.accel_meas_z);
        dst.put_i16_le(self.reserved1);
        dst.put_f32_le(self.user_x);
        dst.put_f32_le(self.user_y);
        dst.put_u8(self.width);
        dst.put_u8(self.height);
        dst.put_u8(self.reserved2);
        dst.put_u32_le(self.device_version_vendor);
        dst.put_u32_le(self.device_version_product);
        dst.put_u32_le(self.device_version_version);
        dst.put_u64_le(self.firmware_build);
        dst.put_u64_le(self.reserved3);
        dst.put_u32_le(self.firmware_version);
        dst.put_u32_le(self.reserved4);
    }

    fn take<B: Buf>(src: &mut B) -> Result<Self> {
        Ok(TileDevice {
            accel_meas_x: src.get_i16_le(),
            accel_meas_y: src.get_i16_le(),
            accel_meas_z: src.get_i16_le(),
            reserved1: src.get_i16_le(),
            user_x: src.get_f32_le(),
            user_y: src.get_f32_le(),
            width: src.get_u8(),
            height: src.get_u8(),
            reserved2: src.get_u8(),
            device_version_vendor: src.get_u32_le(),
            device_version_product: src.get_u32_le(),
            device_version_version: src.get_u32_le(),
            firmware_build: src.get_u64_le(),
            reserved3: src.get_u64_le(),
            firmware_version: src.get_u32_le(),
            reserved4: src.get_u32_le(),
        })
    }
}
