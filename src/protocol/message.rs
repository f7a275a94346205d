//! Message type registry
//!
//! Each row of the `registry!` table below names a message, its numeric type
//! code and its ordered payload fields. From that one row the macro derives
//! the [`Message`] variant, the [`MessageKind`] code, the [`Descriptor`]
//! metadata and the payload encode/decode arms. Adding a message type means
//! adding a row.

use bytes::{BufMut, Bytes};

use super::wire::{ApplyRequest, Label, TileDevice, WireField, Waveform};
use crate::core::{Color, Error, Power, Result};

/// Static metadata for one message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub kind: MessageKind,
    pub code: u16,
    pub name: &'static str,
    /// Minimum payload length; longer payloads are accepted
    pub payload_size: usize,
}

macro_rules! registry {
    ($(
        $(#[$doc:meta])*
        $name:ident = $code:literal { $($field:ident : $ty:ty),* $(,)? }
    ),* $(,)?) => {
        /// Numeric message type codes known to this crate
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum MessageKind {
            $( $name = $code, )*
        }

        impl MessageKind {
            /// Looks up a known type code
            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $( $code => Some(MessageKind::$name), )*
                    _ => None,
                }
            }

            pub fn code(self) -> u16 {
                self as u16
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( MessageKind::$name => stringify!($name), )*
                }
            }
        }

        /// Every registered message type, in type-code order
        pub const REGISTRY: &[Descriptor] = &[
            $(
                Descriptor {
                    kind: MessageKind::$name,
                    code: $code,
                    name: stringify!($name),
                    payload_size: 0 $( + <$ty as WireField>::SIZE )*,
                },
            )*
        ];

        /// Typed view of a frame payload
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $(
                $(#[$doc])*
                $name { $( $field: $ty ),* },
            )*
            /// A type code with no registered schema; the payload is kept verbatim
            Unknown { message_type: u16, payload: Bytes },
        }

        impl Message {
            /// Wire type code of this message
            pub fn message_type(&self) -> u16 {
                match self {
                    $( Message::$name { .. } => $code, )*
                    Message::Unknown { message_type, .. } => *message_type,
                }
            }

            /// Registered kind, `None` for unknown messages
            pub fn kind(&self) -> Option<MessageKind> {
                match self {
                    $( Message::$name { .. } => Some(MessageKind::$name), )*
                    Message::Unknown { .. } => None,
                }
            }

            /// Appends the payload bytes
            #[allow(unused_variables)]
            pub fn encode_payload<B: BufMut>(&self, dst: &mut B) {
                match self {
                    $(
                        Message::$name { $( $field ),* } => {
                            $( $field.put(dst); )*
                        }
                    )*
                    Message::Unknown { payload, .. } => dst.put_slice(payload),
                }
            }

            /// Builds a typed message from a type code and payload bytes
            ///
            /// Unregistered codes yield [`Message::Unknown`]; a payload shorter
            /// than the registered schema is a malformed frame.
            #[allow(unused_mut)]
            pub fn decode(message_type: u16, payload: &[u8]) -> Result<Message> {
                match message_type {
                    $(
                        $code => {
                            let size = 0 $( + <$ty as WireField>::SIZE )*;
                            if payload.len() < size {
                                return Err(Error::malformed(format!(
                                    "{} payload is {} bytes, expected {}",
                                    stringify!($name),
                                    payload.len(),
                                    size
                                )));
                            }
                            let mut src = payload;
                            $( let $field = <$ty as WireField>::take(&mut src)?; )*
                            Ok(Message::$name { $( $field ),* })
                        }
                    )*
                    _ => Ok(Message::Unknown {
                        message_type,
                        payload: Bytes::copy_from_slice(payload),
                    }),
                }
            }
        }
    };
}

registry! {
    // Device messages
    GetService = 2 {},
    /// Reply to GetService; a port of zero means the service is down
    StateService = 3 { service: u8, port: u32 },
    GetHostInfo = 12 {},
    StateHostInfo = 13 { signal: f32, tx: u32, rx: u32, reserved: i16 },
    GetHostFirmware = 14 {},
    StateHostFirmware = 15 { build: u64, reserved: u64, version: u32 },
    GetWifiInfo = 16 {},
    StateWifiInfo = 17 { signal: f32, tx: u32, rx: u32, reserved: i16 },
    GetWifiFirmware = 18 {},
    StateWifiFirmware = 19 { build: u64, reserved: u64, version: u32 },
    GetPower = 20 {},
    SetPower = 21 { power_level: u16 },
    StatePower = 22 { power_level: u16 },
    GetLabel = 23 {},
    SetLabel = 24 { label: Label },
    StateLabel = 25 { label: Label },
    GetVersion = 32 {},
    StateVersion = 33 { vendor: u32, product: u32, version: u32 },
    GetInfo = 34 {},
    /// Device clock, uptime and last downtime, all in nanoseconds
    StateInfo = 35 { time: u64, uptime: u64, downtime: u64 },
    Acknowledgement = 45 {},
    GetLocation = 48 {},
    StateLocation = 50 { location: [u8; 16], label: Label, updated_at: u64 },
    GetGroup = 51 {},
    StateGroup = 53 { group: [u8; 16], label: Label, updated_at: u64 },
    EchoRequest = 58 { data: [u8; 64] },
    EchoResponse = 59 { data: [u8; 64] },

    // Light messages
    LightGet = 101 {},
    LightSetColor = 102 { reserved: u8, color: Color, duration: u32 },
    LightSetWaveform = 103 {
        reserved: u8,
        transient: u8,
        color: Color,
        period: u32,
        cycles: f32,
        skew_ratio: i16,
        waveform: Waveform,
    },
    LightState = 107 {
        color: Color,
        reserved: i16,
        power_level: u16,
        label: Label,
        reserved2: u64,
    },
    LightGetPower = 116 {},
    LightSetPower = 117 { power_level: u16, duration: u32 },
    LightStatePower = 118 { power_level: u16 },
    LightGetInfrared = 120 {},
    LightStateInfrared = 121 { brightness: u16 },
    LightSetInfrared = 122 { brightness: u16 },

    // Multi-zone messages
    SetColorZones = 501 {
        start_index: u8,
        end_index: u8,
        color: Color,
        duration: u32,
        apply: ApplyRequest,
    },
    GetColorZones = 502 { start_index: u8, end_index: u8 },
    /// Single zone; `count` is the strip's total zone count
    StateZone = 503 { count: u8, index: u8, color: Color },
    /// Eight zones starting at `index`; `count` is the strip's total zone count
    StateMultiZone = 506 { count: u8, index: u8, colors: [Color; 8] },

    // Tile messages
    GetDeviceChain = 701 {},
    StateDeviceChain = 702 {
        start_index: u8,
        tile_devices: [TileDevice; 16],
        total_count: u8,
    },
    SetUserPosition = 703 { tile_index: u8, reserved: u16, user_x: f32, user_y: f32 },
    GetTileState64 = 707 {
        tile_index: u8,
        length: u8,
        reserved: u8,
        x: u8,
        y: u8,
        width: u8,
    },
    StateTileState64 = 711 {
        tile_index: u8,
        reserved: u8,
        x: u8,
        y: u8,
        width: u8,
        colors: [Color; 64],
    },
    SetTileState64 = 715 {
        tile_index: u8,
        length: u8,
        reserved: u8,
        x: u8,
        y: u8,
        width: u8,
        duration: u32,
        colors: [Color; 64],
    },
}

/// Metadata for a type code, if registered
pub fn descriptor(code: u16) -> Option<&'static Descriptor> {
    REGISTRY.iter().find(|d| d.code == code)
}

/// Human label for a type code, including unregistered ones
pub fn type_name(code: u16) -> String {
    match MessageKind::from_code(code) {
        Some(kind) => kind.name().to_string(),
        None => format!("Unknown({code})"),
    }
}

impl Message {
    /// Human label of this message
    pub fn name(&self) -> String {
        type_name(self.message_type())
    }

    /// Encoded payload length
    pub fn payload_len(&self) -> usize {
        match self {
            Message::Unknown { payload, .. } => payload.len(),
            other => descriptor(other.message_type()).map_or(0, |d| d.payload_size),
        }
    }

    /// Whether this is a device acknowledgement
    pub fn is_ack(&self) -> bool {
        matches!(self, Message::Acknowledgement {})
    }

    /// Checks caller-supplied fields of an outgoing request
    pub fn validate(&self) -> Result<()> {
        match self {
            Message::SetPower { power_level } | Message::LightSetPower { power_level, .. } => {
                Power::try_from(*power_level).map(|_| ())
            }
            Message::LightSetColor { color, .. }
            | Message::LightSetWaveform { color, .. }
            | Message::SetColorZones { color, .. } => color.validate(),
            Message::SetTileState64 { colors, .. } => colors.iter().try_for_each(Color::validate),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn round_trip(message: &Message) -> Message {
        let mut buf = BytesMut::new();
        message.encode_payload(&mut buf);
        assert_eq!(buf.len(), message.payload_len(), "{}", message.name());
        let decoded = Message::decode(message.message_type(), &buf).unwrap();

        let mut again = BytesMut::new();
        decoded.encode_payload(&mut again);
        assert_eq!(buf, again, "{} payload bytes differ", message.name());
        decoded
    }

    #[test]
    fn test_catalog_codes() {
        let expected = [
            (MessageKind::GetService, 2),
            (MessageKind::StateService, 3),
            (MessageKind::GetPower, 20),
            (MessageKind::SetPower, 21),
            (MessageKind::StatePower, 22),
            (MessageKind::GetLabel, 23),
            (MessageKind::SetLabel, 24),
            (MessageKind::StateLabel, 25),
            (MessageKind::GetVersion, 32),
            (MessageKind::StateVersion, 33),
            (MessageKind::Acknowledgement, 45),
            (MessageKind::LightGet, 101),
            (MessageKind::LightSetColor, 102),
            (MessageKind::LightState, 107),
            (MessageKind::LightGetPower, 116),
            (MessageKind::LightSetPower, 117),
            (MessageKind::LightStatePower, 118),
            (MessageKind::GetColorZones, 502),
            (MessageKind::StateZone, 503),
            (MessageKind::StateMultiZone, 506),
            (MessageKind::GetDeviceChain, 701),
            (MessageKind::StateDeviceChain, 702),
            (MessageKind::GetTileState64, 707),
            (MessageKind::StateTileState64, 711),
            (MessageKind::SetTileState64, 715),
        ];
        for (kind, code) in expected {
            assert_eq!(kind.code(), code);
            assert_eq!(MessageKind::from_code(code), Some(kind));
        }
    }

    #[test]
    fn test_registry_payload_sizes() {
        let size = |kind: MessageKind| descriptor(kind.code()).unwrap().payload_size;
        assert_eq!(size(MessageKind::GetService), 0);
        assert_eq!(size(MessageKind::StateService), 5);
        assert_eq!(size(MessageKind::SetLabel), 32);
        assert_eq!(size(MessageKind::LightSetColor), 13);
        assert_eq!(size(MessageKind::LightSetWaveform), 21);
        assert_eq!(size(MessageKind::LightState), 52);
        assert_eq!(size(MessageKind::SetColorZones), 15);
        assert_eq!(size(MessageKind::StateMultiZone), 66);
        assert_eq!(size(MessageKind::StateDeviceChain), 882);
        assert_eq!(size(MessageKind::StateTileState64), 517);
        assert_eq!(size(MessageKind::SetTileState64), 522);
    }

    #[test]
    fn test_registry_codes_unique() {
        for (i, a) in REGISTRY.iter().enumerate() {
            for b in &REGISTRY[i + 1..] {
                assert_ne!(a.code, b.code, "{} and {} share a code", a.name, b.name);
            }
        }
    }

    #[test]
    fn test_round_trips() {
        let color = Color::new(21845, 65535, 32768, 3500);
        let messages = vec![
            Message::GetService {},
            Message::StateService { service: 1, port: 56700 },
            Message::SetPower { power_level: 65535 },
            Message::StateLabel { label: Label::new("kitchen").unwrap() },
            Message::StateVersion { vendor: 1, product: 55, version: 0 },
            Message::StateHostFirmware { build: 1_500_000_000_000_000_000, reserved: 0, version: 0x0002_0050 },
            Message::StateHostInfo { signal: 1.5e-6, tx: 10, rx: 20, reserved: 0 },
            Message::StateGroup {
                group: [7; 16],
                label: Label::new("upstairs").unwrap(),
                updated_at: 99,
            },
            Message::LightSetColor { reserved: 0, color, duration: 1000 },
            Message::LightSetWaveform {
                reserved: 0,
                transient: 1,
                color,
                period: 500,
                cycles: 3.0,
                skew_ratio: -16384,
                waveform: Waveform::Pulse,
            },
            Message::LightState {
                color,
                reserved: 0,
                power_level: 65535,
                label: Label::new("desk").unwrap(),
                reserved2: 0,
            },
            Message::SetColorZones {
                start_index: 0,
                end_index: 7,
                color,
                duration: 0,
                apply: ApplyRequest::NoApply,
            },
            Message::StateMultiZone { count: 22, index: 8, colors: [color; 8] },
            Message::StateTileState64 {
                tile_index: 3,
                reserved: 0,
                x: 0,
                y: 0,
                width: 8,
                colors: [color; 64],
            },
            Message::StateDeviceChain {
                start_index: 0,
                tile_devices: [TileDevice { width: 8, height: 8, ..Default::default() }; 16],
                total_count: 5,
            },
        ];

        for message in messages {
            assert_eq!(round_trip(&message), message);
        }
    }

    #[test]
    fn test_every_registered_type_round_trips() {
        for row in REGISTRY {
            // Values 0..=2 are valid for every enum field and never form a NaN
            let payload: Vec<u8> = (0..row.payload_size).map(|i| (i % 3) as u8).collect();
            let message = Message::decode(row.code, &payload)
                .unwrap_or_else(|e| panic!("{} failed to decode: {e}", row.name));
            assert_eq!(message.kind(), Some(row.kind));
            assert_eq!(message.name(), row.name);

            let mut buf = BytesMut::new();
            message.encode_payload(&mut buf);
            assert_eq!(&buf[..], &payload[..], "{} payload bytes differ", row.name);
            assert_eq!(Message::decode(row.code, &buf).unwrap(), message);
        }
    }

    #[test]
    fn test_state_label_from_bytes() {
        let mut payload = [0u8; 32];
        payload[..7].copy_from_slice(b"kitchen");
        let message = Message::decode(25, &payload).unwrap();
        match message {
            Message::StateLabel { label } => assert_eq!(label.as_str(), "kitchen"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_opaque() {
        let message = Message::decode(9999, &[1, 2, 3]).unwrap();
        assert_eq!(message.message_type(), 9999);
        assert_eq!(message.kind(), None);
        assert_eq!(message.name(), "Unknown(9999)");
        assert_eq!(round_trip(&message), message);
    }

    #[test]
    fn test_short_payload_is_malformed() {
        let err = Message::decode(MessageKind::StatePower.code(), &[1]).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn test_validate_rejects_out_of_range_fields() {
        assert!(Message::SetPower { power_level: 65535 }.validate().is_ok());
        assert!(matches!(
            Message::SetPower { power_level: 1234 }.validate(),
            Err(Error::InvalidFieldValue { field: "power_level", .. })
        ));
        let cold = Color::new(0, 0, 65535, 12000);
        assert!(Message::LightSetColor { reserved: 0, color: cold, duration: 0 }
            .validate()
            .is_err());
        let mut colors = [Color::new(0, 0, 0, 3500); 64];
        colors[63] = cold;
        let tile = Message::SetTileState64 {
            tile_index: 0,
            length: 1,
            reserved: 0,
            x: 0,
            y: 0,
            width: 8,
            duration: 0,
            colors,
        };
        assert!(matches!(
            tile.validate(),
            Err(Error::InvalidFieldValue { field: "kelvin", .. })
        ));
        assert!(Message::GetLabel {}.validate().is_ok());
    }

    #[test]
    fn test_longer_payload_accepted() {
        let message = Message::decode(MessageKind::StatePower.code(), &[0xff, 0xff, 0xaa]).unwrap();
        assert_eq!(message, Message::StatePower { power_level: 65535 });
    }
}
