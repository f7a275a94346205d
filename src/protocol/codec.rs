use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::Message;
use crate::core::{Error, MacAddr, Result, SourceId, PROTOCOL_NUMBER};

/// Fixed header length in bytes
pub const HEADER_SIZE: usize = 36;

const ORIGIN_SHIFT: u16 = 14;
const TAGGED_BIT: u16 = 1 << 13;
const ADDRESSABLE_BIT: u16 = 1 << 12;
const PROTOCOL_MASK: u16 = 0x0fff;

const ACK_REQUIRED_BIT: u8 = 0b10;
const RES_REQUIRED_BIT: u8 = 0b01;

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total frame length, header included
    pub size: u16,
    /// Two-bit message origin, always 0 on frames we send
    pub origin: u8,
    /// Set when the frame targets every device
    pub tagged: bool,
    pub addressable: bool,
    /// 12-bit protocol number
    pub protocol: u16,
    pub source: SourceId,
    pub target: MacAddr,
    pub ack_required: bool,
    pub res_required: bool,
    /// Advisory; replies are correlated by source, target and type
    pub sequence: u8,
    pub message_type: u16,
}

/// Which reply an outgoing request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyMode {
    /// Neither acknowledgement nor response
    FireAndForget,
    /// Acknowledgement only
    Ack,
    /// State response only
    Response,
}

impl ReplyMode {
    fn flags(self) -> (bool, bool) {
        match self {
            ReplyMode::FireAndForget => (false, false),
            ReplyMode::Ack => (true, false),
            ReplyMode::Response => (false, true),
        }
    }
}

/// One complete wire message
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: Header,
    pub message: Message,
}

impl Frame {
    /// Builds an outgoing request with a consistent header
    pub fn request(
        source: SourceId,
        target: MacAddr,
        sequence: u8,
        mode: ReplyMode,
        message: Message,
    ) -> Self {
        let (ack_required, res_required) = mode.flags();
        let size = (HEADER_SIZE + message.payload_len()).min(usize::from(u16::MAX)) as u16;
        Frame {
            header: Header {
                size,
                origin: 0,
                tagged: target.is_broadcast(),
                addressable: true,
                protocol: PROTOCOL_NUMBER,
                source,
                target,
                ack_required,
                res_required,
                sequence,
                message_type: message.message_type(),
            },
            message,
        }
    }

    /// Total wire size (header + payload)
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.message.payload_len()
    }

    pub fn source(&self) -> SourceId {
        self.header.source
    }

    pub fn target(&self) -> MacAddr {
        self.header.target
    }
}

/// Encode a frame into the wire format
///
/// Size, tagged flag and message type are derived from the frame contents
/// rather than trusted from the header.
///
/// Wire format (little-endian):
/// ```text
/// ┌──────┬───────┬────────┬────────────┬──────────┬───────┬─────┬──────────┬──────┬──────────┬─────────┐
/// │ size │ flags │ source │ target     │ reserved │ resp  │ seq │ reserved │ type │ reserved │ payload │
/// │ 2B   │ 2B    │ 4B     │ 6B mac+2B  │ 6B       │ 1B    │ 1B  │ 8B       │ 2B   │ 2B       │         │
/// └──────┴───────┴────────┴────────────┴──────────┴───────┴─────┴──────────┴──────┴──────────┴─────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let header = &frame.header;
    let total = frame.wire_size();
    if total > usize::from(u16::MAX) {
        return Err(Error::PayloadTooLong {
            field: "payload",
            len: total - HEADER_SIZE,
            max: usize::from(u16::MAX) - HEADER_SIZE,
        });
    }

    let mut flags = (u16::from(header.origin & 0b11) << ORIGIN_SHIFT) | (header.protocol & PROTOCOL_MASK);
    if frame.target().is_broadcast() {
        flags |= TAGGED_BIT;
    }
    if header.addressable {
        flags |= ADDRESSABLE_BIT;
    }
    let mut response = 0u8;
    if header.ack_required {
        response |= ACK_REQUIRED_BIT;
    }
    if header.res_required {
        response |= RES_REQUIRED_BIT;
    }

    dst.reserve(total);
    dst.put_u16_le(total as u16);
    dst.put_u16_le(flags);
    dst.put_u32_le(header.source.0);
    dst.put_slice(&header.target.octets());
    dst.put_bytes(0, 2);
    dst.put_bytes(0, 6);
    dst.put_u8(response);
    dst.put_u8(header.sequence);
    dst.put_bytes(0, 8);
    dst.put_u16_le(frame.message.message_type());
    dst.put_bytes(0, 2);
    frame.message.encode_payload(dst);
    Ok(())
}

/// Decode the fixed header at the start of `src`
pub fn decode_header(src: &[u8]) -> Result<Header> {
    if src.len() < HEADER_SIZE {
        return Err(Error::malformed(format!(
            "{} bytes is shorter than the {HEADER_SIZE}-byte header",
            src.len()
        )));
    }

    let mut buf = &src[..HEADER_SIZE];
    let size = buf.get_u16_le();
    let flags = buf.get_u16_le();
    let source = SourceId(buf.get_u32_le());
    let mut octets = [0u8; 6];
    buf.copy_to_slice(&mut octets);
    buf.advance(2 + 6);
    let response = buf.get_u8();
    let sequence = buf.get_u8();
    buf.advance(8);
    let message_type = buf.get_u16_le();

    Ok(Header {
        size,
        origin: (flags >> ORIGIN_SHIFT) as u8,
        tagged: flags & TAGGED_BIT != 0,
        addressable: flags & ADDRESSABLE_BIT != 0,
        protocol: flags & PROTOCOL_MASK,
        source,
        target: MacAddr(octets),
        ack_required: response & ACK_REQUIRED_BIT != 0,
        res_required: response & RES_REQUIRED_BIT != 0,
        sequence,
        message_type,
    })
}

/// Decode one datagram into a frame
///
/// Bytes past the header's size field are ignored.
pub fn decode_frame(datagram: &[u8]) -> Result<Frame> {
    let header = decode_header(datagram)?;
    let size = usize::from(header.size);
    if size < HEADER_SIZE || size > datagram.len() {
        return Err(Error::malformed(format!(
            "size field {size} does not fit a {}-byte datagram",
            datagram.len()
        )));
    }

    let message = Message::decode(header.message_type, &datagram[HEADER_SIZE..size])?;
    Ok(Frame { header, message })
}

/// Frame codec for byte streams, delimited by the header's size field
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Creates a new frame codec
    pub fn new() -> Self {
        FrameCodec
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let size = usize::from(u16::from_le_bytes([src[0], src[1]]));
        if size < HEADER_SIZE {
            return Err(Error::malformed(format!("size field {size} is below the header size")));
        }
        if src.len() < size {
            return Ok(None);
        }

        let bytes = src.split_to(size);
        decode_frame(&bytes).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&item, dst)
    }
}

impl Encoder<&Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: &Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame(item, dst)
    }
}
