use bytes::{Buf, BufMut, Bytes, BytesMut};
use isn_layer::Tick;
use serde::{Deserialize, Serialize};

use crate::crc::{crc16, crc8};
use crate::error::{FrameError, Result};

/// Default frame delimiter.
pub const DEFAULT_DELIMITER: u8 = 0xA5;

/// Largest body (tag + payload) a short frame can carry.
pub const SHORT_MAX_SIZE: usize = 64;

/// Largest body a compact frame can carry.
pub const COMPACT_SIZE_CEILING: usize = 65536;

/// Default compact body limit.
pub const DEFAULT_MAX_SIZE: usize = 4096;

/// Longest length field (compact mode with two continuation bytes).
pub const MAX_LENGTH_FIELD: usize = 3;

const COMPACT_FLAG: u8 = 0x80;
const MORE_FLAG: u8 = 0x40;
const LOW_BITS: u8 = 0x3F;

/// Length field encoding, fixed per frame layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameMode {
    /// One length byte `0b00nnnnnn`, CRC-8 trailer.
    Short,
    /// Variable length field `0b1Mnnnnnn` plus LEB128 continuation, CRC-16
    /// trailer.
    #[default]
    Compact,
}

impl FrameMode {
    pub fn size_ceiling(self) -> usize {
        match self {
            FrameMode::Short => SHORT_MAX_SIZE,
            FrameMode::Compact => COMPACT_SIZE_CEILING,
        }
    }

    pub fn checksum_size(self) -> usize {
        match self {
            FrameMode::Short => 1,
            FrameMode::Compact => 2,
        }
    }

    /// Bytes a frame adds around a body of `body_len` bytes.
    pub fn overhead(self, body_len: usize) -> usize {
        1 + length_field_size(self, body_len) + 1 + self.checksum_size()
    }
}

fn length_field_size(mode: FrameMode, body_len: usize) -> usize {
    match mode {
        FrameMode::Short => 1,
        FrameMode::Compact => {
            let mut rest = body_len.saturating_sub(1) >> 6;
            let mut size = 1;
            while rest > 0 {
                rest >>= 7;
                size += 1;
            }
            size
        }
    }
}

/// Frame layer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub mode: FrameMode,
    pub delimiter: u8,
    /// Largest body (tag + payload) accepted in either direction.
    pub max_size: usize,
    /// A partial frame older than this many ticks is discarded.
    pub rx_timeout: Tick,
    /// Ticks to wait for an acknowledgement before retransmitting.
    pub ack_timeout: Tick,
    /// Retransmissions before a confirmed packet is dropped.
    pub max_retries: u8,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            mode: FrameMode::Compact,
            delimiter: DEFAULT_DELIMITER,
            max_size: DEFAULT_MAX_SIZE,
            rx_timeout: 100,
            ack_timeout: 50,
            max_retries: 3,
        }
    }
}

impl FrameConfig {
    /// Short mode at its full size.
    pub fn short() -> Self {
        Self {
            mode: FrameMode::Short,
            max_size: SHORT_MAX_SIZE,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ceiling = self.mode.size_ceiling();
        if self.max_size < crate::layer::MIN_FRAME_SIZE || self.max_size > ceiling {
            return Err(FrameError::InvalidConfig {
                reason: format!(
                    "max_size must be {}..={ceiling} in {:?} mode, got {}",
                    crate::layer::MIN_FRAME_SIZE,
                    self.mode,
                    self.max_size
                ),
            });
        }
        if self.ack_timeout == 0 {
            return Err(FrameError::InvalidConfig {
                reason: "ack_timeout must be positive".into(),
            });
        }
        Ok(())
    }
}

/// A decoded frame body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Protocol tag, the first byte of the body.
    pub protocol: u8,
    /// Everything after the tag.
    pub payload: Bytes,
    body: Bytes,
}

impl Packet {
    pub fn new(protocol: u8, payload: &[u8]) -> Self {
        let mut body = BytesMut::with_capacity(1 + payload.len());
        body.put_u8(protocol);
        body.put_slice(payload);
        let body = body.freeze();
        Self {
            protocol,
            payload: body.slice(1..),
            body,
        }
    }

    /// Split a body into tag and payload. Empty bodies are not packets.
    pub fn from_body(body: Bytes) -> Option<Self> {
        let protocol = *body.first()?;
        Some(Self {
            protocol,
            payload: body.slice(1..),
            body,
        })
    }

    /// Tag followed by payload, as handed to the parent layer.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// One unit produced by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Packet(Packet),
    /// Bytes seen outside of any frame.
    Stray(Bytes),
}

/// Stateless frame encoder/decoder.
///
/// Wire format:
/// ```text
/// ┌───────────┬──────────────┬───────┬─────┬───────────┬──────────┐
/// │ Delimiter │ Length field │ Check │ Tag │ Payload   │ Checksum │
/// │ (1B)      │ (1-3B)       │ (1B)  │(1B) │           │ (1-2B)   │
/// └───────────┴──────────────┴───────┴─────┴───────────┴──────────┘
/// ```
///
/// The length field stores `body length - 1`. Check is a CRC-8 of the length
/// field. The checksum covers everything between the delimiter and itself;
/// CRC-16 values are big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    mode: FrameMode,
    delimiter: u8,
    max_size: usize,
}

impl FrameCodec {
    pub fn new(mode: FrameMode, delimiter: u8, max_size: usize) -> Self {
        Self {
            mode,
            delimiter,
            max_size: max_size.min(mode.size_ceiling()),
        }
    }

    pub fn from_config(config: &FrameConfig) -> Self {
        Self::new(config.mode, config.delimiter, config.max_size)
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Encode one body (tag + payload) into `dst`.
    pub fn encode(&self, body: &[u8], dst: &mut BytesMut) -> Result<()> {
        if body.is_empty() {
            return Err(FrameError::EmptyBody);
        }
        if body.len() > self.max_size {
            return Err(FrameError::PayloadTooLarge {
                size: body.len(),
                max: self.max_size,
            });
        }
        dst.reserve(body.len() + self.mode.overhead(body.len()));
        dst.put_u8(self.delimiter);
        let start = dst.len();

        let n = body.len() - 1;
        match self.mode {
            FrameMode::Short => dst.put_u8(n as u8),
            FrameMode::Compact => {
                let mut rest = n >> 6;
                let more = if rest > 0 { MORE_FLAG } else { 0 };
                dst.put_u8(COMPACT_FLAG | more | (n as u8 & LOW_BITS));
                while rest > 0 {
                    let mut byte = (rest & 0x7F) as u8;
                    rest >>= 7;
                    if rest > 0 {
                        byte |= 0x80;
                    }
                    dst.put_u8(byte);
                }
            }
        }
        let check = crc8(&dst[start..]);
        dst.put_u8(check);
        dst.put_slice(body);

        match self.mode {
            FrameMode::Short => {
                let crc = crc8(&dst[start..]);
                dst.put_u8(crc);
            }
            FrameMode::Compact => {
                let crc = crc16(&dst[start..]);
                dst.put_u16(crc);
            }
        }
        Ok(())
    }

    /// Encode a tag and payload into `dst`.
    pub fn encode_packet(&self, protocol: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        let mut body = Vec::with_capacity(1 + payload.len());
        body.push(protocol);
        body.extend_from_slice(payload);
        self.encode(&body, dst)
    }

    /// Parse the length field at the start of `src`.
    ///
    /// Returns the body length and the size of the field, or `None` if more
    /// bytes are needed.
    fn parse_length(&self, src: &[u8]) -> Result<Option<(usize, usize)>> {
        let Some(&first) = src.first() else {
            return Ok(None);
        };
        let (n, field) = match self.mode {
            FrameMode::Short => {
                if first & !LOW_BITS != 0 {
                    return Err(FrameError::MalformedLength { byte: first });
                }
                (usize::from(first), 1)
            }
            FrameMode::Compact => {
                if first & COMPACT_FLAG == 0 {
                    return Err(FrameError::MalformedLength { byte: first });
                }
                let mut n = usize::from(first & LOW_BITS);
                let mut field = 1;
                let mut more = first & MORE_FLAG != 0;
                let mut shift = 6;
                while more {
                    if field == MAX_LENGTH_FIELD {
                        return Err(FrameError::MalformedLength { byte: src[field - 1] });
                    }
                    let Some(&byte) = src.get(field) else {
                        return Ok(None);
                    };
                    n |= usize::from(byte & 0x7F) << shift;
                    shift += 7;
                    field += 1;
                    more = byte & 0x80 != 0;
                }
                (n, field)
            }
        };
        let len = n + 1;
        if len > self.max_size {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.max_size,
            });
        }
        Ok(Some((len, field)))
    }

    /// Decode the next unit from `src`.
    ///
    /// Returns `Ok(None)` when `src` holds only part of a frame. On success
    /// the unit's bytes are consumed. On error the bad frame is discarded up
    /// to the next delimiter, so decoding can simply continue.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Decoded>> {
        let Some(&first) = src.first() else {
            return Ok(None);
        };
        if first != self.delimiter {
            let end = self.next_delimiter(src, 0);
            return Ok(Some(Decoded::Stray(src.split_to(end).freeze())));
        }
        match self.decode_frame(src) {
            Ok(decoded) => Ok(decoded),
            Err(err) => {
                self.resync(src);
                Err(err)
            }
        }
    }

    fn decode_frame(&self, src: &mut BytesMut) -> Result<Option<Decoded>> {
        let Some((len, field)) = self.parse_length(&src[1..])? else {
            return Ok(None);
        };
        let check_at = 1 + field;
        let Some(&found) = src.get(check_at) else {
            return Ok(None);
        };
        let expected = crc8(&src[1..check_at]);
        if found != expected {
            return Err(FrameError::LengthCheck { expected, found });
        }

        let body_start = check_at + 1;
        let body_end = body_start + len;
        let total = body_end + self.mode.checksum_size();
        if src.len() < total {
            return Ok(None);
        }
        let (expected, found) = match self.mode {
            FrameMode::Short => (
                u16::from(crc8(&src[1..body_end])),
                u16::from(src[body_end]),
            ),
            FrameMode::Compact => (
                crc16(&src[1..body_end]),
                u16::from_be_bytes([src[body_end], src[body_end + 1]]),
            ),
        };
        if expected != found {
            return Err(FrameError::ChecksumMismatch { expected, found });
        }

        let frame = src.split_to(total).freeze();
        let body = frame.slice(body_start..body_end);
        Ok(Packet::from_body(body).map(Decoded::Packet))
    }

    fn next_delimiter(&self, src: &[u8], from: usize) -> usize {
        src[from..]
            .iter()
            .position(|&b| b == self.delimiter)
            .map_or(src.len(), |p| p + from)
    }

    /// Drop the frame at the head of `src` up to the next delimiter.
    /// Returns the number of bytes discarded.
    pub fn resync(&self, src: &mut BytesMut) -> usize {
        if src.is_empty() {
            return 0;
        }
        let end = self.next_delimiter(src, 1);
        src.advance(end);
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short() -> FrameCodec {
        FrameCodec::new(FrameMode::Short, DEFAULT_DELIMITER, SHORT_MAX_SIZE)
    }

    fn compact() -> FrameCodec {
        FrameCodec::new(FrameMode::Compact, DEFAULT_DELIMITER, COMPACT_SIZE_CEILING)
    }

    fn decode_one(codec: &FrameCodec, bytes: &[u8]) -> Result<Option<Decoded>> {
        let mut buf = BytesMut::from(bytes);
        codec.decode(&mut buf)
    }

    #[test]
    fn short_known_encoding() {
        let mut buf = BytesMut::new();
        short().encode(&[0x7F, 0x01, 0x02], &mut buf).unwrap();
        assert_eq!(&buf[..], &[0xA5, 0x02, 0x9A, 0x7F, 0x01, 0x02, 0x2D]);
    }

    #[test]
    fn compact_known_encoding() {
        let mut buf = BytesMut::new();
        compact().encode(&[0x7F, 0x01, 0x02], &mut buf).unwrap();
        assert_eq!(&buf[..], &[0xA5, 0x82, 0xE6, 0x7F, 0x01, 0x02, 0x33, 0x66]);
    }

    #[test]
    fn compact_continuation_bytes() {
        let codec = compact();
        let mut body = vec![0x7F];
        body.resize(200, 0);
        let mut buf = BytesMut::new();
        codec.encode(&body, &mut buf).unwrap();
        assert_eq!(&buf[..4], &[0xA5, 0xC7, 0x03, 0x01]);
        assert_eq!(buf.len(), 206);
        assert_eq!(buf.len(), body.len() + FrameMode::Compact.overhead(body.len()));

        let Decoded::Packet(packet) = codec.decode(&mut buf).unwrap().unwrap() else {
            panic!("expected packet");
        };
        assert_eq!(packet.body().as_ref(), &body[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn compact_ceiling_uses_three_byte_field() {
        let codec = compact();
        let body = vec![0x7F; COMPACT_SIZE_CEILING];
        let mut buf = BytesMut::new();
        codec.encode(&body, &mut buf).unwrap();
        assert_eq!(&buf[..5], &[0xA5, 0xFF, 0xFF, 0x07, 0xA7]);

        let oversized = vec![0x7F; COMPACT_SIZE_CEILING + 1];
        assert!(matches!(
            codec.encode(&oversized, &mut BytesMut::new()),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn short_rejects_oversized() {
        let body = [0u8; SHORT_MAX_SIZE + 1];
        assert!(matches!(
            short().encode(&body, &mut BytesMut::new()),
            Err(FrameError::PayloadTooLarge { size: 65, max: 64 })
        ));
        assert!(short().encode(&body[..64], &mut BytesMut::new()).is_ok());
    }

    #[test]
    fn empty_body_rejected() {
        assert!(matches!(
            short().encode(&[], &mut BytesMut::new()),
            Err(FrameError::EmptyBody)
        ));
    }

    #[test]
    fn partial_frame_needs_more() {
        let codec = short();
        let mut wire = BytesMut::new();
        codec.encode_packet(0x7F, &[1, 2, 3], &mut wire).unwrap();
        for cut in 0..wire.len() {
            let mut partial = BytesMut::from(&wire[..cut]);
            assert_eq!(codec.decode(&mut partial).unwrap(), None, "cut at {cut}");
            assert_eq!(partial.len(), cut);
        }
    }

    #[test]
    fn stray_bytes_before_frame() {
        let codec = short();
        let mut buf = BytesMut::from(&b"hi\n"[..]);
        codec.encode_packet(0x00, &[], &mut buf).unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Decoded::Stray(Bytes::from_static(b"hi\n")))
        );
        let Some(Decoded::Packet(packet)) = codec.decode(&mut buf).unwrap() else {
            panic!("expected packet");
        };
        assert_eq!(packet.protocol, 0x00);
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn checksum_mismatch_resyncs() {
        let codec = short();
        let mut wire = BytesMut::new();
        codec.encode(&[0x7F, 0x01, 0x02], &mut wire).unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        codec.encode(&[0x00], &mut wire).unwrap();

        assert!(matches!(
            codec.decode(&mut wire),
            Err(FrameError::ChecksumMismatch { .. })
        ));
        // The next frame is intact.
        let Some(Decoded::Packet(packet)) = codec.decode(&mut wire).unwrap() else {
            panic!("expected packet");
        };
        assert_eq!(packet.protocol, 0x00);
    }

    #[test]
    fn corrupted_length_is_detected() {
        let codec = short();
        let mut wire = BytesMut::new();
        codec.encode(&[0x7F, 0x01, 0x02], &mut wire).unwrap();
        wire[1] = 0x01;
        assert!(matches!(
            decode_one(&codec, &wire),
            Err(FrameError::LengthCheck { .. })
        ));
    }

    #[test]
    fn mode_mismatch_is_malformed() {
        let mut wire = BytesMut::new();
        compact().encode(&[0x7F], &mut wire).unwrap();
        assert!(matches!(
            decode_one(&short(), &wire),
            Err(FrameError::MalformedLength { byte: 0x80 })
        ));

        let mut wire = BytesMut::new();
        short().encode(&[0x7F], &mut wire).unwrap();
        assert!(matches!(
            decode_one(&compact(), &wire),
            Err(FrameError::MalformedLength { byte: 0x00 })
        ));
    }

    #[test]
    fn too_many_continuation_bytes() {
        let wire = [0xA5, 0xC0, 0x80, 0x80, 0x00];
        assert!(matches!(
            decode_one(&compact(), &wire),
            Err(FrameError::MalformedLength { .. })
        ));
    }

    #[test]
    fn decoder_enforces_max_size() {
        let small = FrameCodec::new(FrameMode::Compact, DEFAULT_DELIMITER, 16);
        let mut wire = BytesMut::new();
        compact().encode(&[0u8; 17], &mut wire).unwrap();
        assert!(matches!(
            small.decode(&mut wire),
            Err(FrameError::PayloadTooLarge { size: 17, max: 16 })
        ));
    }

    #[test]
    fn custom_delimiter() {
        let codec = FrameCodec::new(FrameMode::Short, 0x7E, SHORT_MAX_SIZE);
        let mut wire = BytesMut::new();
        codec.encode(&[0x01, 0xA5], &mut wire).unwrap();
        assert_eq!(wire[0], 0x7E);
        // A default-delimiter decoder sees only stray bytes up to its own
        // delimiter.
        let Some(Decoded::Stray(stray)) = short().decode(&mut wire.clone()).unwrap() else {
            panic!("expected stray bytes");
        };
        assert_eq!(stray.as_ref(), &wire[..4]);
    }

    #[test]
    fn config_validation() {
        assert!(FrameConfig::default().validate().is_ok());
        assert!(FrameConfig::short().validate().is_ok());
        let config = FrameConfig {
            max_size: 65,
            ..FrameConfig::short()
        };
        assert!(matches!(
            config.validate(),
            Err(FrameError::InvalidConfig { .. })
        ));
        let config = FrameConfig {
            ack_timeout: 0,
            ..FrameConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
