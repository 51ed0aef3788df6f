//! Checksum-trailer framing spoken between the Cover UI and the mainboard:
//! `55 AA LEN <LEN payload bytes> CKS`, where `CKS` is the byte-wise sum of
//! everything before it, modulo 256.

use std::fmt;

use super::{hex_dump, FrameCodec, ProtocolError, Scan};

pub const HEADER: [u8; 2] = [0x55, 0xAA];
/// Header, length byte and checksum.
pub const OVERHEAD: usize = 4;
pub const MIN_FRAME_LEN: usize = OVERHEAD;
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Offset of the first payload byte.
pub const PAYLOAD_OFFSET: usize = 3;

pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |x, &y| x.overflowing_add(y).0)
}

/// Message families told apart by the first two payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    ReleaseAck,
    Status,
    Ping,
    ButtonReport,
    LedStatus,
    Other(u8, u8),
}

impl Kind {
    pub fn from_bytes(kind: u8, sub: u8) -> Self {
        match (kind, sub) {
            (0x50, 0x00) => Kind::ReleaseAck,
            (0x50, 0x84) => Kind::Status,
            (0x40, 0x01) => Kind::Ping,
            (0x50, 0x62) => Kind::ButtonReport,
            (0x50, 0x8E) => Kind::LedStatus,
            (kind, sub) => Kind::Other(kind, sub),
        }
    }
}

/// A complete, checksum-valid frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    raw: Vec<u8>,
}

impl Frame {
    pub fn new(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Frame {
            raw: encode(payload)?,
        })
    }

    /// Validates one exact frame.
    pub fn from_wire(raw: &[u8]) -> Result<Self, ProtocolError> {
        match try_parse(raw)? {
            Some(frame) if frame.len() == raw.len() => Ok(frame),
            Some(frame) => Err(ProtocolError::TrailingBytes(raw.len() - frame.len())),
            None => Err(ProtocolError::TooShort(raw.len())),
        }
    }

    /// Takes a template whose checksum is stale and fixes the checksum.
    pub fn with_checksum(mut raw: Vec<u8>) -> Result<Self, ProtocolError> {
        if raw.len() < MIN_FRAME_LEN {
            return Err(ProtocolError::TooShort(raw.len()));
        }
        if raw[..2] != HEADER {
            return Err(ProtocolError::BadHeader);
        }
        let frame_len = raw[2] as usize + OVERHEAD;
        if raw.len() < frame_len {
            return Err(ProtocolError::TooShort(raw.len()));
        }
        if raw.len() > frame_len {
            return Err(ProtocolError::TrailingBytes(raw.len() - frame_len));
        }
        update_checksum(&mut raw);
        Ok(Frame { raw })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.raw[PAYLOAD_OFFSET..self.raw.len() - 1]
    }

    pub fn kind(&self) -> Option<Kind> {
        match self.payload() {
            [kind, sub, ..] => Some(Kind::from_bytes(*kind, *sub)),
            _ => None,
        }
    }

    pub fn is(&self, kind: Kind) -> bool {
        self.kind() == Some(kind)
    }

    /// Overwrites one byte inside the payload area. Offsets address the whole
    /// frame; header, length and checksum bytes are left alone.
    pub fn patch(&mut self, offset: usize, value: u8) -> bool {
        if offset < PAYLOAD_OFFSET || offset + 1 >= self.raw.len() {
            return false;
        }
        self.raw[offset] = value;
        true
    }

    pub fn update_checksum(&mut self) {
        update_checksum(&mut self.raw);
    }

    pub fn checksum_valid(&self) -> bool {
        match self.raw.split_last() {
            Some((&cks, rest)) => checksum(rest) == cks,
            None => false,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame[{}]", hex_dump(&self.raw))
    }
}

/// Parses a frame at the start of `buf`.
///
/// `Ok(None)` means more bytes are needed. Trailing bytes past the frame are
/// ignored.
pub fn try_parse(buf: &[u8]) -> Result<Option<Frame>, ProtocolError> {
    if buf.len() >= 2 && buf[..2] != HEADER {
        return Err(ProtocolError::BadHeader);
    }
    if buf.len() < MIN_FRAME_LEN {
        return Ok(None);
    }

    let frame_len = buf[2] as usize + OVERHEAD;
    if buf.len() < frame_len {
        return Ok(None);
    }

    let expected = checksum(&buf[..frame_len - 1]);
    let actual = buf[frame_len - 1];
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }

    Ok(Some(Frame {
        raw: buf[..frame_len].to_vec(),
    }))
}

pub fn encode(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge(payload.len()));
    }

    let mut raw = Vec::with_capacity(payload.len() + OVERHEAD);
    raw.extend_from_slice(&HEADER);
    raw.push(payload.len() as u8);
    raw.extend_from_slice(payload);
    raw.push(checksum(&raw));
    Ok(raw)
}

/// Returns the payload of one exact, valid frame.
pub fn decode(raw: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    Frame::from_wire(raw).map(|frame| frame.payload().to_vec())
}

pub fn update_checksum(raw: &mut [u8]) {
    if let Some((cks, rest)) = raw.split_last_mut() {
        *cks = checksum(rest);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumCodec;

impl FrameCodec for ChecksumCodec {
    type Frame = Frame;

    fn scan(&self, buf: &[u8]) -> Scan<Frame> {
        if buf.is_empty() {
            return Scan::Incomplete;
        }

        if buf[0] != HEADER[0] {
            let noise = buf
                .iter()
                .position(|&b| b == HEADER[0])
                .unwrap_or(buf.len());
            return Scan::Skip(noise);
        }

        if buf.len() >= 2 && buf[1] != HEADER[1] {
            return Scan::Skip(1);
        }

        match try_parse(buf) {
            Ok(Some(frame)) => {
                let consumed = frame.len();
                Scan::Frame { frame, consumed }
            }
            Ok(None) => Scan::Incomplete,
            Err(error) => Scan::Invalid { error, consumed: 1 },
        }
    }

    fn to_wire(&self, frame: &Frame) -> Vec<u8> {
        frame.as_bytes().to_vec()
    }

    fn frame_len(&self, buf: &[u8]) -> Option<usize> {
        match buf {
            [0x55, 0xAA, len, ..] => Some(*len as usize + OVERHEAD),
            _ => None,
        }
    }
}

/// Whether `buf` can still grow into an LED status frame.
pub fn led_status_prefix(buf: &[u8]) -> bool {
    const LED_STATUS: [u8; 2] = [0x50, 0x8E];

    if buf.len() < HEADER.len() {
        return *buf == HEADER[..buf.len()];
    }
    if buf[..2] != HEADER {
        return false;
    }
    let kind = buf.get(PAYLOAD_OFFSET..).unwrap_or(&[]);
    let n = kind.len().min(LED_STATUS.len());
    kind[..n] == LED_STATUS[..n]
        && buf
            .get(2)
            .map_or(true, |&len| buf.len() < len as usize + OVERHEAD)
}
