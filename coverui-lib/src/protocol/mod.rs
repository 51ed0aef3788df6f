pub mod om;
pub mod yf;

use itertools::Itertools;
use std::fmt::Debug;
use thiserror::Error;

pub use anyhow::Result;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame does not start with 55 AA")]
    BadHeader,
    #[error("checksum mismatch: expected {expected:02X}, got {actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
    #[error("crc mismatch: expected {expected:04X}, got {actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),
    #[error("{0} unexpected bytes after frame")]
    TrailingBytes(usize),
    #[error("payload too large ({0} bytes)")]
    PayloadTooLarge(usize),
    #[error("invalid cobs encoding")]
    BadCobs,
    #[error("link closed by peer")]
    Disconnected,
    #[error("timed out")]
    TimedOut,
}

/// Outcome of looking for a frame at the front of a receive buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Scan<F> {
    /// Leading bytes that can never start a frame.
    Skip(usize),
    /// A candidate is forming, more bytes are needed.
    Incomplete,
    /// The candidate failed validation, drop `consumed` bytes and retry.
    Invalid {
        error: ProtocolError,
        consumed: usize,
    },
    Frame { frame: F, consumed: usize },
}

/// Wire format of one serial link.
pub trait FrameCodec: Send {
    type Frame: Clone + Debug + Send;

    fn scan(&self, buf: &[u8]) -> Scan<Self::Frame>;
    fn to_wire(&self, frame: &Self::Frame) -> Vec<u8>;

    /// Total length of the frame starting at `buf`, once its header says so.
    fn frame_len(&self, _buf: &[u8]) -> Option<usize> {
        None
    }
}

/// Space separated upper case hex, the form frames are logged in.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).join(" ")
}
