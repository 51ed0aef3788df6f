use log::{debug, warn};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::protocol::{hex_dump, FrameCodec, ProtocolError, Result, Scan};

pub const DEFAULT_CAPACITY: usize = 128;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// A unit of received traffic, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<F> {
    /// Bytes that are not part of a valid frame.
    Raw(Vec<u8>),
    Frame(F),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub frames: u64,
    pub invalid: u64,
    pub overflows: u64,
}

/// Bounded receive buffer cutting a byte stream into frames.
pub struct Reassembler<C: FrameCodec> {
    codec: C,
    deq: VecDeque<u8>,
    capacity: usize,
    ready: VecDeque<Token<C::Frame>>,
    stats: LinkStats,
}

impl<C: FrameCodec> Reassembler<C> {
    pub fn new(codec: C) -> Self {
        Self::with_capacity(codec, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(codec: C, capacity: usize) -> Self {
        Self {
            codec,
            deq: VecDeque::with_capacity(capacity),
            capacity,
            ready: VecDeque::new(),
            stats: LinkStats::default(),
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.deq.len()
    }

    /// Bytes of the incomplete candidate at the front of the buffer.
    pub fn held(&mut self) -> &[u8] {
        self.deq.make_contiguous()
    }

    pub fn clear(&mut self) {
        self.deq.clear();
        self.ready.clear();
    }

    /// Gives up on the pending candidate and hands its bytes out unframed.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.deq.is_empty() {
            return None;
        }
        debug!("flushing {} held bytes", self.deq.len());
        Some(self.deq.drain(..).collect())
    }

    pub fn on_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.deq.push_back(byte);
            if self.deq.len() < self.capacity {
                continue;
            }

            while let Some(token) = self.scan() {
                self.ready.push_back(token);
            }
            if self.deq.len() >= self.capacity {
                warn!(
                    "receive buffer overflow, passing on {} unframed bytes: {}",
                    self.deq.len(),
                    hex_dump(self.deq.make_contiguous())
                );
                self.stats.overflows += 1;
                let bytes = self.deq.drain(..).collect();
                self.ready.push_back(Token::Raw(bytes));
            }
        }
    }

    fn take(&mut self, n: usize) -> Vec<u8> {
        self.deq.drain(..n).collect()
    }

    fn scan(&mut self) -> Option<Token<C::Frame>> {
        let buf = self.deq.make_contiguous();
        match self.codec.scan(buf) {
            Scan::Incomplete => match self.codec.frame_len(buf) {
                Some(len) if len > self.capacity => {
                    debug!("frame of {} bytes cannot fit the receive buffer", len);
                    self.stats.invalid += 1;
                    Some(Token::Raw(self.take(1)))
                }
                _ => None,
            },
            Scan::Skip(n) => Some(Token::Raw(self.take(n))),
            Scan::Invalid { error, consumed } => {
                debug!("dropping invalid frame start: {}", error);
                self.stats.invalid += 1;
                Some(Token::Raw(self.take(consumed)))
            }
            Scan::Frame { frame, consumed } => {
                self.deq.drain(..consumed);
                self.stats.frames += 1;
                Some(Token::Frame(frame))
            }
        }
    }

    pub fn next_token(&mut self) -> Option<Token<C::Frame>> {
        self.ready.pop_front().or_else(|| self.scan())
    }

    /// Next valid frame; anything in front of it is discarded.
    pub fn next_frame(&mut self) -> Option<C::Frame> {
        while let Some(token) = self.next_token() {
            match token {
                Token::Frame(frame) => return Some(frame),
                Token::Raw(bytes) => debug!("skipped {}", hex_dump(&bytes)),
            }
        }
        None
    }

    pub fn drain_tokens(&mut self) -> Vec<Token<C::Frame>> {
        std::iter::from_fn(|| self.next_token()).collect()
    }
}

/// One UART: a byte port plus the reassembler for its receive direction.
pub struct SerialLink<T, C: FrameCodec> {
    port: T,
    rx: Reassembler<C>,
    read_timeout: Duration,
    buf: [u8; 256],
}

impl<T, C> SerialLink<T, C>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
    C: FrameCodec,
{
    pub fn new(port: T, codec: C) -> Self {
        Self::with_capacity(port, codec, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(port: T, codec: C, capacity: usize) -> Self {
        Self {
            port,
            rx: Reassembler::with_capacity(codec, capacity),
            read_timeout: DEFAULT_READ_TIMEOUT,
            buf: [0u8; 256],
        }
    }

    pub fn set_read_timeout(&mut self, read_timeout: Duration) {
        self.read_timeout = read_timeout;
    }

    pub fn rx(&mut self) -> &mut Reassembler<C> {
        &mut self.rx
    }

    pub fn stats(&self) -> LinkStats {
        self.rx.stats()
    }

    pub fn into_inner(self) -> T {
        self.port
    }

    pub fn on_bytes(&mut self, data: &[u8]) {
        self.rx.on_bytes(data)
    }

    pub fn next_frame(&mut self) -> Option<C::Frame> {
        self.rx.next_frame()
    }

    /// Waits up to the read timeout for bytes. `Ok(None)` on timeout.
    ///
    /// Cancel safe: nothing is consumed unless the read completes.
    pub async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match timeout(self.read_timeout, self.port.read(&mut self.buf)).await {
            Ok(Ok(0)) => Err(ProtocolError::Disconnected.into()),
            Ok(Ok(n)) => {
                debug!("read {} bytes: {:02x?}", n, &self.buf[..n]);
                Ok(Some(self.buf[..n].to_vec()))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }

    /// Next frame, reading from the port if none is buffered.
    /// `Ok(None)` when the read timeout passes without a complete frame.
    pub async fn recv_frame(&mut self) -> Result<Option<C::Frame>> {
        if let Some(frame) = self.rx.next_frame() {
            return Ok(Some(frame));
        }
        if let Some(chunk) = self.read_chunk().await? {
            self.rx.on_bytes(&chunk);
        }
        Ok(self.rx.next_frame())
    }

    pub async fn send(&mut self, frame: &C::Frame) -> Result<()> {
        let wire = self.rx.codec().to_wire(frame);
        self.send_raw(&wire).await
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        debug!("write: {:02X?}", bytes);
        self.port.write_all(bytes).await?;
        self.port.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::om::{self, CobsCodec, Message};
    use crate::protocol::yf::{self, ChecksumCodec, Frame};
    use tokio::io::duplex;

    const PING: [u8; 7] = [0x55, 0xAA, 0x03, 0x40, 0x01, 0x00, 0x43];

    #[test]
    fn frames_split_across_chunks() {
        let mut rx = Reassembler::new(ChecksumCodec);
        rx.on_bytes(&PING[..3]);
        assert_eq!(rx.next_frame(), None);
        rx.on_bytes(&PING[3..]);
        assert_eq!(rx.next_frame(), Some(Frame::from_wire(&PING).unwrap()));
        assert_eq!(rx.pending(), 0);
    }

    #[test]
    fn noise_before_frame_is_reported_raw() {
        let mut rx = Reassembler::new(ChecksumCodec);
        rx.on_bytes(&[0x00, 0xFF]);
        rx.on_bytes(&PING);

        assert_eq!(rx.next_token(), Some(Token::Raw(vec![0x00, 0xFF])));
        assert!(matches!(rx.next_token(), Some(Token::Frame(_))));
        assert_eq!(rx.next_token(), None);
    }

    #[test]
    fn bad_checksum_resyncs_one_byte_later() {
        let mut rx = Reassembler::new(ChecksumCodec);
        // two truncated headers in front of a valid frame
        rx.on_bytes(&[0x55, 0xAA, 0x03, 0x55, 0xAA, 0x03]);
        rx.on_bytes(&PING);

        assert_eq!(rx.next_frame(), Some(Frame::from_wire(&PING).unwrap()));
        assert_eq!(rx.stats().invalid, 2);
    }

    fn raw_bytes(tokens: Vec<Token<Frame>>) -> Vec<u8> {
        tokens
            .into_iter()
            .flat_map(|token| match token {
                Token::Raw(bytes) => bytes,
                Token::Frame(frame) => frame.into_bytes(),
            })
            .collect()
    }

    #[test]
    fn oversized_header_is_passed_on_and_recovers() {
        let mut rx = Reassembler::with_capacity(ChecksumCodec, 128);
        rx.on_bytes(&[0x55, 0xAA, 0xFF]);
        rx.on_bytes(&[0x11; 200]);

        let tokens = rx.drain_tokens();
        assert!(tokens.iter().all(|t| matches!(t, Token::Raw(_))));
        assert_eq!(raw_bytes(tokens).len(), 203);
        assert_eq!(rx.stats().overflows, 0);
        assert_eq!(rx.pending(), 0);

        rx.on_bytes(&PING);
        assert_eq!(rx.next_frame(), Some(Frame::from_wire(&PING).unwrap()));
    }

    #[test]
    fn large_frame_that_fits_is_kept_whole() {
        let mut rx = Reassembler::with_capacity(ChecksumCodec, 128);
        let wire = yf::encode(&[0x50; 120]).unwrap();
        rx.on_bytes(&wire[..60]);
        assert_eq!(rx.next_token(), None);
        rx.on_bytes(&wire[60..]);
        assert_eq!(rx.next_frame().map(Frame::into_bytes), Some(wire));
    }

    #[test]
    fn flush_hands_out_a_stalled_candidate() {
        let mut rx = Reassembler::new(ChecksumCodec);
        rx.on_bytes(&[0x55, 0xAA, 0x30, 0x01]);
        assert_eq!(rx.next_token(), None);
        assert_eq!(rx.held(), [0x55, 0xAA, 0x30, 0x01]);

        assert_eq!(rx.flush(), Some(vec![0x55, 0xAA, 0x30, 0x01]));
        assert_eq!(rx.flush(), None);
        rx.on_bytes(&PING);
        assert_eq!(rx.next_frame(), Some(Frame::from_wire(&PING).unwrap()));
    }

    #[test]
    fn cobs_overflow_without_delimiter() {
        let mut rx = Reassembler::with_capacity(CobsCodec, 64);
        rx.on_bytes(&[0x42; 100]);
        assert_eq!(rx.stats().overflows, 1);
        assert_eq!(rx.next_token(), Some(Token::Raw(vec![0x42; 64])));

        rx.on_bytes(&[0x00]);
        let wire = CobsCodec.to_wire(&Message::GetVersion { version: 0 }.to_frame());
        rx.on_bytes(&wire);
        assert_eq!(
            rx.next_frame().map(|f| f.message_type()),
            Some(Some(om::MessageType::GetVersion))
        );
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut rx = Reassembler::with_capacity(ChecksumCodec, 16);
        for chunk in [&[0x55u8, 0xAA, 0x40][..], &[0x01; 40], &[0x55; 40]] {
            rx.on_bytes(chunk);
            assert!(rx.pending() < 16);
        }
    }

    #[tokio::test]
    async fn send_and_receive_over_duplex() {
        let (a, b) = duplex(64);
        let mut left = SerialLink::new(a, ChecksumCodec);
        let mut right = SerialLink::new(b, ChecksumCodec);

        let frame = Frame::new(&[0x40, 0x01, 0x00]).unwrap();
        left.send(&frame).await.unwrap();

        let mut received = None;
        while received.is_none() {
            received = right.recv_frame().await.unwrap();
        }
        assert_eq!(received.unwrap().as_bytes(), &PING);
        assert_eq!(yf::checksum(&PING[..6]), 0x43);
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout_yields_none() {
        let (a, _b) = duplex(64);
        let mut link = SerialLink::new(a, ChecksumCodec);
        assert_eq!(link.read_chunk().await.unwrap(), None);
        assert_eq!(link.recv_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn closed_peer_is_an_error() {
        let (a, b) = duplex(64);
        drop(b);
        let mut link = SerialLink::new(a, ChecksumCodec);
        assert!(link.read_chunk().await.is_err());
    }
}
