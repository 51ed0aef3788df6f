//! Replay of the fixed handshake toward the Cover UI. The negotiator plays
//! the mainboard: it waits for the Cover UI's messages and answers each one
//! the way a real mainboard would.
//!
//! The script is a table of `expected message -> canned response` pairs
//! matched in order. An entry answers at most once per attempt, so the same
//! expected message may appear several times with different responses.

use log::{debug, info, warn};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::link::SerialLink;
use crate::protocol::yf::{ChecksumCodec, Frame, Kind};
use crate::protocol::{hex_dump, Result};

pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(3);

/// `RM EC4_V1.00_2020(200930)`
const VERSION_REPORT: &[u8] = &[
    0x55, 0xAA, 0x1B, 0xFF, 0xFB, 0x52, 0x4D, 0x20, 0x45, 0x43, 0x34, 0x5F, 0x56, 0x31, 0x2E,
    0x30, 0x30, 0x5F, 0x32, 0x30, 0x32, 0x30, 0x28, 0x32, 0x30, 0x30, 0x39, 0x33, 0x30, 0x29,
    0xA5,
];

pub const SCRIPT: &[(&[u8], &[u8])] = &[
    (
        &[0x55, 0xAA, 0x03, 0x40, 0x01, 0x00, 0x43],
        &[0x55, 0xAA, 0x02, 0xFF, 0xFF, 0xFF],
    ),
    (
        &[0x55, 0xAA, 0x02, 0xFF, 0xFF, 0xFF],
        &[0x55, 0xAA, 0x02, 0xFF, 0xFE, 0xFE],
    ),
    (
        &[0x55, 0xAA, 0x02, 0xFF, 0xFE, 0xFE],
        &[0x55, 0xAA, 0x05, 0xFF, 0xFD, 0x06, 0x50, 0x20, 0x76],
    ),
    (
        &[0x55, 0xAA, 0x03, 0xFF, 0xFD, 0x06, 0x04],
        &[0x55, 0xAA, 0x02, 0xFF, 0xFB, 0xFB],
    ),
    (VERSION_REPORT, &[0x55, 0xAA, 0x02, 0xFF, 0xFB, 0xFB]),
    (VERSION_REPORT, &[0x55, 0xAA, 0x02, 0x00, 0x00, 0x01]),
    (&[0x55, 0xAA, 0x03, 0x40, 0x01, 0x00, 0x43], &[]),
];

#[derive(Debug, Clone)]
pub struct HandshakeEntry {
    pub expected: &'static [u8],
    pub response: &'static [u8],
    pub sent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Negotiating,
    Established,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Send these bytes back to the peer.
    Respond(&'static [u8]),
    Established,
    /// Unknown message, the attempt is over.
    Failed,
    /// Input ignored while waiting for the next attempt.
    BackingOff,
}

pub struct HandshakeNegotiator {
    entries: Vec<HandshakeEntry>,
    state: State,
    backoff: Duration,
    retry_at: Option<Instant>,
    attempts: u32,
}

impl Default for HandshakeNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeNegotiator {
    pub fn new() -> Self {
        Self::with_script(SCRIPT)
    }

    pub fn with_script(script: &[(&'static [u8], &'static [u8])]) -> Self {
        Self {
            entries: script
                .iter()
                .map(|&(expected, response)| HandshakeEntry {
                    expected,
                    response,
                    sent: false,
                })
                .collect(),
            state: State::Negotiating,
            backoff: DEFAULT_BACKOFF,
            retry_at: None,
            attempts: 1,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == State::Established
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn entries(&self) -> &[HandshakeEntry] {
        &self.entries
    }

    /// Starts a fresh attempt.
    pub fn reset(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.sent = false;
        }
        self.state = State::Negotiating;
        self.retry_at = None;
    }

    /// Feeds one frame received from the peer.
    pub fn on_frame(&mut self, frame: &Frame) -> Step {
        if self.is_established() {
            return Step::Established;
        }

        let raw = frame.as_bytes();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| !entry.sent && entry.expected == raw)
        {
            entry.sent = true;
            if entry.response.is_empty() {
                info!("handshake complete");
                self.state = State::Established;
                return Step::Established;
            }
            debug!("handshake: {} -> {}", hex_dump(raw), hex_dump(entry.response));
            return Step::Respond(entry.response);
        }

        if frame.is(Kind::ButtonReport) {
            info!("peer already past handshake");
            self.state = State::Established;
            return Step::Established;
        }

        warn!("unknown message during handshake: {}", hex_dump(raw));
        Step::Failed
    }

    /// Like [`on_frame`](Self::on_frame), but a failure starts the backoff
    /// and frames arriving before it ends are ignored.
    pub fn on_frame_at(&mut self, frame: &Frame, now: Instant) -> Step {
        if let Some(retry_at) = self.retry_at {
            if now < retry_at {
                return Step::BackingOff;
            }
            self.attempts += 1;
            debug!("handshake attempt {}", self.attempts);
            self.reset();
        }

        let step = self.on_frame(frame);
        if step == Step::Failed {
            self.retry_at = Some(now + self.backoff);
        }
        step
    }

    /// Runs attempts on `link` until the handshake completes or `cancel`
    /// fires. Returns whether the handshake completed.
    pub async fn negotiate<T>(
        &mut self,
        link: &mut SerialLink<T, ChecksumCodec>,
        cancel: &CancellationToken,
    ) -> Result<bool>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.reset();
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                frame = link.recv_frame() => frame?,
            };
            let frame = match frame {
                Some(frame) => frame,
                None => continue,
            };

            match self.on_frame(&frame) {
                Step::Respond(bytes) => link.send_raw(bytes).await?,
                Step::Established => return Ok(true),
                Step::Failed | Step::BackingOff => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(false),
                        _ = sleep(self.backoff) => {}
                    }
                    link.rx().clear();
                    self.attempts += 1;
                    debug!("handshake attempt {}", self.attempts);
                    self.reset();
                }
            }
        }
    }
}
