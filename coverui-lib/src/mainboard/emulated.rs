use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};

use super::{MainboardKind, MainboardPeer};
use crate::board::{mapping, BoardConfig};
use crate::handshake::{HandshakeNegotiator, Step};
use crate::link::{Reassembler, Token};
use crate::protocol::yf::{ChecksumCodec, Frame};
use crate::protocol::{hex_dump, Result};
use crate::state::LedRegistry;

pub const DEFAULT_PERIOD: Duration = Duration::from_millis(75);

/// Sent once when the mainboard comes up.
pub const START_SEQUENCE: [u8; 2] = [0x00, 0xFF];
pub const BUTTON_POLL: [u8; 6] = [0x55, 0xAA, 0x02, 0x50, 0x62, 0xB3];
pub const STATUS: [u8; 9] = [0x55, 0xAA, 0x05, 0x50, 0x84, 0x00, 0xFF, 0x01, 0xD8];

/// Plays the mainboard's part towards a Cover UI without a mainboard.
///
/// Bytes from the Cover UI drive the handshake. Once it completes, every
/// period yields the LED frame and a button poll, plus a status frame on
/// every other cycle.
pub struct VirtualMainboard {
    config: BoardConfig,
    leds: Arc<LedRegistry>,
    rx: Reassembler<ChecksumCodec>,
    negotiator: HandshakeNegotiator,
    outbox: VecDeque<Token<Frame>>,
    led_frame: Option<Frame>,
    button_poll: Frame,
    status: Frame,
    period: Duration,
    next_tick: Instant,
    cycle: u64,
}

impl VirtualMainboard {
    pub fn new(config: BoardConfig, leds: Arc<LedRegistry>) -> Result<Self> {
        let mut outbox = VecDeque::new();
        outbox.push_back(Token::Raw(START_SEQUENCE.to_vec()));

        Ok(Self {
            config,
            leds,
            rx: Reassembler::new(ChecksumCodec),
            negotiator: HandshakeNegotiator::new(),
            outbox,
            led_frame: None,
            button_poll: Frame::from_wire(&BUTTON_POLL)?,
            status: Frame::from_wire(&STATUS)?,
            period: DEFAULT_PERIOD,
            next_tick: Instant::now(),
            cycle: 0,
        })
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.negotiator = self.negotiator.with_backoff(backoff);
        self
    }

    pub fn is_established(&self) -> bool {
        self.negotiator.is_established()
    }

    fn on_frame(&mut self, frame: Frame) {
        if self.negotiator.is_established() {
            debug!("cover ui: {}", hex_dump(frame.as_bytes()));
            return;
        }

        match self.negotiator.on_frame_at(&frame, Instant::now()) {
            Step::Respond(bytes) => self.outbox.push_back(Token::Raw(bytes.to_vec())),
            Step::Established => {
                info!("virtual mainboard connected");
                self.leds.force_refresh();
                self.next_tick = Instant::now();
                self.cycle = 0;
            }
            Step::Failed => warn!("handshake attempt failed, retrying later"),
            Step::BackingOff => debug!("ignoring {} during backoff", hex_dump(frame.as_bytes())),
        }
    }

    fn refresh_led_frame(&mut self) -> Result<()> {
        if self.leds.take_dirty() || self.led_frame.is_none() {
            self.led_frame = mapping::led_frame(&self.config, &self.leds)?;
        }
        Ok(())
    }

    fn emit_cycle(&mut self) -> Result<Vec<Token<Frame>>> {
        self.refresh_led_frame()?;

        let mut batch = Vec::with_capacity(3);
        if let Some(frame) = &self.led_frame {
            batch.push(Token::Frame(frame.clone()));
        }
        batch.push(Token::Frame(self.button_poll.clone()));
        if self.cycle % 2 == 1 {
            batch.push(Token::Frame(self.status.clone()));
        }
        self.cycle += 1;
        Ok(batch)
    }
}

#[async_trait]
impl MainboardPeer for VirtualMainboard {
    async fn deliver(&mut self, data: &[u8]) -> Result<()> {
        self.rx.on_bytes(data);
        while let Some(frame) = self.rx.next_frame() {
            self.on_frame(frame);
        }
        Ok(())
    }

    async fn poll(&mut self) -> Result<Vec<Token<Frame>>> {
        if !self.outbox.is_empty() {
            return Ok(self.outbox.drain(..).collect());
        }

        if !self.negotiator.is_established() {
            sleep(self.period).await;
            return Ok(Vec::new());
        }

        sleep_until(self.next_tick).await;
        let now = Instant::now();
        self.next_tick += self.period;
        if self.next_tick < now {
            self.next_tick = now + self.period;
        }
        self.emit_cycle()
    }

    fn kind(&self) -> MainboardKind {
        MainboardKind::Virtual
    }
}
