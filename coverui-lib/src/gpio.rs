//! Periodic tasks for buttons and LEDs wired to pins or the port expander.

use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::board::{Access, BoardConfig};
use crate::io::DigitalIo;
use crate::protocol::Result;
use crate::state::{ButtonRegistry, Led, LedMode, LedRegistry, Level};

pub const BUTTON_POLL_PERIOD: Duration = Duration::from_millis(10);
pub const LED_TICK: Duration = Duration::from_millis(50);

const SLOW_TOGGLE_TICKS: u64 = 12;
const FAST_TOGGLE_TICKS: u64 = 5;

/// Samples every pin and expander button of a model into the registry,
/// which filters bounces.
pub struct ButtonPoller {
    config: BoardConfig,
    io: Arc<dyn DigitalIo>,
    buttons: Arc<ButtonRegistry>,
}

impl ButtonPoller {
    pub fn new(config: BoardConfig, io: Arc<dyn DigitalIo>, buttons: Arc<ButtonRegistry>) -> Self {
        Self {
            config,
            io,
            buttons,
        }
    }

    /// One sample of all inputs. The expander is read once per sample.
    /// Returns how many buttons changed.
    pub fn poll_once(&self, now: Instant) -> Result<usize> {
        let mask = self.config.expander_mask();
        let bits = if mask != 0 {
            self.io.read_expander_bits(mask)?
        } else {
            0
        };

        let mut changed = 0;
        for cfg in self.config.button_configs() {
            let high = match cfg.access {
                Access::Gpio(pin) => self.io.read_gpio(pin)?,
                Access::Expander(mask) => bits & mask != 0,
                Access::Uart(_) => continue,
            };
            let level = if high { Level::Released } else { Level::Pressed };
            if self.buttons.set_state(cfg.button, level, now) {
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut ticker = interval(BUTTON_POLL_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failing = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("button poller stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.poll_once(Instant::now()) {
                        Ok(_) => failing = false,
                        Err(e) if !failing => {
                            warn!("button poll failed: {:#}", e);
                            failing = true;
                        }
                        Err(_) => {}
                    }
                }
            }
        }
    }
}

/// Drives the pin LEDs of a model from the LED registry, blinking included.
pub struct LedDriver {
    config: BoardConfig,
    io: Arc<dyn DigitalIo>,
    leds: Arc<LedRegistry>,
    tick: u64,
}

fn lit(mode: LedMode, tick: u64) -> bool {
    match mode {
        LedMode::Off => false,
        LedMode::On => true,
        LedMode::FlashSlow => (tick / SLOW_TOGGLE_TICKS) % 2 == 0,
        LedMode::FlashFast => (tick / FAST_TOGGLE_TICKS) % 2 == 0,
    }
}

impl LedDriver {
    pub fn new(config: BoardConfig, io: Arc<dyn DigitalIo>, leds: Arc<LedRegistry>) -> Self {
        Self {
            config,
            io,
            leds,
            tick: 0,
        }
    }

    pub fn tick_once(&mut self) -> Result<()> {
        let modes = self.leds.snapshot();
        for (led, pin) in self.config.gpio_leds() {
            self.io.write_gpio(pin, lit(modes[led.index()], self.tick))?;
        }
        self.tick = self.tick.wrapping_add(1);
        Ok(())
    }

    pub fn all_off(&self) -> Result<()> {
        for (_, pin) in self.config.gpio_leds() {
            self.io.write_gpio(pin, false)?;
        }
        Ok(())
    }

    pub fn led_pins(&self) -> impl Iterator<Item = (Led, u8)> {
        self.config.gpio_leds()
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let mut ticker = interval(LED_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("led driver stopped");
                    return self.all_off();
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_once() {
                        warn!("led update failed: {:#}", e);
                    }
                }
            }
        }
    }
}
