//! Translation between checksum-protocol frames and the registries, shared
//! by the bridge and the virtual mainboard.

use log::debug;
use std::time::Instant;

use super::BoardConfig;
use crate::protocol::yf::{Frame, Kind};
use crate::protocol::ProtocolError;
use crate::state::{ButtonRegistry, Level, LedRegistry};

/// Frame offset of UART position 0: header, length and the two type bytes.
pub const VALUE_OFFSET: usize = 5;

pub const BUTTON_RELEASED: u8 = 0x00;
pub const BUTTON_PRESSED: u8 = 0x02;

/// The model's LED template filled with the current LED modes.
pub fn led_frame(config: &BoardConfig, leds: &LedRegistry) -> Result<Option<Frame>, ProtocolError> {
    let template = match config.default_led_message() {
        Some(template) => template,
        None => return Ok(None),
    };
    let mut frame = Frame::with_checksum(template.to_vec())?;
    patch_led_frame(config, leds, &mut frame);
    Ok(Some(frame))
}

/// Writes every UART LED's mode into `frame` and fixes the checksum.
/// Returns the number of LED slots written.
pub fn patch_led_frame(config: &BoardConfig, leds: &LedRegistry, frame: &mut Frame) -> usize {
    let modes = leds.snapshot();
    let mut patched = 0;

    for (led, pos) in config.uart_leds() {
        let offset = VALUE_OFFSET + pos as usize;
        if frame.patch(offset, modes[led.index()].wire_value()) {
            patched += 1;
        } else {
            debug!("{} slot {} outside led frame of {} bytes", led, pos, frame.len());
        }
    }

    frame.update_checksum();
    patched
}

/// Applies a `50 62` button report to the registry.
///
/// Returns how many buttons changed state. A report too short for one of
/// the configured positions is rejected before any button is touched.
pub fn apply_button_report(
    config: &BoardConfig,
    buttons: &ButtonRegistry,
    frame: &Frame,
    now: Instant,
) -> Result<usize, ProtocolError> {
    if !frame.is(Kind::ButtonReport) {
        return Ok(0);
    }

    let raw = frame.as_bytes();
    let checksum_at = raw.len() - 1;
    if let Some((button, pos)) = config
        .uart_buttons()
        .find(|(_, pos)| VALUE_OFFSET + *pos as usize >= checksum_at)
    {
        debug!(
            "button report of {} bytes has no slot {} for {}",
            raw.len(),
            pos,
            button
        );
        return Err(ProtocolError::TooShort(raw.len()));
    }

    let mut changed = 0;
    for (button, pos) in config.uart_buttons() {
        let level = match raw[VALUE_OFFSET + pos as usize] {
            BUTTON_RELEASED => Level::Released,
            BUTTON_PRESSED => Level::Pressed,
            _ => continue,
        };
        if buttons.set_state(button, level, now) {
            changed += 1;
        }
    }
    Ok(changed)
}
