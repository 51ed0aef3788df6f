mod db;
pub mod mapping;

use std::fmt::Display;
use thiserror::Error;

use crate::state::{Button, Led};
use db::MODELS;

/// How one button or LED is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Gpio(u8),
    /// Bit mask on the port expander.
    Expander(u32),
    /// Byte position inside the UART status payload, after the two type bytes.
    Uart(u8),
}

impl Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Gpio(pin) => write!(f, "gpio {}", pin),
            Access::Expander(mask) => write!(f, "exp 0x{:04x}", mask),
            Access::Uart(pos) => write!(f, "uart {}", pos),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonConfig {
    pub button: Button,
    pub access: Access,
}

impl ButtonConfig {
    pub const fn new(button: Button, access: Access) -> Self {
        ButtonConfig { button, access }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedConfig {
    pub led: Led,
    pub access: Access,
}

impl LedConfig {
    pub const fn new(led: Led, access: Access) -> Self {
        LedConfig { led, access }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
    #[error("unknown board model '{0}'")]
    UnknownModel(String),
}

#[derive(Debug, Clone, Copy)]
pub struct BoardConfig {
    model: &'static str,
    buttons: &'static [ButtonConfig],
    leds: &'static [LedConfig],
    serial: bool,
    led_message: Option<&'static [u8]>,
}

impl BoardConfig {
    /// Looks up a model by name. Names are matched exactly.
    pub fn for_model(name: &str) -> Result<Self, ModelError> {
        MODELS
            .iter()
            .find(|config| config.model == name)
            .copied()
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    pub fn model(&self) -> &'static str {
        self.model
    }

    pub fn button_configs(&self) -> &'static [ButtonConfig] {
        self.buttons
    }

    pub fn led_configs(&self) -> &'static [LedConfig] {
        self.leds
    }

    /// Whether the Cover UI talks to the mainboard over a UART at all.
    pub fn has_serial_communication(&self) -> bool {
        self.serial
    }

    /// Template LED frame, checksum not yet valid.
    pub fn default_led_message(&self) -> Option<&'static [u8]> {
        self.led_message
    }

    pub fn uart_buttons(&self) -> impl Iterator<Item = (Button, u8)> {
        let (buttons, serial) = (self.buttons, self.serial);
        buttons.iter().filter_map(move |cfg| match cfg.access {
            Access::Uart(pos) if serial => Some((cfg.button, pos)),
            _ => None,
        })
    }

    pub fn uart_leds(&self) -> impl Iterator<Item = (Led, u8)> {
        let (leds, serial) = (self.leds, self.serial);
        leds.iter().filter_map(move |cfg| match cfg.access {
            Access::Uart(pos) if serial => Some((cfg.led, pos)),
            _ => None,
        })
    }

    pub fn gpio_leds(&self) -> impl Iterator<Item = (Led, u8)> {
        let leds = self.leds;
        leds.iter().filter_map(|cfg| match cfg.access {
            Access::Gpio(pin) => Some((cfg.led, pin)),
            _ => None,
        })
    }

    /// Union of all port expander bits the buttons use.
    pub fn expander_mask(&self) -> u32 {
        self.buttons
            .iter()
            .filter_map(|cfg| match cfg.access {
                Access::Expander(mask) => Some(mask),
                _ => None,
            })
            .fold(0, |acc, mask| acc | mask)
    }
}

impl Display for BoardConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.model.fmt(f)
    }
}

pub fn list_models() -> Vec<&'static str> {
    MODELS.iter().map(|config| config.model).collect()
}
