use super::{Access, BoardConfig, ButtonConfig, LedConfig};
use crate::state::{Button, Led};

const fn expander_pin(n: u32) -> Access {
    Access::Expander(1 << n)
}

const CLASSIC_500_BUTTONS: &[ButtonConfig] = &[
    ButtonConfig::new(Button::Play, Access::Gpio(0)),
    ButtonConfig::new(Button::Home, Access::Gpio(3)),
    ButtonConfig::new(Button::Lock, Access::Uart(3)),
    ButtonConfig::new(Button::S1, Access::Uart(1)),
    ButtonConfig::new(Button::S2, Access::Uart(2)),
    ButtonConfig::new(Button::Ok, Access::Uart(4)),
    ButtonConfig::new(Button::Clock, Access::Uart(0)),
    ButtonConfig::new(Button::DayMon, Access::Uart(5)),
    ButtonConfig::new(Button::DayTue, Access::Uart(6)),
    ButtonConfig::new(Button::DayWed, Access::Uart(7)),
    ButtonConfig::new(Button::DayThu, Access::Uart(8)),
    ButtonConfig::new(Button::DayFri, Access::Uart(9)),
    ButtonConfig::new(Button::DaySat, Access::Uart(10)),
    ButtonConfig::new(Button::DaySun, Access::Uart(11)),
    ButtonConfig::new(Button::Stop1, expander_pin(3)),
    ButtonConfig::new(Button::Stop2, expander_pin(0)),
    ButtonConfig::new(Button::Lift, expander_pin(5)),
    ButtonConfig::new(Button::LiftX, expander_pin(1)),
    ButtonConfig::new(Button::BumpL, expander_pin(2)),
    ButtonConfig::new(Button::BumpR, expander_pin(4)),
    ButtonConfig::new(Button::ShellStop1, expander_pin(6)),
    ButtonConfig::new(Button::ShellStop2, expander_pin(7)),
];

const CLASSIC_500_LEDS: &[LedConfig] = &[
    LedConfig::new(Led::Lifted, Access::Uart(0)),
    LedConfig::new(Led::Signal, Access::Uart(1)),
    LedConfig::new(Led::BatteryLow, Access::Uart(2)),
    LedConfig::new(Led::Charging, Access::Uart(3)),
    LedConfig::new(Led::HoursTwo, Access::Uart(4)),
    LedConfig::new(Led::HoursFour, Access::Uart(5)),
    LedConfig::new(Led::HoursSix, Access::Uart(6)),
    LedConfig::new(Led::HoursEight, Access::Uart(7)),
    LedConfig::new(Led::S1, Access::Uart(8)),
    LedConfig::new(Led::S2, Access::Uart(9)),
    LedConfig::new(Led::Lock, Access::Uart(10)),
    LedConfig::new(Led::DayMon, Access::Uart(11)),
    LedConfig::new(Led::DayTue, Access::Uart(12)),
    LedConfig::new(Led::DayWed, Access::Uart(13)),
    LedConfig::new(Led::DayThu, Access::Uart(14)),
    LedConfig::new(Led::DayFri, Access::Uart(15)),
    LedConfig::new(Led::DaySat, Access::Uart(16)),
    LedConfig::new(Led::DaySun, Access::Uart(17)),
];

// 55 AA 15 50 8E, 20 zeroed LED slots, checksum patched on send.
const CLASSIC_500_LED_MESSAGE: [u8; 25] = [
    0x55, 0xAA, 0x15, 0x50, 0x8E, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

const GPIO_BUTTONS: &[ButtonConfig] = &[
    ButtonConfig::new(Button::Play, Access::Gpio(0)),
    ButtonConfig::new(Button::Home, Access::Gpio(3)),
    ButtonConfig::new(Button::Lock, expander_pin(12)),
    ButtonConfig::new(Button::S1, expander_pin(13)),
    ButtonConfig::new(Button::S2, expander_pin(14)),
    ButtonConfig::new(Button::HoursFour, expander_pin(8)),
    ButtonConfig::new(Button::HoursSix, expander_pin(9)),
    ButtonConfig::new(Button::HoursEight, expander_pin(10)),
    ButtonConfig::new(Button::HoursTen, expander_pin(11)),
];

// Cover UI hardware rev 0.2 pin-out.
const GPIO_LEDS: &[LedConfig] = &[
    LedConfig::new(Led::Lifted, Access::Gpio(1)),
    LedConfig::new(Led::Signal, Access::Gpio(4)),
    LedConfig::new(Led::BatteryLow, Access::Gpio(2)),
    LedConfig::new(Led::Charging, Access::Gpio(6)),
    LedConfig::new(Led::Lock, Access::Gpio(10)),
    LedConfig::new(Led::S1, Access::Gpio(11)),
    LedConfig::new(Led::S2, Access::Gpio(12)),
    LedConfig::new(Led::HoursTwo, Access::Gpio(7)),
    LedConfig::new(Led::HoursFour, Access::Gpio(8)),
    LedConfig::new(Led::HoursSix, Access::Gpio(9)),
    LedConfig::new(Led::HoursEight, Access::Gpio(5)),
];

pub static MODELS: &[BoardConfig] = &[
    BoardConfig {
        model: "500Classic",
        buttons: CLASSIC_500_BUTTONS,
        leds: CLASSIC_500_LEDS,
        serial: true,
        led_message: Some(&CLASSIC_500_LED_MESSAGE),
    },
    BoardConfig {
        model: "GPIO",
        buttons: GPIO_BUTTONS,
        leds: GPIO_LEDS,
        serial: false,
        led_message: None,
    },
];
