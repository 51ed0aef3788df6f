use lazy_static::lazy_static;
use num_derive::{FromPrimitive, ToPrimitive};
use regex::Regex;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Led {
    Lifted,
    Signal,
    BatteryLow,
    Charging,
    HoursTwo,
    HoursFour,
    HoursSix,
    HoursEight,
    HoursTen,
    S1,
    S2,
    Lock,
    DayMon,
    DayTue,
    DayWed,
    DayThu,
    DayFri,
    DaySat,
    DaySun,
}

impl Led {
    pub const COUNT: usize = 19;

    pub const ALL: [Led; Led::COUNT] = [
        Led::Lifted,
        Led::Signal,
        Led::BatteryLow,
        Led::Charging,
        Led::HoursTwo,
        Led::HoursFour,
        Led::HoursSix,
        Led::HoursEight,
        Led::HoursTen,
        Led::S1,
        Led::S2,
        Led::Lock,
        Led::DayMon,
        Led::DayTue,
        Led::DayWed,
        Led::DayThu,
        Led::DayFri,
        Led::DaySat,
        Led::DaySun,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Led::Lifted => "LIFTED",
            Led::Signal => "SIGNAL",
            Led::BatteryLow => "BATTERY_LOW",
            Led::Charging => "CHARGING",
            Led::HoursTwo => "HOURS_TWO",
            Led::HoursFour => "HOURS_FOUR",
            Led::HoursSix => "HOURS_SIX",
            Led::HoursEight => "HOURS_EIGHT",
            Led::HoursTen => "HOURS_TEN",
            Led::S1 => "S1",
            Led::S2 => "S2",
            Led::Lock => "LOCK",
            Led::DayMon => "DAY_MON",
            Led::DayTue => "DAY_TUE",
            Led::DayWed => "DAY_WED",
            Led::DayThu => "DAY_THU",
            Led::DayFri => "DAY_FRI",
            Led::DaySat => "DAY_SAT",
            Led::DaySun => "DAY_SUN",
        }
    }
}

impl Display for Led {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name().fmt(f)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LedSpecError {
    #[error("unknown led '{0}'")]
    UnknownLed(String),
    #[error("unknown led mode '{0}'")]
    UnknownMode(String),
    #[error("invalid led assignment '{0}', expected NAME=MODE")]
    BadAssignment(String),
}

impl FromStr for Led {
    type Err = LedSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_uppercase().replace('-', "_");
        Led::ALL
            .iter()
            .copied()
            .find(|led| led.name() == wanted)
            .ok_or_else(|| LedSpecError::UnknownLed(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum LedMode {
    Off = 0x00,
    On = 0x10,
    FlashSlow = 0x20,
    FlashFast = 0x22,
}

impl Default for LedMode {
    fn default() -> Self {
        LedMode::Off
    }
}

impl LedMode {
    /// Byte written into the checksum-protocol LED frame.
    pub fn wire_value(self) -> u8 {
        self as u8
    }

    /// Three bit code of the COBS protocol `Set_LEDs` bitfield.
    pub fn om_bits(self) -> u8 {
        match self {
            LedMode::Off => 0b000,
            LedMode::FlashSlow => 0b101,
            LedMode::FlashFast => 0b110,
            LedMode::On => 0b111,
        }
    }

    pub fn from_om_bits(bits: u8) -> Option<Self> {
        match bits {
            0b000 => Some(LedMode::Off),
            0b101 => Some(LedMode::FlashSlow),
            0b110 => Some(LedMode::FlashFast),
            0b111 => Some(LedMode::On),
            _ => None,
        }
    }
}

impl Display for LedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedMode::Off => "off".fmt(f),
            LedMode::On => "on".fmt(f),
            LedMode::FlashSlow => "slow".fmt(f),
            LedMode::FlashFast => "fast".fmt(f),
        }
    }
}

impl FromStr for LedMode {
    type Err = LedSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(LedMode::Off),
            "on" => Ok(LedMode::On),
            "slow" | "flash_slow" => Ok(LedMode::FlashSlow),
            "fast" | "flash_fast" => Ok(LedMode::FlashFast),
            _ => Err(LedSpecError::UnknownMode(s.to_string())),
        }
    }
}

/// `NAME=MODE`, e.g. `lifted=on` or `DAY_MON=slow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedAssignment {
    pub led: Led,
    pub mode: LedMode,
}

impl FromStr for LedAssignment {
    type Err = LedSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^([-_[:alnum:]]+)=([_[:alpha:]]+)$").unwrap();
        }
        match RE.captures(s) {
            Some(cap) => Ok(LedAssignment {
                led: cap[1].parse()?,
                mode: cap[2].parse()?,
            }),
            None => Err(LedSpecError::BadAssignment(s.to_string())),
        }
    }
}

struct LedTable {
    modes: [LedMode; Led::COUNT],
    dirty: bool,
}

/// Current mode of every LED plus a dirty flag for the serializers.
pub struct LedRegistry {
    inner: Mutex<LedTable>,
}

impl Default for LedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LedRegistry {
    pub fn new() -> Self {
        LedRegistry {
            inner: Mutex::new(LedTable {
                modes: [LedMode::Off; Led::COUNT],
                dirty: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedTable> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns whether the mode changed. A change marks the registry dirty.
    pub fn set_mode(&self, led: Led, mode: LedMode) -> bool {
        let mut table = self.lock();
        let changed = table.modes[led.index()] != mode;
        if changed {
            table.modes[led.index()] = mode;
            table.dirty = true;
        }
        changed
    }

    pub fn set_all(&self, mode: LedMode) -> bool {
        Led::ALL
            .iter()
            .fold(false, |changed, &led| self.set_mode(led, mode) || changed)
    }

    pub fn mode(&self, led: Led) -> LedMode {
        self.lock().modes[led.index()]
    }

    pub fn snapshot(&self) -> [LedMode; Led::COUNT] {
        self.lock().modes
    }

    /// Clears the dirty flag, returning its previous value.
    pub fn take_dirty(&self) -> bool {
        std::mem::replace(&mut self.lock().dirty, false)
    }

    pub fn force_refresh(&self) {
        self.lock().dirty = true;
    }

    /// All LEDs off, marked dirty.
    pub fn reset(&self) {
        let mut table = self.lock();
        table.modes = [LedMode::Off; Led::COUNT];
        table.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_mode_reports_change() {
        let leds = LedRegistry::new();
        assert!(leds.take_dirty());

        assert!(leds.set_mode(Led::Lifted, LedMode::On));
        assert!(!leds.set_mode(Led::Lifted, LedMode::On));
        assert_eq!(leds.mode(Led::Lifted), LedMode::On);
        assert!(leds.take_dirty());
        assert!(!leds.take_dirty());
    }

    #[test]
    fn unchanged_mode_leaves_registry_clean() {
        let leds = LedRegistry::new();
        leds.take_dirty();
        assert!(!leds.set_mode(Led::Signal, LedMode::Off));
        assert!(!leds.take_dirty());

        leds.force_refresh();
        assert!(leds.take_dirty());
    }

    #[test]
    fn set_all_and_reset() {
        let leds = LedRegistry::new();
        assert!(leds.set_all(LedMode::FlashFast));
        assert!(leds.snapshot().iter().all(|&m| m == LedMode::FlashFast));

        leds.reset();
        assert!(leds.snapshot().iter().all(|&m| m == LedMode::Off));
    }

    #[test]
    fn parse_led_assignment() {
        assert_eq!(
            "lifted=on".parse::<LedAssignment>(),
            Ok(LedAssignment {
                led: Led::Lifted,
                mode: LedMode::On
            })
        );
        assert_eq!(
            "DAY_MON=slow".parse::<LedAssignment>().map(|a| a.mode),
            Ok(LedMode::FlashSlow)
        );
        assert_eq!(
            "hours-two=fast".parse::<LedAssignment>().map(|a| a.led),
            Ok(Led::HoursTwo)
        );
        assert!(matches!(
            "lifted".parse::<LedAssignment>(),
            Err(LedSpecError::BadAssignment(_))
        ));
        assert!(matches!(
            "nose=on".parse::<LedAssignment>(),
            Err(LedSpecError::UnknownLed(_))
        ));
        assert!(matches!(
            "lifted=dim".parse::<LedAssignment>(),
            Err(LedSpecError::UnknownMode(_))
        ));
    }

    #[test]
    fn om_codes_map_both_ways() {
        for mode in [LedMode::Off, LedMode::On, LedMode::FlashSlow, LedMode::FlashFast] {
            assert_eq!(LedMode::from_om_bits(mode.om_bits()), Some(mode));
        }
    }
}
