use log::debug;
use num_derive::{FromPrimitive, ToPrimitive};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Releases closer than this to the preceding press are contact bounce.
pub const DEBOUNCE: Duration = Duration::from_millis(15);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Button {
    Play,
    Home,
    Lock,
    Ok,
    S1,
    S2,
    Clock,
    HoursFour,
    HoursSix,
    HoursEight,
    HoursTen,
    DayMon,
    DayTue,
    DayWed,
    DayThu,
    DayFri,
    DaySat,
    DaySun,
    Stop1,
    Stop2,
    Lift,
    LiftX,
    BumpL,
    BumpR,
    ShellStop1,
    ShellStop2,
}

impl Button {
    pub const COUNT: usize = 26;

    pub const ALL: [Button; Button::COUNT] = [
        Button::Play,
        Button::Home,
        Button::Lock,
        Button::Ok,
        Button::S1,
        Button::S2,
        Button::Clock,
        Button::HoursFour,
        Button::HoursSix,
        Button::HoursEight,
        Button::HoursTen,
        Button::DayMon,
        Button::DayTue,
        Button::DayWed,
        Button::DayThu,
        Button::DayFri,
        Button::DaySat,
        Button::DaySun,
        Button::Stop1,
        Button::Stop2,
        Button::Lift,
        Button::LiftX,
        Button::BumpL,
        Button::BumpR,
        Button::ShellStop1,
        Button::ShellStop2,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Button::Play => "PLAY",
            Button::Home => "HOME",
            Button::Lock => "LOCK",
            Button::Ok => "OK",
            Button::S1 => "S1",
            Button::S2 => "S2",
            Button::Clock => "CLOCK",
            Button::HoursFour => "HOURS_FOUR",
            Button::HoursSix => "HOURS_SIX",
            Button::HoursEight => "HOURS_EIGHT",
            Button::HoursTen => "HOURS_TEN",
            Button::DayMon => "DAY_MON",
            Button::DayTue => "DAY_TUE",
            Button::DayWed => "DAY_WED",
            Button::DayThu => "DAY_THU",
            Button::DayFri => "DAY_FRI",
            Button::DaySat => "DAY_SAT",
            Button::DaySun => "DAY_SUN",
            Button::Stop1 => "STOP1",
            Button::Stop2 => "STOP2",
            Button::Lift => "LIFT",
            Button::LiftX => "LIFTX",
            Button::BumpL => "BUMP_L",
            Button::BumpR => "BUMP_R",
            Button::ShellStop1 => "SHELL_STOP1",
            Button::ShellStop2 => "SHELL_STOP2",
        }
    }
}

impl Display for Button {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name().fmt(f)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown button '{0}'")]
pub struct UnknownButton(String);

impl FromStr for Button {
    type Err = UnknownButton;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_uppercase().replace('-', "_");
        Button::ALL
            .iter()
            .copied()
            .find(|button| button.name() == wanted)
            .ok_or_else(|| UnknownButton(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Released,
    Pressed,
}

impl Default for Level {
    fn default() -> Self {
        Level::Released
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Released => "released".fmt(f),
            Level::Pressed => "pressed".fmt(f),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub level: Level,
    pub last_change: Option<Instant>,
}

/// Called with the button, its new level and the time spent in the old one.
pub type Listener = Arc<dyn Fn(Button, Level, Duration) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ButtonTable {
    states: [ButtonState; Button::COUNT],
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

pub struct ButtonRegistry {
    inner: Mutex<ButtonTable>,
}

impl Default for ButtonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ButtonRegistry {
    pub fn new() -> Self {
        ButtonRegistry {
            inner: Mutex::new(ButtonTable {
                states: [ButtonState::default(); Button::COUNT],
                listeners: Vec::new(),
                next_listener: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ButtonTable> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        let mut table = self.lock();
        let id = ListenerId(table.next_listener);
        table.next_listener += 1;
        table.listeners.push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut table = self.lock();
        let before = table.listeners.len();
        table.listeners.retain(|(other, _)| *other != id);
        table.listeners.len() != before
    }

    pub fn state(&self, button: Button) -> ButtonState {
        self.lock().states[button.index()]
    }

    pub fn level(&self, button: Button) -> Level {
        self.state(button).level
    }

    /// Records a level observed at `now`.
    ///
    /// Returns whether the state changed. Listeners run in registration
    /// order after the registry lock has been released, so they may read
    /// the registry but must not call back into `set_state`.
    pub fn set_state(&self, button: Button, level: Level, now: Instant) -> bool {
        let (held, listeners) = {
            let mut table = self.lock();
            let state = &mut table.states[button.index()];
            if state.level == level {
                return false;
            }

            let held = state
                .last_change
                .map(|at| now.saturating_duration_since(at))
                .unwrap_or_default();
            if level == Level::Released && state.last_change.is_some() && held < DEBOUNCE {
                debug!("{} release after {:?} ignored", button, held);
                return false;
            }

            state.level = level;
            state.last_change = Some(now);

            let listeners: Vec<Listener> =
                table.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            (held, listeners)
        };

        debug!("{} {} after {:?}", button, level, held);
        for listener in listeners {
            listener(button, level, held);
        }
        true
    }

    /// Every button back to released; listeners are kept.
    pub fn reset(&self) {
        self.lock().states = [ButtonState::default(); Button::COUNT];
    }
}
