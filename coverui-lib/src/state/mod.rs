mod button;
mod led;

pub use button::{
    Button, ButtonRegistry, ButtonState, Level, Listener, ListenerId, UnknownButton, DEBOUNCE,
};
pub use led::{Led, LedAssignment, LedMode, LedRegistry, LedSpecError};
