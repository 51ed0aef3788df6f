pub mod emulated;
mod hardware;

pub use emulated::VirtualMainboard;
pub use hardware::HardwareMainboard;

use async_trait::async_trait;
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

use crate::link::Token;
use crate::protocol::yf::Frame;
use crate::protocol::Result;

/// Whatever sits on the mainboard side of the bridge.
#[async_trait]
pub trait MainboardPeer: Send {
    /// Bytes the Cover UI sent, passed on unmodified.
    async fn deliver(&mut self, data: &[u8]) -> Result<()>;

    /// Waits for traffic towards the Cover UI. May return an empty batch.
    ///
    /// Must be cancel safe, the bridge polls it inside `select!`.
    async fn poll(&mut self) -> Result<Vec<Token<Frame>>>;

    fn kind(&self) -> MainboardKind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainboardKind {
    Hardware,
    Virtual,
}

impl Display for MainboardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MainboardKind::Hardware => "hardware".fmt(f),
            MainboardKind::Virtual => "virtual".fmt(f),
        }
    }
}

#[derive(Error, Debug)]
pub enum MainboardKindError {
    #[error("invalid mainboard '{0}', expected 'hardware' or 'virtual'")]
    BadKind(String),
}

impl FromStr for MainboardKind {
    type Err = MainboardKindError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "hardware" | "hw" => Ok(MainboardKind::Hardware),
            "virtual" | "sim" => Ok(MainboardKind::Virtual),
            _ => Err(MainboardKindError::BadKind(input.to_string())),
        }
    }
}
