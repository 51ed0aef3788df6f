use anyhow::Result;
pub use clap::StructOpt;
use clap::{Parser, Subcommand};
use hex::FromHex;
use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Deref;
use std::str::FromStr;
use thiserror::Error;

use coverui_lib::mainboard::MainboardKind;
use coverui_lib::state::LedAssignment;

#[derive(Error, Debug)]
pub enum HexError {
    #[error("invalid hex bytes '{0}'")]
    BadHex(String),
}

/// Bytes written as hex, optionally split by spaces or colons.
#[derive(Debug, PartialEq, Eq)]
pub struct HexBytes(Vec<u8>);

impl Deref for HexBytes {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for HexBytes {
    type Err = HexError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref RE: Regex =
                Regex::new(r"^(?:0x)?([0-9a-fA-F]{2}(?:[ :]?[0-9a-fA-F]{2})*)$").unwrap();
        }

        let digits = RE
            .captures(input.trim())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().replace(&[' ', ':'][..], ""))
            .ok_or_else(|| HexError::BadHex(input.to_string()))?;

        Vec::from_hex(digits)
            .map(HexBytes)
            .map_err(|_| HexError::BadHex(input.to_string()))
    }
}

fn parse_with_radix<T>(input: &str) -> Result<T, T::FromStrRadixErr>
where
    T: num::Num,
    <T as num::Num>::FromStrRadixErr: std::error::Error + Send + Sync,
{
    if input.starts_with("0x") {
        T::from_str_radix(input.trim_start_matches("0x"), 16)
    } else {
        T::from_str_radix(input, 10)
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Open ports even if already in use
    #[clap(long, short)]
    pub force: bool,

    /// enable debug output
    #[clap(long, short)]
    pub debug: bool,

    /// Cover UI UART device or 'auto'
    #[clap(long, short, default_value = "auto")]
    pub port: String,

    /// Mainboard UART device, for a hardware mainboard
    #[clap(long, short)]
    pub mainboard_port: Option<String>,

    /// UART baud rate
    #[clap(long, short, default_value_t = 115200)]
    pub baudrate: u32,

    /// Board model
    #[clap(long, short = 'M', default_value = "500Classic")]
    pub model: String,

    /// Use json-formatted output
    #[clap(long, short)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List known board models
    ListModels,

    /// Show button and LED wiring of a model
    ShowModel { model: String },

    /// Build a checksum protocol frame around a payload
    Frame { payload: HexBytes },

    /// Validate a checksum protocol frame
    Check { frame: HexBytes },

    /// Answer the Cover UI handshake until it completes
    Handshake {
        /// Retry delay after a failed attempt, in ms
        #[clap(long, default_value_t = 3000, parse(try_from_str=parse_with_radix))]
        backoff: u64,
    },

    /// Run the bridge until interrupted
    Bridge {
        /// 'hardware' or 'virtual'
        #[clap(long, default_value = "virtual")]
        mainboard: MainboardKind,

        /// Initial LED state, e.g. 'lifted=on'
        #[clap(long = "led")]
        leds: Vec<LedAssignment>,

        /// Virtual mainboard period, in ms
        #[clap(long, default_value_t = 75, parse(try_from_str=parse_with_radix))]
        period: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_bytes_forms() {
        let expected = HexBytes(vec![0x55, 0xAA, 0x02, 0x50, 0x62]);
        assert_eq!("55AA025062".parse::<HexBytes>().unwrap(), expected);
        assert_eq!("55 aa 02 50 62".parse::<HexBytes>().unwrap(), expected);
        assert_eq!("0x55:AA:02:50:62".parse::<HexBytes>().unwrap(), expected);
        assert!("55A".parse::<HexBytes>().is_err());
        assert!("zz".parse::<HexBytes>().is_err());
    }

    #[test]
    fn radix() {
        assert_eq!(parse_with_radix::<u64>("0x4b").unwrap(), 75);
        assert_eq!(parse_with_radix::<u64>("75").unwrap(), 75);
    }

    #[test]
    fn bridge_arguments() {
        let cli = Cli::parse_from([
            "coverui-tool",
            "bridge",
            "--mainboard",
            "hw",
            "--led",
            "lifted=on",
            "--led",
            "signal=fast",
        ]);
        match cli.command {
            Commands::Bridge { mainboard, leds, period } => {
                assert_eq!(mainboard, MainboardKind::Hardware);
                assert_eq!(leds.len(), 2);
                assert_eq!(period, 75);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
