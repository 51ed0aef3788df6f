//! Opening the UARTs of the Cover UI and the mainboard.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
use linux::is_port_open;
#[cfg(target_os = "macos")]
use macos::is_port_open;

pub use tokio_serial::SerialStream;

use anyhow::Context;
use log::debug;
use serialport::SerialPortType;
use thiserror::Error;
use tokio_serial::SerialPortBuilderExt;

use crate::controller::{PortFactory, PortRole};
use crate::protocol::Result;
use crate::settings::BridgeSettings;

#[derive(Error, Debug)]
pub enum OpenPortError {
    #[error("no usb uart adapter found")]
    NoCompatiblePort,
    #[error("{port_name:?} busy")]
    PortBusy { port_name: String },
    #[error("no port configured for the {0}")]
    NotConfigured(PortRole),
}

#[derive(PartialEq)]
struct UsbId(u16, u16);

static COMPATIBLE_IDS: &[UsbId] = &[
    UsbId(0x1a86, 0x7523), // QinHeng CH340
    UsbId(0x0403, 0x6001), // FTDI FT232R
    UsbId(0x10c4, 0xea60), // Silicon Labs CP210x
];

fn resolve(port_name: &str) -> Result<String> {
    if port_name == "auto" {
        guess_port()
    } else {
        Ok(port_name.to_string())
    }
}

pub fn open_port_async(port_name: &str, baudrate: u32, force: bool) -> Result<SerialStream> {
    let true_name = resolve(port_name)?;

    if !force && is_port_open(&true_name) {
        return Err(OpenPortError::PortBusy {
            port_name: true_name,
        }
        .into());
    }

    let port = tokio_serial::new(&true_name, baudrate)
        .open_native_async()
        .with_context(|| format!("opening {}", true_name))?;

    debug!("open_port OK: {} @ {} baud", &true_name, baudrate);
    Ok(port)
}

/// First USB UART with a known adapter id.
pub fn guess_port() -> Result<String> {
    serialport::available_ports()?
        .into_iter()
        .filter(|info| match &info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                COMPATIBLE_IDS.contains(&UsbId(usb_info.vid, usb_info.pid))
                    && !is_port_open(&info.port_name)
            }
            _ => false,
        })
        .map(|info| info.port_name)
        .next()
        .ok_or_else(|| OpenPortError::NoCompatiblePort.into())
}

/// Real serial ports named by the bridge settings.
pub struct SerialPorts {
    cover_ui: String,
    mainboard: Option<String>,
    baudrate: u32,
    force: bool,
}

impl SerialPorts {
    pub fn new(settings: &BridgeSettings) -> Self {
        SerialPorts {
            cover_ui: settings.cover_ui_port.clone(),
            mainboard: settings.mainboard_port.clone(),
            baudrate: settings.baudrate,
            force: settings.force,
        }
    }
}

impl PortFactory for SerialPorts {
    type Port = SerialStream;

    fn open(&self, role: PortRole) -> Result<SerialStream> {
        let name = match role {
            PortRole::CoverUi => &self.cover_ui,
            PortRole::Mainboard => self
                .mainboard
                .as_ref()
                .ok_or(OpenPortError::NotConfigured(role))?,
        };
        open_port_async(name, self.baudrate, self.force)
    }
}
