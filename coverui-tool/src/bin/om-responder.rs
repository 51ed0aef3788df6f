//! Answers the OpenMower side of the Cover UI protocol on a serial port:
//! version requests are echoed with our version patched in, LED and
//! buzzer commands are logged.

use anyhow::Result;
use env_logger::TimestampPrecision;
use log::{debug, info, warn};
use tokio::signal;

use coverui_lib::link::SerialLink;
use coverui_lib::port;
use coverui_lib::protocol::om::{self, CobsCodec, LedBits, Message, LED_SLOTS};

/// "0.10"
const FIRMWARE_VERSION: u16 = 10;

fn describe_leds(leds: &LedBits) -> String {
    (0..LED_SLOTS)
        .map(|slot| match leds.get(slot) {
            Some(mode) => mode.to_string(),
            None => "?".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .format_target(false)
        .init();

    let port_name = std::env::args().nth(1).unwrap_or_else(|| "auto".to_string());
    let port = port::open_port_async(&port_name, 115200, false)?;
    let mut link = SerialLink::new(port, CobsCodec);

    loop {
        let frame = tokio::select! {
            _ = signal::ctrl_c() => return Ok(()),
            frame = link.recv_frame() => frame?,
        };
        let frame = match frame {
            Some(frame) => frame,
            None => continue,
        };

        match Message::decode(&frame) {
            Ok(Message::GetVersion { version }) => {
                debug!("version request ({})", version);
                if let Some(reply) = om::version_reply(&frame, FIRMWARE_VERSION) {
                    link.send(&reply).await?;
                }
            }
            Ok(Message::SetLeds { leds }) => info!("leds: {}", describe_leds(&leds)),
            Ok(Message::SetBuzzer {
                repeat,
                on_time,
                off_time,
            }) => info!("buzzer x{} on {} off {}", repeat, on_time, off_time),
            Ok(message) => info!("{:?}", message),
            Err(e) => warn!("{:?}: {}", frame, e),
        }

        let stats = link.stats();
        if stats.invalid > 0 || stats.overflows > 0 {
            debug!(
                "{} frames, {} invalid, {} overflows",
                stats.frames, stats.invalid, stats.overflows
            );
        }
    }
}
