pub mod cli;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::CommandFactory;
use clap_complete::{generate, shells::Bash};
use json::JsonValue;
use log::{error, info};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use coverui_lib::board::{self, BoardConfig};
use coverui_lib::controller::CoverUiController;
use coverui_lib::handshake::HandshakeNegotiator;
use coverui_lib::io::SimulatedIo;
use coverui_lib::link::SerialLink;
use coverui_lib::mainboard::{emulated::START_SEQUENCE, MainboardKind};
use coverui_lib::port::{self, SerialPorts};
use coverui_lib::protocol::hex_dump;
use coverui_lib::protocol::yf::{self, ChecksumCodec, Frame};
use coverui_lib::settings::BridgeSettings;
use coverui_lib::state::LedAssignment;

use cli::{Cli, HexBytes, StructOpt};

enum OutputFormat {
    Plain,
    Json,
}

fn cmd_list_models(fmt: OutputFormat) -> Result<String> {
    let models = board::list_models();
    Ok(match fmt {
        OutputFormat::Plain => models.join("\n"),
        OutputFormat::Json => json::stringify(models),
    })
}

fn cmd_show_model(model: &str, fmt: OutputFormat) -> Result<String> {
    let config = BoardConfig::for_model(model)?;

    Ok(match fmt {
        OutputFormat::Plain => {
            let mut lines = vec![format!(
                "{} ({})",
                config,
                if config.has_serial_communication() {
                    "uart"
                } else {
                    "gpio only"
                }
            )];
            lines.extend(
                config
                    .button_configs()
                    .iter()
                    .map(|cfg| format!("button {:<12} {}", cfg.button, cfg.access)),
            );
            lines.extend(
                config
                    .led_configs()
                    .iter()
                    .map(|cfg| format!("led    {:<12} {}", cfg.led, cfg.access)),
            );
            lines.join("\n")
        }
        OutputFormat::Json => {
            let mut obj = JsonValue::new_object();
            obj["model"] = config.model().into();
            obj["serial"] = config.has_serial_communication().into();
            obj["buttons"] = config
                .button_configs()
                .iter()
                .map(|cfg| (cfg.button.to_string(), cfg.access.to_string()))
                .fold(JsonValue::new_object(), |mut acc, (name, access)| {
                    acc[name.as_str()] = access.into();
                    acc
                });
            obj["leds"] = config
                .led_configs()
                .iter()
                .map(|cfg| (cfg.led.to_string(), cfg.access.to_string()))
                .fold(JsonValue::new_object(), |mut acc, (name, access)| {
                    acc[name.as_str()] = access.into();
                    acc
                });
            json::stringify(obj)
        }
    })
}

fn cmd_frame(payload: &HexBytes) -> Result<String> {
    Ok(hex_dump(&yf::encode(payload)?))
}

fn cmd_check(raw: &HexBytes, fmt: OutputFormat) -> Result<String> {
    let frame = Frame::from_wire(raw)?;
    let kind = frame
        .kind()
        .map_or_else(|| "unknown".to_string(), |kind| format!("{:?}", kind));

    Ok(match fmt {
        OutputFormat::Plain => format!("ok: {} payload {}", kind, hex_dump(frame.payload())),
        OutputFormat::Json => {
            let mut obj = JsonValue::new_object();
            obj["kind"] = kind.into();
            obj["payload"] = frame.payload().to_vec().into();
            json::stringify(obj)
        }
    })
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    cancel
}

async fn cmd_handshake(cli: &Cli, backoff: Duration) -> Result<String> {
    let port = port::open_port_async(&cli.port, cli.baudrate, cli.force)?;
    let mut link = SerialLink::new(port, ChecksumCodec);
    link.send_raw(&START_SEQUENCE).await?;

    let cancel = cancel_on_ctrl_c();
    let mut negotiator = HandshakeNegotiator::new().with_backoff(backoff);
    if negotiator.negotiate(&mut link, &cancel).await? {
        Ok(format!(
            "handshake complete after {} attempt(s)",
            negotiator.attempts()
        ))
    } else {
        Err(anyhow!("interrupted"))
    }
}

async fn cmd_bridge(
    cli: &Cli,
    mainboard: MainboardKind,
    leds: &[LedAssignment],
    period: Duration,
) -> Result<String> {
    let settings = BridgeSettings {
        cover_ui_port: cli.port.clone(),
        mainboard_port: cli.mainboard_port.clone(),
        baudrate: cli.baudrate,
        mainboard,
        force: cli.force,
        emit_period: period,
        ..BridgeSettings::default()
    };

    let mut controller = CoverUiController::new(
        &cli.model,
        SerialPorts::new(&settings),
        Arc::new(SimulatedIo::new()),
        settings,
    )?;
    for assignment in leds {
        controller.set_led_mode(assignment.led, assignment.mode);
    }
    controller.add_button_listener(Arc::new(|button, level, held| {
        info!("{} {} after {:?}", button, level, held)
    }));

    controller.start().await?;
    let result = tokio::select! {
        r = signal::ctrl_c() => {
            info!("interrupted");
            r.map_err(Into::into)
        }
        r = controller.bridge_finished() => r,
    };
    controller.stop().await;

    result.map(|_| String::new())
}

async fn do_main() -> Result<String> {
    if std::env::var("GENERATE_COMPLETION").is_ok() {
        generate(
            Bash,
            &mut cli::Cli::command(),
            "coverui-tool",
            &mut io::stdout(),
        );

        return Ok(String::default());
    }

    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.debug {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp_millis()
    .format_target(false)
    .init();

    let fmt = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Plain
    };

    match &cli.command {
        cli::Commands::ListModels => cmd_list_models(fmt),
        cli::Commands::ShowModel { model } => cmd_show_model(model, fmt),
        cli::Commands::Frame { payload } => cmd_frame(payload),
        cli::Commands::Check { frame } => cmd_check(frame, fmt),
        cli::Commands::Handshake { backoff } => {
            cmd_handshake(&cli, Duration::from_millis(*backoff)).await
        }
        cli::Commands::Bridge {
            mainboard,
            leds,
            period,
        } => cmd_bridge(&cli, *mainboard, leds, Duration::from_millis(*period)).await,
    }
}

#[tokio::main]
async fn main() {
    match do_main().await {
        Ok(s) => println!("{}", s),
        Err(e) => error!("{:#}", e),
    }
}
