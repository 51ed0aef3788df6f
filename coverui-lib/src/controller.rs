//! Owns the tasks of one board model and swaps them on a model change.

use anyhow::Context;
use log::{debug, info, warn};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::board::BoardConfig;
use crate::bridge::CoverUiBridge;
use crate::gpio::{ButtonPoller, LedDriver};
use crate::io::DigitalIo;
use crate::link::SerialLink;
use crate::mainboard::{HardwareMainboard, MainboardKind, MainboardPeer, VirtualMainboard};
use crate::protocol::yf::ChecksumCodec;
use crate::protocol::Result;
use crate::settings::BridgeSettings;
use crate::state::{Button, ButtonRegistry, Led, LedMode, LedRegistry, Level, Listener, ListenerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRole {
    CoverUi,
    Mainboard,
}

impl Display for PortRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortRole::CoverUi => "cover ui".fmt(f),
            PortRole::Mainboard => "mainboard".fmt(f),
        }
    }
}

/// Source of the byte ports the bridge runs on.
pub trait PortFactory: Send + Sync {
    type Port: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn open(&self, role: PortRole) -> Result<Self::Port>;
}

struct Task {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

impl Task {
    fn spawn<Fut>(name: &'static str, body: impl FnOnce(CancellationToken) -> Fut) -> Self
    where
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(body(cancel.clone()));
        debug!("{} task started", name);
        Task {
            name,
            cancel,
            handle,
        }
    }

    async fn stop(self) {
        self.cancel.cancel();
        match self.handle.await {
            Ok(Ok(())) => debug!("{} task stopped", self.name),
            Ok(Err(e)) => warn!("{} task ended with error: {:#}", self.name, e),
            Err(e) => warn!("{} task aborted: {}", self.name, e),
        }
    }
}

pub struct CoverUiController<F: PortFactory> {
    ports: F,
    io: Arc<dyn DigitalIo>,
    settings: BridgeSettings,
    config: BoardConfig,
    buttons: Arc<ButtonRegistry>,
    leds: Arc<LedRegistry>,
    led_task: Option<Task>,
    bridge_task: Option<Task>,
    button_task: Option<Task>,
}

impl<F: PortFactory> CoverUiController<F> {
    pub fn new(
        model: &str,
        ports: F,
        io: Arc<dyn DigitalIo>,
        settings: BridgeSettings,
    ) -> Result<Self> {
        Ok(CoverUiController {
            ports,
            io,
            settings,
            config: BoardConfig::for_model(model)?,
            buttons: Arc::new(ButtonRegistry::new()),
            leds: Arc::new(LedRegistry::new()),
            led_task: None,
            bridge_task: None,
            button_task: None,
        })
    }

    pub fn config(&self) -> BoardConfig {
        self.config
    }

    pub fn buttons(&self) -> Arc<ButtonRegistry> {
        Arc::clone(&self.buttons)
    }

    pub fn leds(&self) -> Arc<LedRegistry> {
        Arc::clone(&self.leds)
    }

    pub fn is_running(&self) -> bool {
        self.led_task.is_some() || self.bridge_task.is_some() || self.button_task.is_some()
    }

    pub fn is_bridging(&self) -> bool {
        self.bridge_task
            .as_ref()
            .map_or(false, |task| !task.handle.is_finished())
    }

    pub fn set_led_mode(&self, led: Led, mode: LedMode) -> bool {
        self.leds.set_mode(led, mode)
    }

    pub fn set_all_leds(&self, mode: LedMode) -> bool {
        self.leds.set_all(mode)
    }

    pub fn led_mode(&self, led: Led) -> LedMode {
        self.leds.mode(led)
    }

    pub fn button_level(&self, button: Button) -> Level {
        self.buttons.level(button)
    }

    pub fn add_button_listener(&self, listener: Listener) -> ListenerId {
        self.buttons.add_listener(listener)
    }

    pub fn remove_button_listener(&self, id: ListenerId) -> bool {
        self.buttons.remove_listener(id)
    }

    /// Starts the pin tasks, then the bridge if the model talks UART.
    ///
    /// A bridge that cannot start is an error, the pin tasks keep running.
    /// Calling again starts whatever is missing.
    pub async fn start(&mut self) -> Result<()> {
        let wants_bridge = self.config.has_serial_communication();
        if self.led_task.is_some()
            && self.button_task.is_some()
            && (!wants_bridge || self.is_bridging())
        {
            debug!("{} already running", self.config);
            return Ok(());
        }
        info!("starting {}", self.config);

        if self.led_task.is_none() {
            let driver = LedDriver::new(self.config, Arc::clone(&self.io), Arc::clone(&self.leds));
            self.led_task = Some(Task::spawn("led", |cancel| driver.run(cancel)));
        }

        if self.button_task.is_none() {
            let poller =
                ButtonPoller::new(self.config, Arc::clone(&self.io), Arc::clone(&self.buttons));
            self.button_task = Some(Task::spawn("button", |cancel| poller.run(cancel)));
        }

        if wants_bridge {
            if let Some(task) = self.bridge_task.take() {
                task.stop().await;
            }
            let bridge = self
                .build_bridge()
                .with_context(|| format!("starting bridge for {}", self.config))?;
            self.bridge_task = Some(Task::spawn("bridge", |cancel| bridge.run(cancel)));
        }
        Ok(())
    }

    fn build_bridge(&self) -> Result<CoverUiBridge<F::Port>> {
        let settings = &self.settings;
        let mut cover_ui = SerialLink::with_capacity(
            self.ports.open(PortRole::CoverUi)?,
            ChecksumCodec,
            settings.buffer_capacity,
        );
        cover_ui.set_read_timeout(settings.read_timeout);

        let mainboard: Box<dyn MainboardPeer> = match settings.mainboard {
            MainboardKind::Hardware => {
                let mut link = SerialLink::with_capacity(
                    self.ports.open(PortRole::Mainboard)?,
                    ChecksumCodec,
                    settings.buffer_capacity,
                );
                link.set_read_timeout(settings.read_timeout);
                Box::new(HardwareMainboard::new(link))
            }
            MainboardKind::Virtual => Box::new(
                VirtualMainboard::new(self.config, Arc::clone(&self.leds))?
                    .with_period(settings.emit_period)
                    .with_backoff(settings.handshake_backoff),
            ),
        };

        Ok(CoverUiBridge::new(
            cover_ui,
            mainboard,
            self.config,
            Arc::clone(&self.buttons),
            Arc::clone(&self.leds),
        ))
    }

    /// Stops the LED task, then the bridge (closing its ports), then the
    /// button task.
    pub async fn stop(&mut self) {
        for task in [
            self.led_task.take(),
            self.bridge_task.take(),
            self.button_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.stop().await;
        }
    }

    /// Tears everything down, waits for the peer to go quiet and starts
    /// again with `model`. Registries are cleared, listeners survive.
    ///
    /// An unknown model is rejected before anything is stopped.
    pub async fn change_model(&mut self, model: &str) -> Result<()> {
        let config = BoardConfig::for_model(model)?;
        info!("changing model {} -> {}", self.config, config);

        self.stop().await;
        sleep(self.settings.settle_delay).await;

        self.config = config;
        self.buttons.reset();
        self.leds.reset();
        self.start().await
    }

    /// Waits until the bridge task ends on its own, or forever without one.
    pub async fn bridge_finished(&mut self) -> Result<()> {
        match self.bridge_task.as_mut() {
            Some(task) => {
                let result = (&mut task.handle).await;
                self.bridge_task = None;
                result?
            }
            None => std::future::pending().await,
        }
    }
}

impl<F: PortFactory> Drop for CoverUiController<F> {
    fn drop(&mut self) {
        for task in [&self.led_task, &self.bridge_task, &self.button_task]
            .into_iter()
            .flatten()
        {
            task.cancel.cancel();
        }
    }
}
