//! Relay between the Cover UI UART and a mainboard peer.
//!
//! Cover UI bytes go to the mainboard untouched and are inspected on the
//! side for button reports. Mainboard traffic goes to the Cover UI
//! untouched, except LED status frames which carry the local LED registry.

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::board::{mapping, BoardConfig};
use crate::link::{SerialLink, Token};
use crate::mainboard::MainboardPeer;
use crate::protocol::yf::{ChecksumCodec, Frame, Kind};
use crate::protocol::{hex_dump, Result};
use crate::state::{ButtonRegistry, LedRegistry};

pub struct CoverUiBridge<T> {
    cover_ui: SerialLink<T, ChecksumCodec>,
    mainboard: Box<dyn MainboardPeer>,
    config: BoardConfig,
    buttons: Arc<ButtonRegistry>,
    leds: Arc<LedRegistry>,
}

impl<T> CoverUiBridge<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        cover_ui: SerialLink<T, ChecksumCodec>,
        mainboard: Box<dyn MainboardPeer>,
        config: BoardConfig,
        buttons: Arc<ButtonRegistry>,
        leds: Arc<LedRegistry>,
    ) -> Self {
        Self {
            cover_ui,
            mainboard,
            config,
            buttons,
            leds,
        }
    }

    /// Relays until `cancel` fires or one of the links fails.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            "bridging cover ui for {} to {} mainboard",
            self.config,
            self.mainboard.kind()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("bridge stopped");
                    return Ok(());
                }
                chunk = self.cover_ui.read_chunk() => {
                    if let Some(chunk) = chunk? {
                        self.from_cover_ui(&chunk).await?;
                    }
                }
                tokens = self.mainboard.poll() => {
                    for token in tokens? {
                        self.to_cover_ui(token).await?;
                    }
                }
            }
        }
    }

    async fn from_cover_ui(&mut self, chunk: &[u8]) -> Result<()> {
        self.mainboard.deliver(chunk).await?;

        self.cover_ui.on_bytes(chunk);
        while let Some(frame) = self.cover_ui.next_frame() {
            self.inspect(&frame);
        }
        Ok(())
    }

    fn inspect(&self, frame: &Frame) {
        match frame.kind() {
            Some(Kind::ReleaseAck) => debug!("release ack: {}", hex_dump(frame.as_bytes())),
            Some(Kind::Status) => debug!("status: {}", hex_dump(frame.as_bytes())),
            Some(Kind::Ping) => debug!("ping"),
            Some(Kind::ButtonReport) => {
                match mapping::apply_button_report(&self.config, &self.buttons, frame, Instant::now())
                {
                    Ok(0) => {}
                    Ok(changed) => debug!("{} buttons changed", changed),
                    Err(e) => warn!("button report ignored: {}", e),
                }
            }
            _ => info!("cover ui: {}", hex_dump(frame.as_bytes())),
        }
    }

    async fn to_cover_ui(&mut self, token: Token<Frame>) -> Result<()> {
        match token {
            Token::Raw(bytes) => self.cover_ui.send_raw(&bytes).await,
            Token::Frame(mut frame) => {
                if frame.is(Kind::LedStatus) {
                    mapping::patch_led_frame(&self.config, &self.leds, &mut frame);
                } else {
                    debug!("mainboard: {}", hex_dump(frame.as_bytes()));
                }
                self.cover_ui.send_raw(frame.as_bytes()).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::SCRIPT;
    use crate::mainboard::{HardwareMainboard, VirtualMainboard};
    use crate::state::{Button, Led, LedMode, Level};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;
    use tokio::time::sleep;

    fn classic() -> BoardConfig {
        BoardConfig::for_model("500Classic").unwrap()
    }

    async fn recv(link: &mut SerialLink<DuplexStream, ChecksumCodec>) -> Frame {
        loop {
            if let Some(frame) = link.recv_frame().await.unwrap() {
                return frame;
            }
        }
    }

    struct Rig {
        cover_ui: SerialLink<DuplexStream, ChecksumCodec>,
        buttons: Arc<ButtonRegistry>,
        leds: Arc<LedRegistry>,
        cancel: CancellationToken,
        task: JoinHandle<Result<()>>,
    }

    fn virtual_rig(leds: Arc<LedRegistry>) -> Rig {
        let _ = env_logger::builder().is_test(true).try_init();
        let (ours, theirs) = duplex(512);
        let buttons = Arc::new(ButtonRegistry::new());
        let mainboard = VirtualMainboard::new(classic(), Arc::clone(&leds)).unwrap();
        let bridge = CoverUiBridge::new(
            SerialLink::new(ours, ChecksumCodec),
            Box::new(mainboard),
            classic(),
            Arc::clone(&buttons),
            Arc::clone(&leds),
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(bridge.run(cancel.clone()));

        Rig {
            cover_ui: SerialLink::new(theirs, ChecksumCodec),
            buttons,
            leds,
            cancel,
            task,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn virtual_mainboard_session() {
        let leds = Arc::new(LedRegistry::new());
        leds.set_mode(Led::Lifted, LedMode::On);
        let mut rig = virtual_rig(leds);

        for (expected, response) in SCRIPT {
            rig.cover_ui.send_raw(expected).await.unwrap();
            if response.is_empty() {
                break;
            }
            assert_eq!(recv(&mut rig.cover_ui).await.as_bytes(), *response);
        }

        let led_frame = loop {
            let frame = recv(&mut rig.cover_ui).await;
            if frame.is(Kind::LedStatus) {
                break frame;
            }
        };
        assert_eq!(led_frame.as_bytes()[5], 0x10);
        assert!(led_frame.checksum_valid());

        let mut report = vec![0x50, 0x62];
        report.extend_from_slice(&[0x00, 0x00, 0x00, 0x02, 0, 0, 0, 0, 0, 0, 0, 0]);
        rig.cover_ui
            .send(&Frame::new(&report).unwrap())
            .await
            .unwrap();

        for _ in 0..50 {
            if rig.buttons.level(Button::Lock) == Level::Pressed {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(rig.buttons.level(Button::Lock), Level::Pressed);
        assert_eq!(rig.buttons.level(Button::S1), Level::Released);

        rig.leds.set_mode(Led::Lifted, LedMode::FlashFast);
        let updated = loop {
            let frame = recv(&mut rig.cover_ui).await;
            if frame.is(Kind::LedStatus) && frame.as_bytes()[5] == 0x22 {
                break frame;
            }
        };
        assert!(updated.checksum_valid());

        rig.cancel.cancel();
        assert!(rig.task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn short_button_report_changes_nothing() {
        let mut rig = virtual_rig(Arc::new(LedRegistry::new()));

        let report = Frame::new(&[0x50, 0x62, 0x02, 0x02]).unwrap();
        rig.cover_ui.send(&report).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(rig.buttons.level(Button::Clock), Level::Released);
        assert_eq!(rig.buttons.level(Button::S1), Level::Released);

        rig.cancel.cancel();
        assert!(rig.task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn hardware_relay_patches_led_frames_only() {
        let (cover_ours, cover_theirs) = duplex(512);
        let (main_ours, mut main_theirs) = duplex(512);
        let buttons = Arc::new(ButtonRegistry::new());
        let leds = Arc::new(LedRegistry::new());
        leds.set_mode(Led::Signal, LedMode::FlashSlow);

        let bridge = CoverUiBridge::new(
            SerialLink::new(cover_ours, ChecksumCodec),
            Box::new(HardwareMainboard::new(SerialLink::new(
                main_ours,
                ChecksumCodec,
            ))),
            classic(),
            Arc::clone(&buttons),
            Arc::clone(&leds),
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(bridge.run(cancel.clone()));
        let mut cover_ui = SerialLink::new(cover_theirs, ChecksumCodec);

        // cover ui -> mainboard is byte for byte
        let ping = [0x55, 0xAA, 0x03, 0x40, 0x01, 0x00, 0x43];
        cover_ui.send_raw(&[0x01]).await.unwrap();
        cover_ui.send_raw(&ping).await.unwrap();
        let mut relayed = [0u8; 8];
        main_theirs.read_exact(&mut relayed).await.unwrap();
        assert_eq!(relayed[0], 0x01);
        assert_eq!(relayed[1..], ping);

        // mainboard -> cover ui: a status frame passes, an led frame is patched
        let status = [0x55, 0xAA, 0x05, 0x50, 0x84, 0x00, 0xFF, 0x01, 0xD8];
        let mut upstream = vec![0x50, 0x8E];
        upstream.extend_from_slice(&[0x10; 20]);
        let upstream = Frame::new(&upstream).unwrap();
        main_theirs.write_all(&status).await.unwrap();
        main_theirs.write_all(upstream.as_bytes()).await.unwrap();

        assert_eq!(recv(&mut cover_ui).await.as_bytes(), status);
        let patched = recv(&mut cover_ui).await;
        assert!(patched.checksum_valid());
        assert_eq!(patched.as_bytes()[5], 0x00);
        assert_eq!(patched.as_bytes()[6], 0x20);
        assert_eq!(patched.as_bytes()[5 + 18], 0x10);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn mainboard_disconnect_ends_the_bridge() {
        let (cover_ours, _cover_theirs) = duplex(64);
        let (main_ours, main_theirs) = duplex(64);
        drop(main_theirs);

        let bridge = CoverUiBridge::new(
            SerialLink::new(cover_ours, ChecksumCodec),
            Box::new(HardwareMainboard::new(SerialLink::new(
                main_ours,
                ChecksumCodec,
            ))),
            classic(),
            Arc::new(ButtonRegistry::new()),
            Arc::new(LedRegistry::new()),
        );
        assert!(bridge.run(CancellationToken::new()).await.is_err());
    }
}
