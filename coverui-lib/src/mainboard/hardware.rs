use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use super::{MainboardKind, MainboardPeer};
use crate::link::{SerialLink, Token};
use crate::protocol::yf::{self, ChecksumCodec, Frame};
use crate::protocol::Result;

/// A real mainboard on its own UART.
pub struct HardwareMainboard<T> {
    link: SerialLink<T, ChecksumCodec>,
}

impl<T> HardwareMainboard<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(link: SerialLink<T, ChecksumCodec>) -> Self {
        Self { link }
    }

    pub fn into_inner(self) -> SerialLink<T, ChecksumCodec> {
        self.link
    }
}

#[async_trait]
impl<T> MainboardPeer for HardwareMainboard<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn deliver(&mut self, data: &[u8]) -> Result<()> {
        self.link.send_raw(data).await
    }

    /// Tokens in arrival order. A candidate that stalls for a whole read
    /// timeout goes out raw, unless it may still become an LED status frame.
    async fn poll(&mut self) -> Result<Vec<Token<Frame>>> {
        match self.link.read_chunk().await? {
            Some(chunk) => {
                self.link.on_bytes(&chunk);
                let tokens = self.link.rx().drain_tokens();
                debug!("mainboard: {} tokens", tokens.len());
                Ok(tokens)
            }
            None => {
                let rx = self.link.rx();
                if yf::led_status_prefix(rx.held()) {
                    return Ok(Vec::new());
                }
                Ok(rx.flush().map(Token::Raw).into_iter().collect())
            }
        }
    }

    fn kind(&self) -> MainboardKind {
        MainboardKind::Hardware
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    #[tokio::test]
    async fn relays_bytes_and_cuts_frames() {
        let (ours, mut theirs) = duplex(64);
        let mut mainboard = HardwareMainboard::new(SerialLink::new(ours, ChecksumCodec));

        mainboard.deliver(&[0x01, 0x02]).await.unwrap();
        let mut buf = [0u8; 2];
        theirs.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x01, 0x02]);

        let poll = yf::encode(&[0x50, 0x62]).unwrap();
        theirs.write_all(&[0x00]).await.unwrap();
        theirs.write_all(&poll).await.unwrap();

        let mut tokens = Vec::new();
        while tokens.len() < 2 {
            tokens.extend(mainboard.poll().await.unwrap());
        }
        assert_eq!(tokens[0], Token::Raw(vec![0x00]));
        assert_eq!(tokens[1], Token::Frame(Frame::from_wire(&poll).unwrap()));
    }

    fn wire(tokens: Vec<Token<Frame>>) -> Vec<u8> {
        tokens
            .into_iter()
            .flat_map(|token| match token {
                Token::Raw(bytes) => bytes,
                Token::Frame(frame) => frame.into_bytes(),
            })
            .collect()
    }

    async fn relay_until(mainboard: &mut HardwareMainboard<DuplexStream>, len: usize) -> Vec<u8> {
        let mut relayed = Vec::new();
        for _ in 0..50 {
            if relayed.len() >= len {
                break;
            }
            relayed.extend(wire(mainboard.poll().await.unwrap()));
        }
        relayed
    }

    #[tokio::test]
    async fn stray_header_does_not_hold_back_traffic() {
        let (ours, mut theirs) = duplex(512);
        let mut mainboard = HardwareMainboard::new(SerialLink::new(ours, ChecksumCodec));

        let status = yf::encode(&[0x50, 0x84, 0x00, 0xFF, 0x01]).unwrap();
        let mut sent = vec![0x55, 0xAA, 0x7F];
        for _ in 0..20 {
            sent.extend_from_slice(&status);
        }
        theirs.write_all(&sent).await.unwrap();

        assert_eq!(relay_until(&mut mainboard, sent.len()).await, sent);
    }

    #[tokio::test]
    async fn truncated_frame_is_released_after_a_quiet_read() {
        let (ours, mut theirs) = duplex(64);
        let mut mainboard = HardwareMainboard::new(SerialLink::new(ours, ChecksumCodec));

        let sent = [0x55, 0xAA, 0x30, 0x50, 0x84, 0x01];
        theirs.write_all(&sent).await.unwrap();

        assert_eq!(relay_until(&mut mainboard, sent.len()).await, sent);
    }

    #[tokio::test]
    async fn partial_led_frame_waits_for_the_rest() {
        let (ours, mut theirs) = duplex(64);
        let mut mainboard = HardwareMainboard::new(SerialLink::new(ours, ChecksumCodec));

        let mut payload = vec![0x50, 0x8E];
        payload.extend_from_slice(&[0x00; 20]);
        let led = yf::encode(&payload).unwrap();

        theirs.write_all(&led[..8]).await.unwrap();
        for _ in 0..3 {
            assert!(mainboard.poll().await.unwrap().is_empty());
        }

        theirs.write_all(&led[8..]).await.unwrap();
        let mut tokens = Vec::new();
        while tokens.is_empty() {
            tokens = mainboard.poll().await.unwrap();
        }
        assert_eq!(tokens, vec![Token::Frame(Frame::from_wire(&led).unwrap())]);
    }
}
