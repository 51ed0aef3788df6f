//! COBS framed messages of the OpenMower Cover UI protocol.
//!
//! Decoded layout is `TYPE data.. CRC16`, the CRC being CRC-16/IBM-3740
//! (CCITT-FALSE) over type and data, stored little-endian. On the wire the
//! whole message is COBS encoded and terminated by a single zero byte.

use std::fmt;

use crc::{Crc, CRC_16_IBM_3740};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

use super::{hex_dump, FrameCodec, ProtocolError, Scan};
use crate::state::{Led, LedMode, LedRegistry};

pub const DELIMITER: u8 = 0x00;
/// Type byte, at least one data byte and the CRC.
pub const MIN_DECODED_LEN: usize = 4;
pub const LED_SLOTS: usize = 18;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

pub fn crc16(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum MessageType {
    GetVersion = 0xB0,
    SetBuzzer = 0xB1,
    SetLeds = 0xB2,
    GetButton = 0xB3,
    GetEmergency = 0xB4,
    GetRain = 0xB5,
    GetSubscribe = 0xB6,
}

/// A decoded, CRC checked message.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(kind: u8, data: &[u8]) -> Self {
        Frame {
            kind,
            data: data.to_vec(),
        }
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.kind)
    }

    /// `TYPE data.. CRC16`, not yet COBS encoded.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data.len() + 3);
        bytes.push(self.kind);
        bytes.extend_from_slice(&self.data);
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes
    }

    /// Checks size and CRC of a decoded message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < MIN_DECODED_LEN {
            return Err(ProtocolError::TooShort(bytes.len()));
        }

        let (body, tail) = bytes.split_at(bytes.len() - 2);
        let actual = u16::from_le_bytes([tail[0], tail[1]]);
        let expected = crc16(body);
        if expected != actual {
            return Err(ProtocolError::CrcMismatch { expected, actual });
        }

        Ok(Frame::new(body[0], &body[1..]))
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OmFrame[{:02X}: {}]", self.kind, hex_dump(&self.data))
    }
}

pub fn encode(bytes: &[u8]) -> Vec<u8> {
    cobs::encode_vec(bytes)
}

/// Decodes one COBS span, delimiter excluded.
pub fn decode(span: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    cobs::decode_vec(span).map_err(|_| ProtocolError::BadCobs)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CobsCodec;

impl FrameCodec for CobsCodec {
    type Frame = Frame;

    fn scan(&self, buf: &[u8]) -> Scan<Frame> {
        let end = match buf.iter().position(|&b| b == DELIMITER) {
            Some(end) => end,
            None => return Scan::Incomplete,
        };

        if end == 0 {
            return Scan::Skip(1);
        }

        let consumed = end + 1;
        match decode(&buf[..end]).and_then(|bytes| Frame::from_bytes(&bytes)) {
            Ok(frame) => Scan::Frame { frame, consumed },
            Err(error) => Scan::Invalid { error, consumed },
        }
    }

    fn to_wire(&self, frame: &Frame) -> Vec<u8> {
        let mut wire = encode(&frame.to_bytes());
        wire.push(DELIMITER);
        wire
    }
}

/// 18 LEDs at three bits each.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LedBits(pub u64);

impl LedBits {
    pub fn get(&self, slot: usize) -> Option<LedMode> {
        if slot >= LED_SLOTS {
            return None;
        }
        LedMode::from_om_bits(((self.0 >> (3 * slot)) & 0b111) as u8)
    }

    pub fn set(&mut self, slot: usize, mode: LedMode) {
        if slot >= LED_SLOTS {
            return;
        }
        let shift = 3 * slot;
        self.0 = (self.0 & !(0b111 << shift)) | ((mode.om_bits() as u64) << shift);
    }

    /// Packs the registry into the 18 slots. `HoursTen` has no slot.
    pub fn from_registry(leds: &LedRegistry) -> Self {
        let modes = leds.snapshot();
        let mut bits = LedBits::default();
        for (slot, led) in Led::ALL
            .iter()
            .filter(|&&led| led != Led::HoursTen)
            .enumerate()
        {
            bits.set(slot, modes[led.index()]);
        }
        bits
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    GetVersion { version: u16 },
    SetBuzzer { repeat: u8, on_time: u8, off_time: u8 },
    SetLeds { leds: LedBits },
    Button { id: u16, press_duration: u8 },
    Emergency { state: u8 },
    Rain { value: u32, threshold: u32 },
    Subscribe { topics: u8, interval: u16 },
    Unknown(Frame),
}

fn field<const N: usize>(frame: &Frame, offset: usize) -> Result<[u8; N], ProtocolError> {
    frame
        .data
        .get(offset..offset + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(ProtocolError::TooShort(frame.data.len() + 3))
}

impl Message {
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let kind = match frame.message_type() {
            Some(kind) => kind,
            None => return Ok(Message::Unknown(frame.clone())),
        };

        Ok(match kind {
            MessageType::GetVersion => Message::GetVersion {
                version: u16::from_le_bytes(field(frame, 0)?),
            },
            MessageType::SetBuzzer => {
                let [repeat, on_time, off_time] = field::<3>(frame, 0)?;
                Message::SetBuzzer {
                    repeat,
                    on_time,
                    off_time,
                }
            }
            // First data byte is padding.
            MessageType::SetLeds => Message::SetLeds {
                leds: LedBits(u64::from_le_bytes(field(frame, 1)?)),
            },
            MessageType::GetButton => Message::Button {
                id: u16::from_le_bytes(field(frame, 0)?),
                press_duration: field::<1>(frame, 2)?[0],
            },
            MessageType::GetEmergency => Message::Emergency {
                state: field::<1>(frame, 0)?[0],
            },
            MessageType::GetRain => Message::Rain {
                value: u32::from_le_bytes(field(frame, 0)?),
                threshold: u32::from_le_bytes(field(frame, 4)?),
            },
            MessageType::GetSubscribe => Message::Subscribe {
                topics: field::<1>(frame, 0)?[0],
                interval: u16::from_le_bytes(field(frame, 1)?),
            },
        })
    }

    pub fn to_frame(&self) -> Frame {
        let (kind, data) = match self {
            Message::GetVersion { version } => {
                (MessageType::GetVersion, version.to_le_bytes().to_vec())
            }
            Message::SetBuzzer {
                repeat,
                on_time,
                off_time,
            } => (MessageType::SetBuzzer, vec![*repeat, *on_time, *off_time]),
            Message::SetLeds { leds } => {
                let mut data = vec![0u8];
                data.extend_from_slice(&leds.0.to_le_bytes());
                (MessageType::SetLeds, data)
            }
            Message::Button { id, press_duration } => {
                let mut data = id.to_le_bytes().to_vec();
                data.push(*press_duration);
                (MessageType::GetButton, data)
            }
            Message::Emergency { state } => (MessageType::GetEmergency, vec![*state]),
            Message::Rain { value, threshold } => {
                let mut data = value.to_le_bytes().to_vec();
                data.extend_from_slice(&threshold.to_le_bytes());
                (MessageType::GetRain, data)
            }
            Message::Subscribe { topics, interval } => {
                let mut data = vec![*topics];
                data.extend_from_slice(&interval.to_le_bytes());
                (MessageType::GetSubscribe, data)
            }
            Message::Unknown(frame) => return frame.clone(),
        };
        Frame::new(kind as u8, &data)
    }
}

/// Builds the reply to a `Get_Version` request: the request echoed back with
/// `version` patched into its version field.
pub fn version_reply(request: &Frame, version: u16) -> Option<Frame> {
    if request.message_type() != Some(MessageType::GetVersion) || request.data.len() < 2 {
        return None;
    }
    let mut reply = request.clone();
    reply.data[..2].copy_from_slice(&version.to_le_bytes());
    Some(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn crc_matches_ccitt_false_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn get_version_on_the_wire() {
        let frame = Message::GetVersion { version: 10 }.to_frame();
        let bytes = frame.to_bytes();
        assert_eq!(bytes[..3], [0xB0, 0x0A, 0x00]);

        let wire = CobsCodec.to_wire(&frame);
        assert_eq!(wire.last(), Some(&DELIMITER));
        assert!(!wire[..wire.len() - 1].contains(&DELIMITER));

        match CobsCodec.scan(&wire) {
            Scan::Frame { frame: parsed, consumed } => {
                assert_eq!(consumed, wire.len());
                assert_eq!(parsed, frame);
            }
            other => panic!("unexpected scan result {:?}", other),
        }
    }

    #[test]
    fn too_short_after_decode() {
        assert_eq!(
            Frame::from_bytes(&[0xB0, 0x01, 0x02]),
            Err(ProtocolError::TooShort(3))
        );
    }

    #[test]
    fn crc_mismatch_is_reported() {
        let mut bytes = Message::Emergency { state: 1 }.to_frame().to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            Frame::from_bytes(&bytes),
            Err(ProtocolError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn invalid_span_is_dropped_with_its_delimiter() {
        let mut wire = vec![0x03, 0x11, 0x22, 0x00];
        wire.extend(CobsCodec.to_wire(&Message::Emergency { state: 1 }.to_frame()));

        match CobsCodec.scan(&wire) {
            Scan::Invalid { consumed, error } => {
                assert_eq!(consumed, 4);
                assert_eq!(error, ProtocolError::TooShort(2));
            }
            other => panic!("unexpected scan result {:?}", other),
        }
        assert!(matches!(CobsCodec.scan(&wire[4..]), Scan::Frame { .. }));
    }

    #[test]
    fn leading_delimiter_is_skipped() {
        assert_eq!(CobsCodec.scan(&[0x00, 0x02]), Scan::<Frame>::Skip(1));
        assert_eq!(CobsCodec.scan(&[0x02, 0x11]), Scan::<Frame>::Incomplete);
    }

    #[test]
    fn version_reply_patches_the_request() {
        let request = Frame::new(MessageType::GetVersion as u8, &[0x00, 0x00]);
        let reply = version_reply(&request, 10).unwrap();
        assert_eq!(
            Message::decode(&reply).unwrap(),
            Message::GetVersion { version: 10 }
        );
        assert!(version_reply(&Frame::new(0xB3, &[0, 0, 0]), 10).is_none());
    }

    #[test]
    fn led_bits_layout() {
        let mut leds = LedBits::default();
        leds.set(0, LedMode::On);
        leds.set(1, LedMode::FlashSlow);
        leds.set(17, LedMode::FlashFast);

        assert_eq!(leds.0 & 0b111_111, 0b101_111);
        assert_eq!((leds.0 >> 51) & 0b111, 0b110);
        assert_eq!(leds.get(1), Some(LedMode::FlashSlow));
        assert_eq!(leds.get(2), Some(LedMode::Off));
        assert_eq!(leds.get(18), None);

        leds.set(0, LedMode::Off);
        assert_eq!(leds.get(0), Some(LedMode::Off));
    }

    #[test]
    fn led_bits_from_registry_skip_hours_ten() {
        let leds = LedRegistry::new();
        leds.set_mode(Led::HoursEight, LedMode::On);
        leds.set_mode(Led::HoursTen, LedMode::On);
        leds.set_mode(Led::S1, LedMode::FlashFast);

        let bits = LedBits::from_registry(&leds);
        assert_eq!(bits.get(7), Some(LedMode::On));
        assert_eq!(bits.get(8), Some(LedMode::FlashFast));
        assert_eq!(bits.get(17), Some(LedMode::Off));
    }

    #[test]
    fn reserved_led_codes_decode_to_none() {
        assert_eq!(LedBits(0b001).get(0), None);
        assert_eq!(LedBits(0b100).get(0), None);
    }

    #[test]
    fn set_leds_round_trip() {
        let mut leds = LedBits::default();
        leds.set(4, LedMode::On);
        let message = Message::SetLeds { leds };
        let frame = message.to_frame();
        assert_eq!(frame.data.len(), 9);
        assert_eq!(Message::decode(&frame).unwrap(), message);
    }

    #[test]
    fn unknown_type_is_kept() {
        let frame = Frame::new(0x42, &[1, 2]);
        assert_eq!(Message::decode(&frame).unwrap(), Message::Unknown(frame));
    }

    proptest! {
        #[test]
        fn cobs_round_trip_has_no_inner_zero(
            mut payload in proptest::collection::vec(any::<u8>(), 1..=200),
            zero_at in any::<prop::sample::Index>(),
        ) {
            let at = zero_at.index(payload.len());
            payload[at] = 0;

            let encoded = encode(&payload);
            prop_assert!(!encoded.contains(&DELIMITER));
            prop_assert_eq!(decode(&encoded).unwrap(), payload);
        }
    }
}
