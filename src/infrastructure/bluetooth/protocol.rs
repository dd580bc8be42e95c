//! Hub device protocols
//!
//! Service and characteristic identifiers of the three device classes, plus
//! the framing used on the LED-strip UART link.

use crate::domain::capability::CapabilityId;
use thiserror::Error;
use uuid::Uuid;

/// Nordic UART service exposed by the LED-strip controllers
pub fn uart_service() -> CapabilityId {
    CapabilityId::from_uuid(Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e))
}

/// UART TX: hub -> strip
pub fn uart_tx() -> CapabilityId {
    CapabilityId::from_uuid(Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e))
}

/// UART RX: strip -> hub (notify)
pub fn uart_rx() -> CapabilityId {
    CapabilityId::from_uuid(Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e))
}

/// Service advertised by the remote controller (phone app)
pub fn remote_service() -> CapabilityId {
    CapabilityId::from_uuid(Uuid::from_u128(0x12345678_1234_5678_1234_56789abc0010))
}

/// Commands typed on the remote (notify)
pub fn remote_command() -> CapabilityId {
    CapabilityId::from_uuid(Uuid::from_u128(0x12345679_1234_5678_1234_56789abc0010))
}

/// Hub state shown on the remote (write)
pub fn remote_devices() -> CapabilityId {
    CapabilityId::from_uuid(Uuid::from_u128(0x1234567a_1234_5678_1234_56789abc0010))
}

pub fn thermostat_service() -> CapabilityId {
    CapabilityId::from_uuid(Uuid::from_u128(0xa0b40001_926d_4d61_98df_8c5c62ee53b3))
}

/// Temperature x10, i16 LE (notify)
pub fn thermostat_temperature() -> CapabilityId {
    CapabilityId::from_uuid(Uuid::from_u128(0xa0b40002_926d_4d61_98df_8c5c62ee53b3))
}

/// Relative humidity x10, i16 LE (notify)
pub fn thermostat_humidity() -> CapabilityId {
    CapabilityId::from_uuid(Uuid::from_u128(0xa0b40003_926d_4d61_98df_8c5c62ee53b3))
}

/// Heating on/off flag, i16 LE (notify, write)
pub fn thermostat_on_off() -> CapabilityId {
    CapabilityId::from_uuid(Uuid::from_u128(0xa0b40004_926d_4d61_98df_8c5c62ee53b3))
}

/// Target temperature, i16 LE (notify, write)
pub fn thermostat_target() -> CapabilityId {
    CapabilityId::from_uuid(Uuid::from_u128(0xa0b40005_926d_4d61_98df_8c5c62ee53b3))
}

/// Start of every UART frame ('!')
pub const STX: u8 = 0x21;

/// STX, LEN and CHK wrap the payload
const FRAME_OVERHEAD: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Payload of {0} bytes does not fit in a frame")]
    TooLong(usize),
}

/// LED animation modes understood by the strip firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Color,
    Rainbow,
    Theater,
}

impl LedMode {
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            b'C' => Some(Self::Color),
            b'R' => Some(Self::Rainbow),
            b'T' => Some(Self::Theater),
            _ => None,
        }
    }

    pub fn selector(&self) -> u8 {
        match self {
            Self::Color => b'C',
            Self::Rainbow => b'R',
            Self::Theater => b'T',
        }
    }
}

/// Additive checksum, low byte inverted
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u32, |acc, &b| acc + b as u32);
    (sum & 0xFF) as u8 ^ 0xFF
}

/// Wrap `payload` as `STX ++ LEN ++ payload ++ CHK`
///
/// ```text
/// [0]     : STX (0x21)
/// [1]     : LEN = payload length + 3
/// [2..n]  : payload (mode, strip, raw color bytes)
/// [n]     : CHK = (sum of all previous bytes & 0xFF) ^ 0xFF
/// ```
pub fn build_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = payload.len() + FRAME_OVERHEAD;
    let len = u8::try_from(len).map_err(|_| FrameError::TooLong(payload.len()))?;

    let mut frame = Vec::with_capacity(len as usize);
    frame.push(STX);
    frame.push(len);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame));
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_frame() {
        let payload = [b'C', b'1', 0xFF, 0x00, 0x00];
        let frame = build_frame(&payload).unwrap();

        assert_eq!(frame.len(), payload.len() + 3);
        assert_eq!(frame[0], 0x21);
        assert_eq!(frame[1], 8);
        assert_eq!(&frame[2..7], &payload);

        let sum: u32 = [0x21u32, 8, b'C' as u32, b'1' as u32, 0xFF, 0x00, 0x00].iter().sum();
        assert_eq!(frame[7], ((sum & 0xFF) as u8) ^ 0xFF);
        assert_eq!(frame[7], 0x63);
    }

    #[test]
    fn test_checksum_wraps() {
        // 0xFF + 0x02 = 0x101 -> low byte 0x01 -> inverted 0xFE
        assert_eq!(checksum(&[0xFF, 0x02]), 0xFE);
        assert_eq!(checksum(&[]), 0xFF);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        assert!(build_frame(&[0u8; 252]).is_ok());
        assert_eq!(build_frame(&[0u8; 253]), Err(FrameError::TooLong(253)));
    }

    #[test]
    fn test_mode_alphabet() {
        assert_eq!(LedMode::from_selector(b'R'), Some(LedMode::Rainbow));
        assert_eq!(LedMode::from_selector(b'X'), None);
        assert_eq!(LedMode::Theater.selector(), b'T');
    }

    #[test]
    fn test_ids_are_distinct_long_ids() {
        assert_eq!(uart_service().to_string(), "6e400001-b5a3-f393-e0a9-e50e24dcca9e");
        assert_eq!(remote_devices().as_bytes().len(), 16);
        assert_ne!(thermostat_on_off(), thermostat_target());
    }
}
