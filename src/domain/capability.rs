//! BLE capability identifiers (service / characteristic UUIDs).
//!
//! Peripherals advertise multi-byte identifiers least significant byte first.
//! Everything inside the hub keeps them in canonical (big-endian, as printed)
//! order and converts at the wire boundary.

use std::fmt;
use uuid::Uuid;

/// Bluetooth base UUID `0000xxxx-0000-1000-8000-00805f9b34fb`, short id zeroed
const BASE_UUID: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb,
];

/// Swap a 2-byte id, reverse a 16-byte id, leave anything else as is
pub fn normalize(bytes: &[u8]) -> Vec<u8> {
    match bytes.len() {
        2 => vec![bytes[1], bytes[0]],
        16 => bytes.iter().rev().copied().collect(),
        _ => bytes.to_vec(),
    }
}

/// A 2- or 16-byte identifier in canonical byte order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityId(Vec<u8>);

impl CapabilityId {
    /// Parse `"180f"` or `"6e400001-b5a3-f393-e0a9-e50e24dcca9e"`
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let compact = text.replace('-', "");
        match compact.len() {
            4 | 32 => Ok(Self(hex::decode(&compact)?)),
            _ => Err(anyhow::anyhow!("Invalid capability id: {}", text)),
        }
    }

    /// Build from identifier bytes exactly as advertised over the air
    pub fn from_wire(bytes: &[u8]) -> Self {
        Self(normalize(bytes))
    }

    /// Build from a full UUID, collapsing 16-bit ids on the base UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        let bytes = uuid.as_bytes();
        if bytes[0..2] == BASE_UUID[0..2] && bytes[4..] == BASE_UUID[4..] {
            Self(bytes[2..4].to_vec())
        } else {
            Self(bytes.to_vec())
        }
    }

    /// Full 128-bit form, expanding 16-bit ids onto the base UUID
    pub fn to_uuid(&self) -> Uuid {
        match self.0.len() {
            2 => {
                let mut bytes = BASE_UUID;
                bytes[2] = self.0[0];
                bytes[3] = self.0[1];
                Uuid::from_bytes(bytes)
            }
            _ => {
                let mut bytes = [0u8; 16];
                let n = self.0.len().min(16);
                bytes[..n].copy_from_slice(&self.0[..n]);
                Uuid::from_bytes(bytes)
            }
        }
    }

    /// Bytes as they appear over the air
    pub fn to_wire(&self) -> Vec<u8> {
        normalize(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            16 => write!(f, "{}", self.to_uuid()),
            _ => f.write_str(&hex::encode(&self.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_bytes_are_swapped() {
        assert_eq!(normalize(&[0x0f, 0x18]), vec![0x18, 0x0f]);
        let id = CapabilityId::from_wire(&[0x0f, 0x18]);
        assert_eq!(id, CapabilityId::parse("180f").unwrap());
        assert_eq!(id.to_wire(), vec![0x0f, 0x18]);
    }

    #[test]
    fn test_long_id_bytes_are_fully_reversed() {
        let wire = [
            0x9e, 0xca, 0xdc, 0x24, 0x0e, 0xe5, 0xa9, 0xe0, 0x93, 0xf3, 0xa3, 0xb5, 0x01, 0x00,
            0x40, 0x6e,
        ];
        let id = CapabilityId::from_wire(&wire);
        assert_eq!(
            id,
            CapabilityId::parse("6e400001-b5a3-f393-e0a9-e50e24dcca9e").unwrap()
        );
        assert_eq!(id.to_string(), "6e400001-b5a3-f393-e0a9-e50e24dcca9e");
    }

    #[test]
    fn test_other_lengths_untouched() {
        assert_eq!(normalize(&[1, 2, 3, 4]), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_base_uuid_collapses_to_short_id() {
        let uuid = Uuid::parse_str("0000180f-0000-1000-8000-00805f9b34fb").unwrap();
        let id = CapabilityId::from_uuid(uuid);
        assert_eq!(id.as_bytes(), &[0x18, 0x0f]);
        assert_eq!(id.to_uuid(), uuid);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CapabilityId::parse("12345").is_err());
        assert!(CapabilityId::parse("zzzz").is_err());
    }
}
