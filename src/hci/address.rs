use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bluetooth device address, stored the way it travels on the wire
/// (least significant byte first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    pub const ZERO: BdAddr = BdAddr([0; 6]);

    pub fn from_wire(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Build from the human-readable order (most significant byte first)
    pub fn from_display(bytes: [u8; 6]) -> Self {
        let mut wire = bytes;
        wire.reverse();
        Self(wire)
    }

    pub fn from_wire_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn wire_bytes(&self) -> [u8; 6] {
        self.0
    }

    pub fn display_bytes(&self) -> [u8; 6] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.display_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Error for address strings that are not six colon separated hex octets
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid Bluetooth address: {0}")]
pub struct ParseBdAddrError(String);

impl FromStr for BdAddr {
    type Err = ParseBdAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| ParseBdAddrError(s.to_owned()))?;
            if part.len() != 2 {
                return Err(ParseBdAddrError(s.to_owned()));
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseBdAddrError(s.to_owned()))?;
        }
        if parts.next().is_some() {
            return Err(ParseBdAddrError(s.to_owned()));
        }
        Ok(Self::from_display(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_reverses_wire_order() {
        let addr = BdAddr::from_wire([0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(addr.display_bytes(), [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn parses_display_form() {
        let addr: BdAddr = "00:1F:81:00:08:30".parse().unwrap();
        assert_eq!(addr.wire_bytes(), [0x30, 0x08, 0x00, 0x81, 0x1F, 0x00]);
        assert!("00:1F:81:00:08".parse::<BdAddr>().is_err());
        assert!("00:1F:81:00:08:30:11".parse::<BdAddr>().is_err());
        assert!("zz:1F:81:00:08:30".parse::<BdAddr>().is_err());
    }
}
