use super::address::BdAddr;
use super::command::{Opcode, Role};
use crate::error::PacketError;
use bitflags::bitflags;
use std::fmt;
use tracing::debug;

pub const EV_REMOTE_NAME_COMPLETE: u8 = 0x07;
pub const EV_CONNECT_COMPLETE: u8 = 0x03;
pub const EV_INCOMING_CONNECT: u8 = 0x04;
pub const EV_DISCONNECT_COMPLETE: u8 = 0x05;
pub const EV_COMMAND_COMPLETE: u8 = 0x0E;
pub const EV_COMMAND_STATUS: u8 = 0x0F;
pub const EV_ROLE_CHANGED: u8 = 0x12;
pub const EV_NUM_COMPLETE_PKT: u8 = 0x13;

/// Largest chunk the dongle delivers per interrupt transfer
pub const EVENT_CHUNK_LEN: usize = 16;

/// Bytes of the remote name kept for display and profile selection
pub const REMOTE_NAME_LEN: usize = 40;

bitflags! {
    /// Level-triggered HCI conditions. Ingestion sets them, the link step clears them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EventFlags: u8 {
        const COMMAND_COMPLETE = 0x01;
        const COMMAND_STATUS = 0x02;
        const CONNECT_COMPLETE = 0x04;
        const DISCONNECT_COMPLETE = 0x08;
        const INCOMING_REQUEST = 0x10;
        const REMOTE_NAME = 0x20;
    }
}

/// Null terminated device name from a Remote Name Request Complete event
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteName([u8; REMOTE_NAME_LEN]);

impl Default for RemoteName {
    fn default() -> Self {
        Self([0u8; REMOTE_NAME_LEN])
    }
}

impl RemoteName {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut name = [0u8; REMOTE_NAME_LEN];
        let len = bytes.len().min(REMOTE_NAME_LEN);
        name[..len].copy_from_slice(&bytes[..len]);
        Self(name)
    }

    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(REMOTE_NAME_LEN);
        &self.0[..end]
    }

    pub fn first_char(&self) -> Option<char> {
        self.as_bytes().first().map(|&b| b as char)
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl fmt::Display for RemoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for RemoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteName({:?})", self.to_string())
    }
}

/// Decoded HCI event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HciEvent {
    CommandComplete {
        packets: u8,
        opcode: Opcode,
        status: u8,
        parameters: Vec<u8>,
    },
    CommandStatus {
        status: u8,
        packets: u8,
        opcode: Opcode,
    },
    ConnectionComplete {
        status: u8,
        handle: u16,
    },
    DisconnectionComplete {
        status: u8,
        handle: u16,
        reason: u8,
    },
    ConnectionRequest {
        address: BdAddr,
        class: [u8; 3],
        link_type: u8,
    },
    RoleChange {
        status: u8,
        address: BdAddr,
        role: Role,
    },
    RemoteNameComplete {
        status: u8,
        address: BdAddr,
        name: RemoteName,
    },
    NumberOfCompletedPackets {
        handle: u16,
        count: u16,
    },
    Unknown {
        code: u8,
    },
}

fn require(buf: &[u8], needed: usize) -> Result<(), PacketError> {
    if buf.len() < needed {
        return Err(PacketError::Truncated {
            needed,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn le16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn address_at(buf: &[u8], at: usize) -> BdAddr {
    BdAddr::from_wire_slice(&buf[at..]).unwrap_or_default()
}

impl HciEvent {
    /// Decode a complete event buffer: `[code, parameter length, parameters..]`
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        require(buf, 2)?;
        let event = match buf[0] {
            EV_COMMAND_COMPLETE => {
                require(buf, 6)?;
                HciEvent::CommandComplete {
                    packets: buf[2],
                    opcode: Opcode::from_le_bytes([buf[3], buf[4]]),
                    status: buf[5],
                    parameters: buf[6..].to_vec(),
                }
            }
            EV_COMMAND_STATUS => {
                require(buf, 6)?;
                HciEvent::CommandStatus {
                    status: buf[2],
                    packets: buf[3],
                    opcode: Opcode::from_le_bytes([buf[4], buf[5]]),
                }
            }
            EV_CONNECT_COMPLETE => {
                require(buf, 5)?;
                HciEvent::ConnectionComplete {
                    status: buf[2],
                    handle: le16(buf, 3) & 0x0FFF,
                }
            }
            EV_DISCONNECT_COMPLETE => {
                require(buf, 6)?;
                HciEvent::DisconnectionComplete {
                    status: buf[2],
                    handle: le16(buf, 3) & 0x0FFF,
                    reason: buf[5],
                }
            }
            EV_INCOMING_CONNECT => {
                require(buf, 12)?;
                HciEvent::ConnectionRequest {
                    address: address_at(buf, 2),
                    class: [buf[8], buf[9], buf[10]],
                    link_type: buf[11],
                }
            }
            EV_ROLE_CHANGED => {
                require(buf, 10)?;
                HciEvent::RoleChange {
                    status: buf[2],
                    address: address_at(buf, 3),
                    role: Role::from(buf[9]),
                }
            }
            EV_REMOTE_NAME_COMPLETE => {
                require(buf, 9)?;
                HciEvent::RemoteNameComplete {
                    status: buf[2],
                    address: address_at(buf, 3),
                    name: RemoteName::from_bytes(&buf[9..]),
                }
            }
            EV_NUM_COMPLETE_PKT => {
                require(buf, 7)?;
                HciEvent::NumberOfCompletedPackets {
                    handle: le16(buf, 3) & 0x0FFF,
                    count: le16(buf, 5),
                }
            }
            code => HciEvent::Unknown { code },
        };
        Ok(event)
    }

    /// Text for a Disconnection Complete reason code
    pub fn disconnect_reason(reason: u8) -> &'static str {
        match reason {
            0x08 => "Connection Timeout",
            0x13 => "Remote User Terminated Connection",
            0x14 => "Remote Device Terminated Connection due to Low Resources",
            0x15 => "Remote Device Terminated Connection due to Power Off",
            0x16 => "Connection Terminated By Local Host",
            _ => "Unknown Reason",
        }
    }
}

/// Rebuilds whole events from the short interrupt transfers the dongle produces
#[derive(Debug, Default)]
pub struct EventAssembler {
    pending: Vec<u8>,
}

impl EventAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transfer. Returns a complete event buffer once the declared
    /// parameter length has arrived.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        if chunk.is_empty() {
            return None;
        }
        if self.pending.is_empty() && chunk[0] == 0x00 {
            return None;
        }
        self.pending.extend_from_slice(chunk);
        if self.pending.len() < 2 {
            return None;
        }

        let total = 2 + self.pending[1] as usize;
        if self.pending.len() < total {
            debug!(
                "Partial HCI event {:#04x}: {}/{} bytes",
                self.pending[0],
                self.pending.len(),
                total
            );
            return None;
        }

        let mut event = std::mem::take(&mut self.pending);
        event.truncate(total);
        Some(event)
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_read_bd_addr_complete() {
        let buf = [0x0E, 0x0A, 0x01, 0x09, 0x10, 0x00, 0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA];
        let event = HciEvent::decode(&buf).unwrap();
        match event {
            HciEvent::CommandComplete {
                opcode,
                status,
                parameters,
                ..
            } => {
                assert_eq!(opcode, Opcode::READ_BD_ADDR);
                assert_eq!(status, 0);
                let addr = BdAddr::from_wire_slice(&parameters).unwrap();
                assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:FF");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn decodes_disconnect_and_masks_handle() {
        let buf = [0x05, 0x04, 0x00, 0x2A, 0x20, 0x13];
        assert_eq!(
            HciEvent::decode(&buf).unwrap(),
            HciEvent::DisconnectionComplete {
                status: 0,
                handle: 0x002A,
                reason: 0x13
            }
        );
        assert_eq!(
            HciEvent::disconnect_reason(0x13),
            "Remote User Terminated Connection"
        );
        assert_eq!(HciEvent::disconnect_reason(0x42), "Unknown Reason");
    }

    #[test]
    fn rejects_truncated_connection_request() {
        let buf = [0x04, 0x0A, 0x66, 0x55];
        assert!(matches!(
            HciEvent::decode(&buf),
            Err(PacketError::Truncated { needed: 12, .. })
        ));
    }

    #[test]
    fn remote_name_stops_at_null() {
        let name = RemoteName::from_bytes(b"Motion Controller\0garbage");
        assert_eq!(name.to_string(), "Motion Controller");
        assert_eq!(name.first_char(), Some('M'));
        assert!(RemoteName::default().is_empty());
    }

    #[test]
    fn assembles_fragmented_event() {
        let mut name = b"PLAYSTATION(R)3 Controller".to_vec();
        name.resize(248, 0);
        let mut event = vec![0x07, 0xFF, 0x00, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11];
        event.extend_from_slice(&name);

        let mut assembler = EventAssembler::new();
        let mut complete = None;
        for chunk in event.chunks(EVENT_CHUNK_LEN) {
            assert!(complete.is_none());
            complete = assembler.push(chunk);
        }
        let complete = complete.unwrap();
        assert_eq!(complete.len(), 257);
        match HciEvent::decode(&complete).unwrap() {
            HciEvent::RemoteNameComplete { name, address, .. } => {
                assert_eq!(name.to_string(), "PLAYSTATION(R)3 Controller");
                assert_eq!(address.to_string(), "11:22:33:44:55:66");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn ignores_idle_transfers() {
        let mut assembler = EventAssembler::new();
        assert!(assembler.push(&[]).is_none());
        assert!(assembler.push(&[0u8; 16]).is_none());
        let done = assembler.push(&[0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00]).unwrap();
        assert_eq!(done, vec![0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00]);
    }
}
