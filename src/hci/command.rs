use super::address::BdAddr;
use super::event::EventFlags;
use std::fmt;

/// HCI opcode split into group and command field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode {
    pub ogf: u8,
    pub ocf: u16,
}

impl Opcode {
    pub const RESET: Opcode = Opcode::new(0x03, 0x0003);
    pub const WRITE_SCAN_ENABLE: Opcode = Opcode::new(0x03, 0x001A);
    pub const READ_BD_ADDR: Opcode = Opcode::new(0x04, 0x0009);
    pub const REMOTE_NAME_REQUEST: Opcode = Opcode::new(0x01, 0x0019);
    pub const ACCEPT_CONNECTION: Opcode = Opcode::new(0x01, 0x0009);
    pub const DISCONNECT: Opcode = Opcode::new(0x01, 0x0006);

    pub const fn new(ogf: u8, ocf: u16) -> Self {
        Self { ogf, ocf }
    }

    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        let raw = u16::from_le_bytes(bytes);
        Self {
            ogf: (raw >> 10) as u8,
            ocf: raw & 0x03FF,
        }
    }

    pub fn to_le_bytes(self) -> [u8; 2] {
        (u16::from(self.ogf) << 10 | (self.ocf & 0x03FF)).to_le_bytes()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OGF {:#04x} OCF {:#06x}", self.ogf, self.ocf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Disabled = 0x00,
    /// Page scan on, inquiry scan off
    PageOnly = 0x02,
}

/// Role requested when accepting a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Master = 0x00,
    Slave = 0x01,
}

impl From<u8> for Role {
    fn from(value: u8) -> Self {
        if value == 0x00 {
            Role::Master
        } else {
            Role::Slave
        }
    }
}

/// Reason code sent with our own Disconnect
pub const REMOTE_USER_TERMINATED: u8 = 0x13;

/// The HCI commands the host issues
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HciCommand {
    Reset,
    ReadBdAddr,
    WriteScanEnable(ScanMode),
    RemoteNameRequest(BdAddr),
    AcceptConnection { address: BdAddr, role: Role },
    Disconnect { handle: u16, reason: u8 },
}

impl HciCommand {
    pub fn opcode(&self) -> Opcode {
        match self {
            HciCommand::Reset => Opcode::RESET,
            HciCommand::ReadBdAddr => Opcode::READ_BD_ADDR,
            HciCommand::WriteScanEnable(_) => Opcode::WRITE_SCAN_ENABLE,
            HciCommand::RemoteNameRequest(_) => Opcode::REMOTE_NAME_REQUEST,
            HciCommand::AcceptConnection { .. } => Opcode::ACCEPT_CONNECTION,
            HciCommand::Disconnect { .. } => Opcode::DISCONNECT,
        }
    }

    fn parameters(&self) -> Vec<u8> {
        match self {
            HciCommand::Reset | HciCommand::ReadBdAddr => Vec::new(),
            HciCommand::WriteScanEnable(mode) => vec![*mode as u8],
            HciCommand::RemoteNameRequest(address) => {
                let mut params = address.wire_bytes().to_vec();
                // page scan repetition mode R1, reserved, clock offset
                params.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);
                params
            }
            HciCommand::AcceptConnection { address, role } => {
                let mut params = address.wire_bytes().to_vec();
                params.push(*role as u8);
                params
            }
            HciCommand::Disconnect { handle, reason } => {
                vec![(handle & 0xFF) as u8, ((handle >> 8) & 0x0F) as u8, *reason]
            }
        }
    }

    /// Command packet as sent over the control pipe
    pub fn encode(&self) -> Vec<u8> {
        let params = self.parameters();
        let mut packet = Vec::with_capacity(3 + params.len());
        packet.extend_from_slice(&self.opcode().to_le_bytes());
        packet.push(params.len() as u8);
        packet.extend_from_slice(&params);
        packet
    }

    /// Flags that become stale the moment this command goes out
    pub fn clears(&self) -> EventFlags {
        match self {
            HciCommand::Reset => EventFlags::all(),
            HciCommand::RemoteNameRequest(_) => {
                EventFlags::COMMAND_COMPLETE | EventFlags::REMOTE_NAME
            }
            HciCommand::AcceptConnection { .. } => {
                EventFlags::COMMAND_COMPLETE | EventFlags::INCOMING_REQUEST
            }
            HciCommand::Disconnect { .. } => {
                EventFlags::COMMAND_COMPLETE | EventFlags::DISCONNECT_COMPLETE
            }
            _ => EventFlags::COMMAND_COMPLETE,
        }
    }
}
