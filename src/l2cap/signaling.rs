use crate::error::PacketError;

pub const SIGNALING_CID: u16 = 0x0001;

pub const PSM_HID_CONTROL: u16 = 0x0011;
pub const PSM_HID_INTERRUPT: u16 = 0x0013;

/// Our end of the HID control channel
pub const CONTROL_CID: u16 = 0x0040;
/// Our end of the HID interrupt channel
pub const INTERRUPT_CID: u16 = 0x0041;

pub const CMD_COMMAND_REJECT: u8 = 0x01;
pub const CMD_CONNECTION_REQUEST: u8 = 0x02;
pub const CMD_CONNECTION_RESPONSE: u8 = 0x03;
pub const CMD_CONFIG_REQUEST: u8 = 0x04;
pub const CMD_CONFIG_RESPONSE: u8 = 0x05;
pub const CMD_DISCONNECT_REQUEST: u8 = 0x06;
pub const CMD_DISCONNECT_RESPONSE: u8 = 0x07;

/// MTU we advertise in our own Configuration Request
pub const REQUEST_MTU: u16 = 0xFFFF;
/// MTU we accept in answer to the peer's Configuration Request
pub const RESPONSE_MTU: u16 = 0x02A0;

const CONFIG_OPTION_MTU: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionResult {
    Success,
    Pending,
    Refused(u16),
}

impl ConnectionResult {
    fn code(self) -> u16 {
        match self {
            ConnectionResult::Success => 0x0000,
            ConnectionResult::Pending => 0x0001,
            ConnectionResult::Refused(code) => code,
        }
    }

    fn from_code(code: u16) -> Self {
        match code {
            0x0000 => ConnectionResult::Success,
            0x0001 => ConnectionResult::Pending,
            other => ConnectionResult::Refused(other),
        }
    }
}

/// Signaling C-frame. CID fields keep the names of the L2CAP parameter they
/// fill, so `dest_cid`/`source_cid` are relative to the sender of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalPdu {
    CommandReject {
        id: u8,
        reason: u16,
    },
    ConnectionRequest {
        id: u8,
        psm: u16,
        source_cid: u16,
    },
    ConnectionResponse {
        id: u8,
        dest_cid: u16,
        source_cid: u16,
        result: ConnectionResult,
        status: u16,
    },
    ConfigRequest {
        id: u8,
        dest_cid: u16,
        flags: u16,
        mtu: Option<u16>,
    },
    ConfigResponse {
        id: u8,
        source_cid: u16,
        flags: u16,
        result: u16,
        mtu: Option<u16>,
    },
    DisconnectRequest {
        id: u8,
        dest_cid: u16,
        source_cid: u16,
    },
    DisconnectResponse {
        id: u8,
        dest_cid: u16,
        source_cid: u16,
    },
}

fn push_mtu(params: &mut Vec<u8>, mtu: Option<u16>) {
    if let Some(mtu) = mtu {
        params.push(CONFIG_OPTION_MTU);
        params.push(0x02);
        params.extend_from_slice(&mtu.to_le_bytes());
    }
}

fn parse_mtu(mut options: &[u8]) -> Option<u16> {
    while options.len() >= 2 {
        let kind = options[0] & 0x7F;
        let len = options[1] as usize;
        let value = options.get(2..2 + len)?;
        if kind == CONFIG_OPTION_MTU && len == 2 {
            return Some(u16::from_le_bytes([value[0], value[1]]));
        }
        options = &options[2 + len..];
    }
    None
}

impl SignalPdu {
    pub fn code(&self) -> u8 {
        match self {
            SignalPdu::CommandReject { .. } => CMD_COMMAND_REJECT,
            SignalPdu::ConnectionRequest { .. } => CMD_CONNECTION_REQUEST,
            SignalPdu::ConnectionResponse { .. } => CMD_CONNECTION_RESPONSE,
            SignalPdu::ConfigRequest { .. } => CMD_CONFIG_REQUEST,
            SignalPdu::ConfigResponse { .. } => CMD_CONFIG_RESPONSE,
            SignalPdu::DisconnectRequest { .. } => CMD_DISCONNECT_REQUEST,
            SignalPdu::DisconnectResponse { .. } => CMD_DISCONNECT_RESPONSE,
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            SignalPdu::CommandReject { id, .. }
            | SignalPdu::ConnectionRequest { id, .. }
            | SignalPdu::ConnectionResponse { id, .. }
            | SignalPdu::ConfigRequest { id, .. }
            | SignalPdu::ConfigResponse { id, .. }
            | SignalPdu::DisconnectRequest { id, .. }
            | SignalPdu::DisconnectResponse { id, .. } => *id,
        }
    }

    fn parameters(&self) -> Vec<u8> {
        let mut params = Vec::with_capacity(12);
        match self {
            SignalPdu::CommandReject { reason, .. } => {
                params.extend_from_slice(&reason.to_le_bytes());
            }
            SignalPdu::ConnectionRequest {
                psm, source_cid, ..
            } => {
                params.extend_from_slice(&psm.to_le_bytes());
                params.extend_from_slice(&source_cid.to_le_bytes());
            }
            SignalPdu::ConnectionResponse {
                dest_cid,
                source_cid,
                result,
                status,
                ..
            } => {
                params.extend_from_slice(&dest_cid.to_le_bytes());
                params.extend_from_slice(&source_cid.to_le_bytes());
                params.extend_from_slice(&result.code().to_le_bytes());
                params.extend_from_slice(&status.to_le_bytes());
            }
            SignalPdu::ConfigRequest {
                dest_cid,
                flags,
                mtu,
                ..
            } => {
                params.extend_from_slice(&dest_cid.to_le_bytes());
                params.extend_from_slice(&flags.to_le_bytes());
                push_mtu(&mut params, *mtu);
            }
            SignalPdu::ConfigResponse {
                source_cid,
                flags,
                result,
                mtu,
                ..
            } => {
                params.extend_from_slice(&source_cid.to_le_bytes());
                params.extend_from_slice(&flags.to_le_bytes());
                params.extend_from_slice(&result.to_le_bytes());
                push_mtu(&mut params, *mtu);
            }
            SignalPdu::DisconnectRequest {
                dest_cid,
                source_cid,
                ..
            }
            | SignalPdu::DisconnectResponse {
                dest_cid,
                source_cid,
                ..
            } => {
                params.extend_from_slice(&dest_cid.to_le_bytes());
                params.extend_from_slice(&source_cid.to_le_bytes());
            }
        }
        params
    }

    /// C-frame bytes: code, identifier, length, parameters
    pub fn encode(&self) -> Vec<u8> {
        let params = self.parameters();
        let mut frame = Vec::with_capacity(4 + params.len());
        frame.push(self.code());
        frame.push(self.id());
        frame.extend_from_slice(&(params.len() as u16).to_le_bytes());
        frame.extend_from_slice(&params);
        frame
    }

    /// Parse a C-frame taken from the signaling channel
    pub fn decode(frame: &[u8]) -> Result<Self, PacketError> {
        let need = |needed: usize| {
            if frame.len() < needed {
                Err(PacketError::Truncated {
                    needed,
                    actual: frame.len(),
                })
            } else {
                Ok(())
            }
        };
        need(4)?;
        let word = |at: usize| u16::from_le_bytes([frame[at], frame[at + 1]]);
        let id = frame[1];
        let declared = word(2) as usize;
        let end = (4 + declared).min(frame.len());

        let pdu = match frame[0] {
            CMD_COMMAND_REJECT => {
                need(6)?;
                SignalPdu::CommandReject {
                    id,
                    reason: word(4),
                }
            }
            CMD_CONNECTION_REQUEST => {
                need(8)?;
                SignalPdu::ConnectionRequest {
                    id,
                    psm: word(4),
                    source_cid: word(6),
                }
            }
            CMD_CONNECTION_RESPONSE => {
                need(12)?;
                SignalPdu::ConnectionResponse {
                    id,
                    dest_cid: word(4),
                    source_cid: word(6),
                    result: ConnectionResult::from_code(word(8)),
                    status: word(10),
                }
            }
            CMD_CONFIG_REQUEST => {
                need(8)?;
                SignalPdu::ConfigRequest {
                    id,
                    dest_cid: word(4),
                    flags: word(6),
                    mtu: parse_mtu(frame.get(8..end).unwrap_or_default()),
                }
            }
            CMD_CONFIG_RESPONSE => {
                need(10)?;
                SignalPdu::ConfigResponse {
                    id,
                    source_cid: word(4),
                    flags: word(6),
                    result: word(8),
                    mtu: parse_mtu(frame.get(10..end).unwrap_or_default()),
                }
            }
            CMD_DISCONNECT_REQUEST => {
                need(8)?;
                SignalPdu::DisconnectRequest {
                    id,
                    dest_cid: word(4),
                    source_cid: word(6),
                }
            }
            CMD_DISCONNECT_RESPONSE => {
                need(8)?;
                SignalPdu::DisconnectResponse {
                    id,
                    dest_cid: word(4),
                    source_cid: word(6),
                }
            }
            code => return Err(PacketError::UnknownSignal(code)),
        };
        Ok(pdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_response_bytes() {
        let pdu = SignalPdu::ConnectionResponse {
            id: 0x05,
            dest_cid: CONTROL_CID,
            source_cid: 0x0070,
            result: ConnectionResult::Pending,
            status: 0,
        };
        assert_eq!(
            pdu.encode(),
            vec![0x03, 0x05, 0x08, 0x00, 0x40, 0x00, 0x70, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn config_request_bytes() {
        let pdu = SignalPdu::ConfigRequest {
            id: 0x02,
            dest_cid: 0x0070,
            flags: 0,
            mtu: Some(REQUEST_MTU),
        };
        assert_eq!(
            pdu.encode(),
            vec![0x04, 0x02, 0x08, 0x00, 0x70, 0x00, 0x00, 0x00, 0x01, 0x02, 0xFF, 0xFF]
        );
    }

    #[test]
    fn config_response_bytes() {
        let pdu = SignalPdu::ConfigResponse {
            id: 0x07,
            source_cid: 0x0070,
            flags: 0,
            result: 0,
            mtu: Some(RESPONSE_MTU),
        };
        assert_eq!(
            pdu.encode(),
            vec![
                0x05, 0x07, 0x0A, 0x00, 0x70, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0xA0,
                0x02
            ]
        );
    }

    #[test]
    fn disconnect_request_bytes() {
        let pdu = SignalPdu::DisconnectRequest {
            id: 0x0A,
            dest_cid: 0x0071,
            source_cid: INTERRUPT_CID,
        };
        assert_eq!(
            pdu.encode(),
            vec![0x06, 0x0A, 0x04, 0x00, 0x71, 0x00, 0x41, 0x00]
        );
    }

    #[test]
    fn decodes_peer_connection_request() {
        let frame = [0x02, 0x01, 0x04, 0x00, 0x11, 0x00, 0x70, 0x00];
        assert_eq!(
            SignalPdu::decode(&frame).unwrap(),
            SignalPdu::ConnectionRequest {
                id: 0x01,
                psm: PSM_HID_CONTROL,
                source_cid: 0x0070
            }
        );
    }

    #[test]
    fn decodes_config_request_options() {
        let frame = [0x04, 0x03, 0x08, 0x00, 0x40, 0x00, 0x00, 0x00, 0x01, 0x02, 0xA0, 0x02];
        assert_eq!(
            SignalPdu::decode(&frame).unwrap(),
            SignalPdu::ConfigRequest {
                id: 0x03,
                dest_cid: CONTROL_CID,
                flags: 0,
                mtu: Some(0x02A0)
            }
        );
        let bare = [0x04, 0x03, 0x04, 0x00, 0x40, 0x00, 0x00, 0x00];
        assert!(matches!(
            SignalPdu::decode(&bare).unwrap(),
            SignalPdu::ConfigRequest { mtu: None, .. }
        ));
    }

    #[test]
    fn rejects_unknown_and_short_frames() {
        assert_eq!(
            SignalPdu::decode(&[0x0B, 0x01, 0x00, 0x00]),
            Err(PacketError::UnknownSignal(0x0B))
        );
        assert!(matches!(
            SignalPdu::decode(&[0x02, 0x01, 0x04, 0x00, 0x11]),
            Err(PacketError::Truncated { needed: 8, .. })
        ));
    }
}
