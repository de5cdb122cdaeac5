use crate::error::PacketError;

pub const ACL_HEADER_LEN: usize = 8;

/// Packet boundary flag for a first, automatically flushable fragment
const PB_FIRST_FLUSHABLE: u16 = 0x2000;

/// Wrap an L2CAP payload for channel `cid` into an ACL data packet
pub fn encode(handle: u16, cid: u16, payload: &[u8]) -> Vec<u8> {
    let l2cap_len = payload.len() as u16;
    let total_len = l2cap_len + 4;
    let mut packet = Vec::with_capacity(ACL_HEADER_LEN + payload.len());
    packet.extend_from_slice(&((handle & 0x0FFF) | PB_FIRST_FLUSHABLE).to_le_bytes());
    packet.extend_from_slice(&total_len.to_le_bytes());
    packet.extend_from_slice(&l2cap_len.to_le_bytes());
    packet.extend_from_slice(&cid.to_le_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// Inbound ACL packet with its basic L2CAP header stripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclFrame<'a> {
    pub handle: u16,
    pub cid: u16,
    pub payload: &'a [u8],
}

/// Split an inbound buffer. Only first fragments on `expected_handle` are accepted.
/// Bulk transfers are padded, so the payload is cut to the declared L2CAP length.
pub fn decode(buf: &[u8], expected_handle: u16) -> Result<AclFrame<'_>, PacketError> {
    if buf.len() < ACL_HEADER_LEN {
        return Err(PacketError::Truncated {
            needed: ACL_HEADER_LEN,
            actual: buf.len(),
        });
    }
    let raw_handle = u16::from_le_bytes([buf[0], buf[1]]);
    let expected = (expected_handle & 0x0FFF) | PB_FIRST_FLUSHABLE;
    if raw_handle != expected {
        return Err(PacketError::BadHandle {
            expected,
            actual: raw_handle,
        });
    }
    let l2cap_len = u16::from_le_bytes([buf[4], buf[5]]) as usize;
    let cid = u16::from_le_bytes([buf[6], buf[7]]);
    let end = (ACL_HEADER_LEN + l2cap_len).min(buf.len());
    Ok(AclFrame {
        handle: raw_handle & 0x0FFF,
        cid,
        payload: &buf[ACL_HEADER_LEN..end],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_envelope() {
        let packet = encode(0x002A, 0x0071, &[0x52, 0x01, 0x00]);
        assert_eq!(
            packet,
            vec![0x2A, 0x20, 0x07, 0x00, 0x03, 0x00, 0x71, 0x00, 0x52, 0x01, 0x00]
        );
    }

    #[test]
    fn decodes_padded_bulk_transfer() {
        let mut buf = encode(0x002A, 0x0001, &[0x06, 0x01, 0x04, 0x00, 0x40, 0x00, 0x70, 0x00]);
        buf.resize(64, 0);
        let frame = decode(&buf, 0x002A).unwrap();
        assert_eq!(frame.cid, 0x0001);
        assert_eq!(frame.payload.len(), 8);
    }

    #[test]
    fn rejects_other_handles() {
        let buf = encode(0x002B, 0x0041, &[0xA1, 0x01]);
        assert!(matches!(
            decode(&buf, 0x002A),
            Err(PacketError::BadHandle { .. })
        ));
        assert!(matches!(
            decode(&buf[..4], 0x002B),
            Err(PacketError::Truncated { .. })
        ));
    }
}
