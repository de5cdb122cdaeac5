//! In-process stand-in for a CSR dongle with one controller in range
//!
//! Answers HCI commands the way the dongle does and plays the controller's
//! side of the L2CAP handshake. Everything the host writes is logged with the
//! time it arrived.

use super::{Endpoint, Pipe, SetupPacket, UsbDevice, CSR_PRODUCT_ID, CSR_VENDOR_ID};
use crate::error::TransportError;
use crate::hci::event::EVENT_CHUNK_LEN;
use crate::hci::{BdAddr, Opcode};
use crate::l2cap::signaling::{PSM_HID_CONTROL, PSM_HID_INTERRUPT};
use crate::l2cap::{acl, ConnectionResult, SignalPdu, CONTROL_CID, INTERRUPT_CID, SIGNALING_CID};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

pub const SIM_LOCAL_ADDRESS: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
pub const SIM_PEER_ADDRESS: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
pub const SIM_HANDLE: u16 = 0x002A;

/// Channel ids the simulated controller allocates on its side
pub const PEER_CONTROL_CID: u16 = 0x0070;
pub const PEER_INTERRUPT_CID: u16 = 0x0071;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// One write the host made on the ACL bulk-out pipe outside the signaling channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidWrite {
    pub at: Instant,
    pub cid: u16,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct SimState {
    events: VecDeque<Vec<u8>>,
    acl_in: VecDeque<Vec<u8>>,
    hci_log: Vec<(Instant, Opcode)>,
    signals: Vec<SignalPdu>,
    hid_writes: Vec<HidWrite>,
    peer_name: Option<String>,
    offer_connection: bool,
    next_id: u8,
    unplugged: bool,
}

impl SimState {
    fn queue_event(&mut self, event: Vec<u8>) {
        for chunk in event.chunks(EVENT_CHUNK_LEN) {
            self.events.push_back(chunk.to_vec());
        }
    }

    fn command_complete(&mut self, opcode: Opcode, parameters: &[u8]) {
        let [lo, hi] = opcode.to_le_bytes();
        let mut event = vec![0x0E, 4 + parameters.len() as u8, 0x01, lo, hi, 0x00];
        event.extend_from_slice(parameters);
        self.queue_event(event);
    }

    fn command_status(&mut self, opcode: Opcode) {
        let [lo, hi] = opcode.to_le_bytes();
        self.queue_event(vec![0x0F, 0x04, 0x00, 0x01, lo, hi]);
    }

    fn queue_signal(&mut self, pdu: SignalPdu) {
        self.acl_in
            .push_back(acl::encode(SIM_HANDLE, SIGNALING_CID, &pdu.encode()));
    }

    fn identifier(&mut self) -> u8 {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.next_id
    }

    fn hci_command(&mut self, packet: &[u8]) {
        if packet.len() < 3 {
            return;
        }
        let opcode = Opcode::from_le_bytes([packet[0], packet[1]]);
        let params = &packet[3..];
        self.hci_log.push((Instant::now(), opcode));
        trace!("Simulated dongle got {}", opcode);

        match opcode {
            Opcode::READ_BD_ADDR => {
                let address = BdAddr::from_display(SIM_LOCAL_ADDRESS).wire_bytes();
                self.command_complete(opcode, &address);
            }
            Opcode::WRITE_SCAN_ENABLE => {
                self.command_complete(opcode, &[]);
                match params.first() {
                    Some(0x02) if self.offer_connection && self.peer_name.is_some() => {
                        self.offer_connection = false;
                        let mut event = vec![0x04, 0x0A];
                        event.extend_from_slice(&BdAddr::from_display(SIM_PEER_ADDRESS).wire_bytes());
                        event.extend_from_slice(&[0x08, 0x05, 0x00, 0x01]);
                        self.queue_event(event);
                    }
                    Some(0x00) => {
                        let id = self.identifier();
                        self.queue_signal(SignalPdu::ConnectionRequest {
                            id,
                            psm: PSM_HID_CONTROL,
                            source_cid: PEER_CONTROL_CID,
                        });
                    }
                    _ => {}
                }
            }
            Opcode::REMOTE_NAME_REQUEST => {
                self.command_status(opcode);
                let mut event = vec![0x07, 0xFF, 0x00];
                event.extend_from_slice(&BdAddr::from_display(SIM_PEER_ADDRESS).wire_bytes());
                let mut name = [0u8; 248];
                if let Some(peer) = &self.peer_name {
                    let bytes = peer.as_bytes();
                    let len = bytes.len().min(name.len());
                    name[..len].copy_from_slice(&bytes[..len]);
                }
                event.extend_from_slice(&name);
                self.queue_event(event);
            }
            Opcode::ACCEPT_CONNECTION => {
                self.command_status(opcode);
                let [lo, hi] = SIM_HANDLE.to_le_bytes();
                let mut event = vec![0x03, 0x0B, 0x00, lo, hi];
                event.extend_from_slice(&BdAddr::from_display(SIM_PEER_ADDRESS).wire_bytes());
                event.extend_from_slice(&[0x01, 0x00]);
                self.queue_event(event);
            }
            Opcode::DISCONNECT => {
                self.command_status(opcode);
                let [lo, hi] = SIM_HANDLE.to_le_bytes();
                self.queue_event(vec![0x05, 0x04, 0x00, lo, hi, 0x16]);
            }
            _ => self.command_complete(opcode, &[]),
        }
    }

    fn acl_out(&mut self, packet: &[u8]) {
        let frame = match acl::decode(packet, SIM_HANDLE) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Simulated controller dropped ACL data: {}", e);
                return;
            }
        };
        if frame.cid != SIGNALING_CID {
            self.hid_writes.push(HidWrite {
                at: Instant::now(),
                cid: frame.cid,
                payload: frame.payload.to_vec(),
            });
            return;
        }
        let Ok(pdu) = SignalPdu::decode(frame.payload) else {
            return;
        };
        self.signals.push(pdu.clone());
        self.answer(pdu);
    }

    /// The controller's half of the channel handshake
    fn answer(&mut self, pdu: SignalPdu) {
        match pdu {
            SignalPdu::ConnectionResponse {
                dest_cid, result, ..
            } if result == ConnectionResult::Success => {
                let id = self.identifier();
                self.queue_signal(SignalPdu::ConfigRequest {
                    id,
                    dest_cid,
                    flags: 0,
                    mtu: None,
                });
            }
            SignalPdu::ConfigRequest { id, dest_cid, .. } => {
                let source_cid = if dest_cid == PEER_CONTROL_CID {
                    CONTROL_CID
                } else {
                    INTERRUPT_CID
                };
                self.queue_signal(SignalPdu::ConfigResponse {
                    id,
                    source_cid,
                    flags: 0,
                    result: 0,
                    mtu: None,
                });
            }
            SignalPdu::ConfigResponse { source_cid, .. } if source_cid == PEER_CONTROL_CID => {
                let id = self.identifier();
                self.queue_signal(SignalPdu::ConnectionRequest {
                    id,
                    psm: PSM_HID_INTERRUPT,
                    source_cid: PEER_INTERRUPT_CID,
                });
            }
            SignalPdu::DisconnectRequest {
                id,
                dest_cid,
                source_cid,
            } => {
                self.queue_signal(SignalPdu::DisconnectResponse {
                    id,
                    dest_cid,
                    source_cid,
                });
            }
            // the host confirmed our control channel close, drop the link
            SignalPdu::DisconnectResponse { source_cid, .. } if source_cid == PEER_CONTROL_CID => {
                let [lo, hi] = SIM_HANDLE.to_le_bytes();
                self.queue_event(vec![0x05, 0x04, 0x00, lo, hi, 0x13]);
            }
            _ => {}
        }
    }
}

/// CSR dongle that a controller with the given name connects to once
#[derive(Debug, Clone)]
pub struct SimulatedDongle {
    vendor_id: u16,
    product_id: u16,
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedDongle {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDongle {
    /// A dongle with no controller in range
    pub fn new() -> Self {
        Self {
            vendor_id: CSR_VENDOR_ID,
            product_id: CSR_PRODUCT_ID,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// A controller announcing `name` connects the first time page scan is enabled
    pub fn with_controller(name: &str) -> Self {
        let state = SimState {
            peer_name: Some(name.to_string()),
            offer_connection: true,
            ..SimState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            ..Self::new()
        }
    }

    /// Pretend to be some other USB device
    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    /// Deliver one input report on the interrupt channel
    pub async fn push_report(&self, report: &[u8]) {
        let mut payload = vec![0xA1];
        payload.extend_from_slice(report);
        let mut state = self.state.lock().await;
        state
            .acl_in
            .push_back(acl::encode(SIM_HANDLE, INTERRUPT_CID, &payload));
    }

    /// The controller closes both channels on its own and drops the link once
    /// the host has answered
    pub async fn peer_disconnect(&self) {
        let mut state = self.state.lock().await;
        let id = state.identifier();
        state.queue_signal(SignalPdu::DisconnectRequest {
            id,
            dest_cid: INTERRUPT_CID,
            source_cid: PEER_INTERRUPT_CID,
        });
        let id = state.identifier();
        state.queue_signal(SignalPdu::DisconnectRequest {
            id,
            dest_cid: CONTROL_CID,
            source_cid: PEER_CONTROL_CID,
        });
    }

    /// Every further transfer fails as if the dongle was pulled out
    pub async fn unplug(&self) {
        self.state.lock().await.unplugged = true;
    }

    pub async fn hci_log(&self) -> Vec<(Instant, Opcode)> {
        self.state.lock().await.hci_log.clone()
    }

    pub async fn signals(&self) -> Vec<SignalPdu> {
        self.state.lock().await.signals.clone()
    }

    pub async fn hid_writes(&self) -> Vec<HidWrite> {
        self.state.lock().await.hid_writes.clone()
    }
}

#[async_trait]
impl UsbDevice for SimulatedDongle {
    fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.product_id
    }

    async fn open_pipe(
        &self,
        endpoint: Endpoint,
        _timeout: Duration,
    ) -> Result<Box<dyn Pipe>, TransportError> {
        if endpoint == Endpoint::InterruptOut {
            return Err(TransportError::Stall);
        }
        Ok(Box::new(SimPipe {
            endpoint,
            state: self.state.clone(),
        }))
    }

    async fn control_transfer(
        &self,
        setup: SetupPacket,
        data: &mut [u8],
    ) -> Result<usize, TransportError> {
        let mut state = self.state.lock().await;
        if state.unplugged {
            return Err(TransportError::Disconnected);
        }
        if setup != SetupPacket::HCI_COMMAND {
            return Err(TransportError::Stall);
        }
        state.hci_command(data);
        Ok(data.len())
    }
}

#[derive(Debug)]
struct SimPipe {
    endpoint: Endpoint,
    state: Arc<Mutex<SimState>>,
}

#[async_trait]
impl Pipe for SimPipe {
    fn poll_interval(&self) -> Duration {
        POLL_INTERVAL
    }

    async fn transfer(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock().await;
        if state.unplugged {
            return Err(TransportError::Disconnected);
        }
        let queue = match self.endpoint {
            Endpoint::InterruptIn => &mut state.events,
            Endpoint::BulkIn => &mut state.acl_in,
            Endpoint::BulkOut => {
                state.acl_out(buf);
                return Ok(buf.len());
            }
            Endpoint::InterruptOut => return Err(TransportError::Stall),
        };
        match queue.pop_front() {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }
}
