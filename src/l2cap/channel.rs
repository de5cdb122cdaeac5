use super::signaling::{
    ConnectionResult, SignalPdu, CONTROL_CID, INTERRUPT_CID, PSM_HID_CONTROL, PSM_HID_INTERRUPT,
    REQUEST_MTU, RESPONSE_MTU,
};
use bitflags::bitflags;
use tracing::{debug, info, warn};

/// HID channel negotiation and teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Idle,
    ControlSetup,
    ControlConfiguring,
    ControlReady,
    InterruptSetup,
    InterruptConfiguring,
    InterruptReady,
    ProfileEnabled,
    Steady,
    InterruptTeardown,
    ControlTeardown,
}

bitflags! {
    /// Level-triggered signaling conditions, cleared by the step that consumes them
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SignalFlags: u8 {
        const CONTROL_CONNECTION_REQUEST = 0x01;
        const CONTROL_CONFIG_REQUEST = 0x02;
        const CONTROL_CONFIG_SUCCESS = 0x04;
        const INTERRUPT_CONNECTION_REQUEST = 0x08;
        const INTERRUPT_CONFIG_REQUEST = 0x10;
        const INTERRUPT_CONFIG_SUCCESS = 0x20;
        const CONTROL_DISCONNECT_RESPONSE = 0x40;
        const INTERRUPT_DISCONNECT_RESPONSE = 0x80;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Control,
    Interrupt,
}

/// Both ends of one logical channel plus the identifiers of the peer's pending requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelIdentity {
    pub local_cid: u16,
    pub remote_cid: u16,
    pub connect_request_id: u8,
    pub config_request_id: u8,
}

impl ChannelIdentity {
    fn new(local_cid: u16) -> Self {
        Self {
            local_cid,
            remote_cid: 0,
            connect_request_id: 0,
            config_request_id: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelNotice {
    /// Both channels are configured; the profile may be switched on
    EnableProfile,
    /// Both channels are closed; the ACL link can go
    ReleaseLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelStep {
    pub signals: Vec<SignalPdu>,
    pub notice: Option<ChannelNotice>,
}

impl ChannelStep {
    fn signals(signals: Vec<SignalPdu>) -> Self {
        Self {
            signals,
            notice: None,
        }
    }

    fn notice(notice: ChannelNotice) -> Self {
        Self {
            signals: Vec::new(),
            notice: Some(notice),
        }
    }
}

/// L2CAP state machine for the HID control and interrupt channels
#[derive(Debug, Clone)]
pub struct ChannelNegotiator {
    state: ChannelState,
    control: ChannelIdentity,
    interrupt: ChannelIdentity,
    next_id: u8,
}

impl Default for ChannelNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelNegotiator {
    pub fn new() -> Self {
        Self {
            state: ChannelState::Idle,
            control: ChannelIdentity::new(CONTROL_CID),
            interrupt: ChannelIdentity::new(INTERRUPT_CID),
            next_id: 1,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn identity(&self, channel: Channel) -> &ChannelIdentity {
        match channel {
            Channel::Control => &self.control,
            Channel::Interrupt => &self.interrupt,
        }
    }

    /// Both channels are configured and reports may flow
    pub fn is_open(&self) -> bool {
        matches!(
            self.state,
            ChannelState::ProfileEnabled | ChannelState::Steady
        )
    }

    /// Begin listening for the peer's control channel request
    pub fn start(&mut self) {
        if self.state == ChannelState::Idle {
            debug!("Waiting for HID control connection request");
            self.state = ChannelState::ControlSetup;
        }
    }

    /// Record a signaling PDU from the peer. Disconnect requests are answered
    /// straight away; everything else only raises flags for `advance`.
    pub fn absorb(&mut self, pdu: &SignalPdu, flags: &mut SignalFlags) -> Option<SignalPdu> {
        match *pdu {
            SignalPdu::CommandReject { id, reason } => {
                warn!("L2CAP Command Rejected - ID: {:#04x} reason {:#06x}", id, reason);
            }
            SignalPdu::ConnectionRequest {
                id,
                psm,
                source_cid,
            } => match psm {
                PSM_HID_CONTROL => {
                    debug!("L2CAP Control Connection Request - SCID: {:#06x}", source_cid);
                    self.control.remote_cid = source_cid;
                    self.control.connect_request_id = id;
                    flags.insert(SignalFlags::CONTROL_CONNECTION_REQUEST);
                }
                PSM_HID_INTERRUPT => {
                    debug!(
                        "L2CAP Interrupt Connection Request - SCID: {:#06x}",
                        source_cid
                    );
                    self.interrupt.remote_cid = source_cid;
                    self.interrupt.connect_request_id = id;
                    flags.insert(SignalFlags::INTERRUPT_CONNECTION_REQUEST);
                }
                other => warn!("Connection request for unsupported PSM {:#06x}", other),
            },
            SignalPdu::ConfigRequest { id, dest_cid, .. } => match self.channel_of(dest_cid) {
                Some(Channel::Control) => {
                    debug!("HID Control Configuration Request");
                    self.control.config_request_id = id;
                    flags.insert(SignalFlags::CONTROL_CONFIG_REQUEST);
                }
                Some(Channel::Interrupt) => {
                    debug!("HID Interrupt Configuration Request");
                    self.interrupt.config_request_id = id;
                    flags.insert(SignalFlags::INTERRUPT_CONFIG_REQUEST);
                }
                None => warn!("Configuration request for unknown CID {:#06x}", dest_cid),
            },
            SignalPdu::ConfigResponse {
                source_cid, result, ..
            } => {
                if result != 0 {
                    warn!(
                        "Configuration rejected on {:#06x} - result {:#06x}",
                        source_cid, result
                    );
                    return None;
                }
                match self.channel_of(source_cid) {
                    Some(Channel::Control) => {
                        debug!("HID Control Configuration Complete");
                        flags.insert(SignalFlags::CONTROL_CONFIG_SUCCESS);
                    }
                    Some(Channel::Interrupt) => {
                        debug!("HID Interrupt Configuration Complete");
                        flags.insert(SignalFlags::INTERRUPT_CONFIG_SUCCESS);
                    }
                    None => warn!("Configuration response for unknown CID {:#06x}", source_cid),
                }
            }
            SignalPdu::DisconnectRequest {
                id,
                dest_cid,
                source_cid,
            } => {
                let channel = self.channel_of(dest_cid)?;
                info!("Disconnect Request: {:?} channel", channel);
                if channel == Channel::Control {
                    self.state = ChannelState::Idle;
                }
                return Some(SignalPdu::DisconnectResponse {
                    id,
                    dest_cid,
                    source_cid,
                });
            }
            SignalPdu::DisconnectResponse {
                dest_cid,
                source_cid,
                ..
            } => {
                let channel = self
                    .channel_of(source_cid)
                    .or_else(|| self.channel_of(dest_cid));
                match channel {
                    Some(Channel::Control) => {
                        debug!("Disconnect Response: Control Channel");
                        flags.insert(SignalFlags::CONTROL_DISCONNECT_RESPONSE);
                    }
                    Some(Channel::Interrupt) => {
                        debug!("Disconnect Response: Interrupt Channel");
                        flags.insert(SignalFlags::INTERRUPT_DISCONNECT_RESPONSE);
                    }
                    None => warn!("Disconnect response for unknown CID {:#06x}", source_cid),
                }
            }
            SignalPdu::ConnectionResponse { id, .. } => {
                debug!("Unexpected connection response {:#04x}", id);
            }
        }
        None
    }

    /// One tick of the state machine
    pub fn advance(&mut self, flags: &mut SignalFlags) -> ChannelStep {
        match self.state {
            ChannelState::Idle | ChannelState::Steady => ChannelStep::default(),
            ChannelState::ControlSetup => {
                if flags.contains(SignalFlags::CONTROL_CONNECTION_REQUEST) {
                    flags.remove(SignalFlags::CONTROL_CONNECTION_REQUEST);
                    info!("HID Control Incoming Connection Request");
                    self.state = ChannelState::ControlConfiguring;
                    return ChannelStep::signals(self.accept(Channel::Control));
                }
                ChannelStep::default()
            }
            ChannelState::ControlConfiguring => {
                if flags.contains(SignalFlags::CONTROL_CONFIG_REQUEST) {
                    flags.remove(SignalFlags::CONTROL_CONFIG_REQUEST);
                    self.state = ChannelState::ControlReady;
                    return ChannelStep::signals(vec![self.config_response(Channel::Control)]);
                }
                ChannelStep::default()
            }
            ChannelState::ControlReady => {
                if flags.contains(SignalFlags::CONTROL_CONFIG_SUCCESS) {
                    flags.remove(SignalFlags::CONTROL_CONFIG_SUCCESS);
                    info!("HID Control Successfully Configured");
                    self.state = ChannelState::InterruptSetup;
                }
                ChannelStep::default()
            }
            ChannelState::InterruptSetup => {
                if flags.contains(SignalFlags::INTERRUPT_CONNECTION_REQUEST) {
                    flags.remove(SignalFlags::INTERRUPT_CONNECTION_REQUEST);
                    info!("HID Interrupt Incoming Connection Request");
                    self.state = ChannelState::InterruptConfiguring;
                    return ChannelStep::signals(self.accept(Channel::Interrupt));
                }
                ChannelStep::default()
            }
            ChannelState::InterruptConfiguring => {
                if flags.contains(SignalFlags::INTERRUPT_CONFIG_REQUEST) {
                    flags.remove(SignalFlags::INTERRUPT_CONFIG_REQUEST);
                    self.state = ChannelState::InterruptReady;
                    return ChannelStep::signals(vec![self.config_response(Channel::Interrupt)]);
                }
                ChannelStep::default()
            }
            ChannelState::InterruptReady => {
                if flags.contains(SignalFlags::INTERRUPT_CONFIG_SUCCESS) {
                    flags.remove(SignalFlags::INTERRUPT_CONFIG_SUCCESS);
                    info!("HID Interrupt Successfully Configured");
                    self.state = ChannelState::ProfileEnabled;
                    return ChannelStep::notice(ChannelNotice::EnableProfile);
                }
                ChannelStep::default()
            }
            ChannelState::ProfileEnabled => {
                self.state = ChannelState::Steady;
                ChannelStep::default()
            }
            ChannelState::InterruptTeardown => {
                if flags.contains(SignalFlags::INTERRUPT_DISCONNECT_RESPONSE) {
                    flags.remove(SignalFlags::INTERRUPT_DISCONNECT_RESPONSE);
                    info!("Disconnected Interrupt Channel");
                    self.state = ChannelState::ControlTeardown;
                    return ChannelStep::signals(vec![self.disconnect_request(Channel::Control)]);
                }
                ChannelStep::default()
            }
            ChannelState::ControlTeardown => {
                if flags.contains(SignalFlags::CONTROL_DISCONNECT_RESPONSE) {
                    flags.remove(SignalFlags::CONTROL_DISCONNECT_RESPONSE);
                    info!("Disconnected Control Channel");
                    self.state = ChannelState::Idle;
                    return ChannelStep::notice(ChannelNotice::ReleaseLink);
                }
                ChannelStep::default()
            }
        }
    }

    /// Close whatever is open, interrupt channel first. With nothing open the
    /// link can be released right away.
    pub fn begin_teardown(&mut self, flags: &mut SignalFlags) -> ChannelStep {
        flags.remove(
            SignalFlags::CONTROL_DISCONNECT_RESPONSE | SignalFlags::INTERRUPT_DISCONNECT_RESPONSE,
        );
        match self.state {
            ChannelState::InterruptConfiguring
            | ChannelState::InterruptReady
            | ChannelState::ProfileEnabled
            | ChannelState::Steady => {
                self.state = ChannelState::InterruptTeardown;
                ChannelStep::signals(vec![self.disconnect_request(Channel::Interrupt)])
            }
            ChannelState::ControlConfiguring
            | ChannelState::ControlReady
            | ChannelState::InterruptSetup => {
                self.state = ChannelState::ControlTeardown;
                ChannelStep::signals(vec![self.disconnect_request(Channel::Control)])
            }
            ChannelState::InterruptTeardown | ChannelState::ControlTeardown => {
                ChannelStep::default()
            }
            ChannelState::Idle | ChannelState::ControlSetup => {
                self.state = ChannelState::Idle;
                ChannelStep::notice(ChannelNotice::ReleaseLink)
            }
        }
    }

    /// Interrupt channel Disconnect Request, for a detach that will not wait for the answer
    pub fn interrupt_disconnect_request(&mut self) -> SignalPdu {
        self.disconnect_request(Channel::Interrupt)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn channel_of(&self, local_cid: u16) -> Option<Channel> {
        match local_cid {
            CONTROL_CID => Some(Channel::Control),
            INTERRUPT_CID => Some(Channel::Interrupt),
            _ => None,
        }
    }

    fn channel(&self, channel: Channel) -> ChannelIdentity {
        *self.identity(channel)
    }

    fn next_identifier(&mut self) -> u8 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    /// Pending, then Successful, then our own Configuration Request
    fn accept(&mut self, channel: Channel) -> Vec<SignalPdu> {
        let ident = self.channel(channel);
        let response = |result| SignalPdu::ConnectionResponse {
            id: ident.connect_request_id,
            dest_cid: ident.local_cid,
            source_cid: ident.remote_cid,
            result,
            status: 0,
        };
        vec![
            response(ConnectionResult::Pending),
            response(ConnectionResult::Success),
            SignalPdu::ConfigRequest {
                id: self.next_identifier(),
                dest_cid: ident.remote_cid,
                flags: 0,
                mtu: Some(REQUEST_MTU),
            },
        ]
    }

    fn config_response(&self, channel: Channel) -> SignalPdu {
        let ident = self.channel(channel);
        SignalPdu::ConfigResponse {
            id: ident.config_request_id,
            source_cid: ident.remote_cid,
            flags: 0,
            result: 0,
            mtu: Some(RESPONSE_MTU),
        }
    }

    fn disconnect_request(&mut self, channel: Channel) -> SignalPdu {
        let ident = self.channel(channel);
        SignalPdu::DisconnectRequest {
            id: self.next_identifier(),
            dest_cid: ident.remote_cid,
            source_cid: ident.local_cid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER_CONTROL: u16 = 0x0070;
    const PEER_INTERRUPT: u16 = 0x0071;

    fn connection_request(id: u8, psm: u16, source_cid: u16) -> SignalPdu {
        SignalPdu::ConnectionRequest {
            id,
            psm,
            source_cid,
        }
    }

    fn config_request(id: u8, dest_cid: u16) -> SignalPdu {
        SignalPdu::ConfigRequest {
            id,
            dest_cid,
            flags: 0,
            mtu: Some(0x02A0),
        }
    }

    fn config_success(source_cid: u16) -> SignalPdu {
        SignalPdu::ConfigResponse {
            id: 0x01,
            source_cid,
            flags: 0,
            result: 0,
            mtu: None,
        }
    }

    fn open(negotiator: &mut ChannelNegotiator, flags: &mut SignalFlags) {
        negotiator.start();
        negotiator.absorb(&connection_request(1, PSM_HID_CONTROL, PEER_CONTROL), flags);
        negotiator.advance(flags);
        negotiator.absorb(&config_request(2, CONTROL_CID), flags);
        negotiator.advance(flags);
        negotiator.absorb(&config_success(CONTROL_CID), flags);
        negotiator.advance(flags);
        negotiator.absorb(&connection_request(3, PSM_HID_INTERRUPT, PEER_INTERRUPT), flags);
        negotiator.advance(flags);
        negotiator.absorb(&config_request(4, INTERRUPT_CID), flags);
        negotiator.advance(flags);
        negotiator.absorb(&config_success(INTERRUPT_CID), flags);
        assert_eq!(
            negotiator.advance(flags).notice,
            Some(ChannelNotice::EnableProfile)
        );
        negotiator.advance(flags);
        assert_eq!(negotiator.state(), ChannelState::Steady);
    }

    #[test]
    fn control_setup_answers_pending_then_success() {
        let mut negotiator = ChannelNegotiator::new();
        let mut flags = SignalFlags::empty();
        negotiator.start();
        negotiator.absorb(&connection_request(0x05, PSM_HID_CONTROL, PEER_CONTROL), &mut flags);

        let step = negotiator.advance(&mut flags);
        assert_eq!(
            step.signals,
            vec![
                SignalPdu::ConnectionResponse {
                    id: 0x05,
                    dest_cid: CONTROL_CID,
                    source_cid: PEER_CONTROL,
                    result: ConnectionResult::Pending,
                    status: 0,
                },
                SignalPdu::ConnectionResponse {
                    id: 0x05,
                    dest_cid: CONTROL_CID,
                    source_cid: PEER_CONTROL,
                    result: ConnectionResult::Success,
                    status: 0,
                },
                SignalPdu::ConfigRequest {
                    id: 0x01,
                    dest_cid: PEER_CONTROL,
                    flags: 0,
                    mtu: Some(REQUEST_MTU),
                },
            ]
        );
        assert_eq!(negotiator.state(), ChannelState::ControlConfiguring);
        assert!(flags.is_empty());
    }

    #[test]
    fn config_response_echoes_peer_identifier() {
        let mut negotiator = ChannelNegotiator::new();
        let mut flags = SignalFlags::empty();
        negotiator.start();
        negotiator.absorb(&connection_request(1, PSM_HID_CONTROL, PEER_CONTROL), &mut flags);
        negotiator.advance(&mut flags);
        negotiator.absorb(&config_request(0x09, CONTROL_CID), &mut flags);
        let step = negotiator.advance(&mut flags);
        assert_eq!(
            step.signals,
            vec![SignalPdu::ConfigResponse {
                id: 0x09,
                source_cid: PEER_CONTROL,
                flags: 0,
                result: 0,
                mtu: Some(RESPONSE_MTU),
            }]
        );
        assert_eq!(negotiator.state(), ChannelState::ControlReady);
    }

    #[test]
    fn early_interrupt_request_waits_for_control() {
        let mut negotiator = ChannelNegotiator::new();
        let mut flags = SignalFlags::empty();
        negotiator.start();
        negotiator.absorb(&connection_request(1, PSM_HID_CONTROL, PEER_CONTROL), &mut flags);
        negotiator.advance(&mut flags);

        negotiator.absorb(
            &connection_request(2, PSM_HID_INTERRUPT, PEER_INTERRUPT),
            &mut flags,
        );
        for _ in 0..5 {
            let step = negotiator.advance(&mut flags);
            assert!(step.signals.is_empty());
        }
        assert_eq!(negotiator.state(), ChannelState::ControlConfiguring);
        assert!(flags.contains(SignalFlags::INTERRUPT_CONNECTION_REQUEST));

        negotiator.absorb(&config_request(3, CONTROL_CID), &mut flags);
        negotiator.advance(&mut flags);
        negotiator.absorb(&config_success(CONTROL_CID), &mut flags);
        negotiator.advance(&mut flags);
        assert_eq!(negotiator.state(), ChannelState::InterruptSetup);

        let step = negotiator.advance(&mut flags);
        assert_eq!(step.signals.len(), 3);
        assert!(matches!(
            step.signals[0],
            SignalPdu::ConnectionResponse {
                id: 2,
                dest_cid: INTERRUPT_CID,
                source_cid: PEER_INTERRUPT,
                ..
            }
        ));
        assert_eq!(negotiator.state(), ChannelState::InterruptConfiguring);
    }

    #[test]
    fn rejected_config_does_not_advance() {
        let mut negotiator = ChannelNegotiator::new();
        let mut flags = SignalFlags::empty();
        negotiator.state = ChannelState::ControlReady;
        negotiator.absorb(
            &SignalPdu::ConfigResponse {
                id: 1,
                source_cid: CONTROL_CID,
                flags: 0,
                result: 0x0001,
                mtu: None,
            },
            &mut flags,
        );
        negotiator.advance(&mut flags);
        assert_eq!(negotiator.state(), ChannelState::ControlReady);
    }

    #[test]
    fn teardown_closes_interrupt_before_control() {
        let mut negotiator = ChannelNegotiator::new();
        let mut flags = SignalFlags::empty();
        open(&mut negotiator, &mut flags);

        let step = negotiator.begin_teardown(&mut flags);
        let first_id = match step.signals.as_slice() {
            [SignalPdu::DisconnectRequest {
                id,
                dest_cid: PEER_INTERRUPT,
                source_cid: INTERRUPT_CID,
            }] => *id,
            other => panic!("unexpected signals {other:?}"),
        };
        assert_eq!(negotiator.state(), ChannelState::InterruptTeardown);
        assert!(negotiator.advance(&mut flags).signals.is_empty());

        negotiator.absorb(
            &SignalPdu::DisconnectResponse {
                id: first_id,
                dest_cid: PEER_INTERRUPT,
                source_cid: INTERRUPT_CID,
            },
            &mut flags,
        );
        let step = negotiator.advance(&mut flags);
        match step.signals.as_slice() {
            [SignalPdu::DisconnectRequest {
                id,
                dest_cid: PEER_CONTROL,
                source_cid: CONTROL_CID,
            }] => assert_eq!(*id, first_id + 1),
            other => panic!("unexpected signals {other:?}"),
        }

        negotiator.absorb(
            &SignalPdu::DisconnectResponse {
                id: first_id + 1,
                dest_cid: PEER_CONTROL,
                source_cid: CONTROL_CID,
            },
            &mut flags,
        );
        assert_eq!(
            negotiator.advance(&mut flags).notice,
            Some(ChannelNotice::ReleaseLink)
        );
        assert_eq!(negotiator.state(), ChannelState::Idle);
    }

    #[test]
    fn answers_peer_disconnect_request() {
        let mut negotiator = ChannelNegotiator::new();
        let mut flags = SignalFlags::empty();
        open(&mut negotiator, &mut flags);
        let reply = negotiator.absorb(
            &SignalPdu::DisconnectRequest {
                id: 0x0C,
                dest_cid: INTERRUPT_CID,
                source_cid: PEER_INTERRUPT,
            },
            &mut flags,
        );
        assert_eq!(
            reply,
            Some(SignalPdu::DisconnectResponse {
                id: 0x0C,
                dest_cid: INTERRUPT_CID,
                source_cid: PEER_INTERRUPT,
            })
        );
    }

    #[test]
    fn identifier_skips_zero() {
        let mut negotiator = ChannelNegotiator::new();
        negotiator.next_id = 0xFF;
        assert_eq!(negotiator.next_identifier(), 0xFF);
        assert_eq!(negotiator.next_identifier(), 0x01);
    }
}
