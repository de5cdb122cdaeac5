use super::HostSnapshot;
use crate::error::HostError;
use crate::hci::{
    EventAssembler, EventFlags, HciCommand, HciEvent, LinkController, LinkNotice, LinkState,
    LinkTiming,
};
use crate::l2cap::{
    acl, Channel, ChannelNegotiator, ChannelNotice, ChannelState, ChannelStep, SignalFlags,
    SignalPdu, INTERRUPT_CID, SIGNALING_CID,
};
use crate::report::{ControllerKind, LatestReport};
use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

/// HID DATA | Input, first byte of every input report on the interrupt channel
const HID_INPUT_REPORT: u8 = 0xA1;

/// Work the actor has to carry out after a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Hci(HciCommand),
    Signal(SignalPdu),
    /// Both channels are open; switch the controller's profile on
    EnableProfile(ControllerKind),
    /// The link is gone; output state and timers start over
    ConnectionReset,
}

/// Both state machines, their flag sets and the latest report.
///
/// Every method is a synchronous step from the current state and one input to
/// the next state plus the transfers to make. Nothing here touches the transport.
#[derive(Debug, Default)]
pub struct HostCore {
    link: LinkController,
    event_flags: EventFlags,
    assembler: EventAssembler,
    channels: ChannelNegotiator,
    signal_flags: SignalFlags,
    report: LatestReport,
    connected: Option<ControllerKind>,
    connected_at: Option<DateTime<Local>>,
}

impl HostCore {
    pub fn new(timing: LinkTiming) -> Self {
        Self {
            link: LinkController::new(timing),
            ..Self::default()
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channels.state()
    }

    pub fn connected(&self) -> Option<ControllerKind> {
        self.connected
    }

    pub fn report(&self) -> &LatestReport {
        &self.report
    }

    pub fn handle(&self) -> u16 {
        self.link.handle()
    }

    /// CID the peer allocated for `channel`; HID output is addressed to it
    pub fn remote_cid(&self, channel: Channel) -> u16 {
        self.channels.identity(channel).remote_cid
    }

    /// One event-pipe cycle. `chunk` is `None` when the poll came back empty.
    pub fn on_event_cycle(&mut self, chunk: Option<&[u8]>) -> Vec<Outbound> {
        if let Some(buf) = chunk.and_then(|chunk| self.assembler.push(chunk)) {
            match HciEvent::decode(&buf) {
                Ok(event) => {
                    debug!("HCI event: {:?}", event);
                    self.link.absorb(&event, &mut self.event_flags);
                }
                Err(e) => warn!("Dropping HCI event: {}", e),
            }
        }

        let mut outbound = Vec::new();
        let step = self.link.advance(&mut self.event_flags);
        if let Some(command) = step.command {
            outbound.push(Outbound::Hci(command));
        }
        match step.notice {
            Some(LinkNotice::LinkReady) => self.channels.start(),
            Some(LinkNotice::LinkClosed) => {
                self.clear_connection();
                outbound.push(Outbound::ConnectionReset);
            }
            None => {}
        }
        outbound
    }

    /// One bulk-in cycle
    pub fn on_acl_cycle(&mut self, packet: Option<&[u8]>) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        if let Some(packet) = packet {
            self.ingest_acl(packet, &mut outbound);
        }
        let step = self.channels.advance(&mut self.signal_flags);
        self.apply_channel_step(step, &mut outbound);
        outbound
    }

    fn ingest_acl(&mut self, packet: &[u8], outbound: &mut Vec<Outbound>) {
        let frame = match acl::decode(packet, self.link.handle()) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Ignoring ACL data: {}", e);
                return;
            }
        };
        match frame.cid {
            SIGNALING_CID => match SignalPdu::decode(frame.payload) {
                Ok(pdu) => {
                    debug!("L2CAP signal: {:?}", pdu);
                    if let Some(reply) = self.channels.absorb(&pdu, &mut self.signal_flags) {
                        outbound.push(Outbound::Signal(reply));
                    }
                }
                Err(e) => warn!("L2CAP signaling error: {}", e),
            },
            INTERRUPT_CID => {
                if let Some((&HID_INPUT_REPORT, report)) = frame.payload.split_first() {
                    self.report.update(report);
                }
            }
            cid => debug!("Data on unhandled CID {:#06x}", cid),
        }
    }

    fn apply_channel_step(&mut self, step: ChannelStep, outbound: &mut Vec<Outbound>) {
        outbound.extend(step.signals.into_iter().map(Outbound::Signal));
        match step.notice {
            Some(ChannelNotice::EnableProfile) => {
                let name = self.link.remote_name();
                match ControllerKind::from_remote_name(name) {
                    Some(kind) => outbound.push(Outbound::EnableProfile(kind)),
                    None => warn!("No profile for remote name \"{}\"", name),
                }
            }
            Some(ChannelNotice::ReleaseLink) => {
                outbound.push(Outbound::Hci(self.link.begin_disconnect(&mut self.event_flags)));
            }
            None => {}
        }
    }

    /// Called once the profile's enable reports are out
    pub fn mark_connected(&mut self, kind: ControllerKind) {
        info!("{} Enabled", kind);
        self.connected = Some(kind);
        self.connected_at = Some(Local::now());
        self.report.set_kind(Some(kind));
    }

    /// Start the orderly teardown: interrupt channel, control channel, then the ACL link
    pub fn disconnect_controller(&mut self) -> Result<Vec<Outbound>, HostError> {
        if self.link.state() != LinkState::Done {
            return Err(HostError::NotConnected);
        }
        info!("Disconnecting controller {}", self.link.identity().remote_address);
        self.connected = None;
        let step = self.channels.begin_teardown(&mut self.signal_flags);
        let mut outbound = Vec::new();
        self.apply_channel_step(step, &mut outbound);
        Ok(outbound)
    }

    /// Interrupt channel Disconnect Request for an abrupt detach, if a
    /// controller is attached
    pub fn detach_request(&mut self) -> Option<SignalPdu> {
        self.connected?;
        Some(self.channels.interrupt_disconnect_request())
    }

    /// Forget the dongle and everything learned through it
    pub fn reset(&mut self) {
        self.link.reset();
        self.event_flags = EventFlags::empty();
        self.assembler.reset();
        self.clear_connection();
    }

    fn clear_connection(&mut self) {
        self.channels.reset();
        self.signal_flags = SignalFlags::empty();
        self.report.clear();
        self.connected = None;
        self.connected_at = None;
    }

    pub fn snapshot(&self) -> HostSnapshot {
        let identity = self.link.identity();
        HostSnapshot {
            link_state: self.link.state(),
            channel_state: self.channels.state(),
            local_address: identity.local_address,
            remote_address: identity.remote_address,
            remote_name: self.link.remote_name().to_string(),
            connected: self.connected,
            connected_at: self.connected_at,
            report: self.report.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hci::{Role, ScanMode};
    use crate::l2cap::{CONTROL_CID, INTERRUPT_CID};
    use crate::report::Button;

    const HANDLE: u16 = 0x002A;
    const PEER_CONTROL: u16 = 0x0070;
    const PEER_INTERRUPT: u16 = 0x0071;

    fn command_complete(opcode: [u8; 2], parameters: &[u8]) -> Vec<u8> {
        let mut event = vec![0x0E, 4 + parameters.len() as u8, 0x01, opcode[0], opcode[1], 0x00];
        event.extend_from_slice(parameters);
        event
    }

    fn feed_event(core: &mut HostCore, event: &[u8]) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        for chunk in event.chunks(16) {
            outbound.extend(core.on_event_cycle(Some(chunk)));
        }
        outbound
    }

    fn idle_events(core: &mut HostCore, cycles: usize) -> Vec<Outbound> {
        (0..cycles).flat_map(|_| core.on_event_cycle(None)).collect()
    }

    fn hci_commands(outbound: &[Outbound]) -> Vec<HciCommand> {
        outbound
            .iter()
            .filter_map(|o| match o {
                Outbound::Hci(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    fn signals(outbound: &[Outbound]) -> Vec<SignalPdu> {
        outbound
            .iter()
            .filter_map(|o| match o {
                Outbound::Signal(pdu) => Some(pdu.clone()),
                _ => None,
            })
            .collect()
    }

    fn feed_signal(core: &mut HostCore, pdu: SignalPdu) -> Vec<Outbound> {
        core.on_acl_cycle(Some(&acl::encode(HANDLE, SIGNALING_CID, &pdu.encode())))
    }

    fn bring_up(core: &mut HostCore, name: &[u8]) {
        assert_eq!(hci_commands(&idle_events(core, 11)), vec![HciCommand::Reset]);
        let out = feed_event(core, &command_complete([0x03, 0x0C], &[]));
        assert_eq!(hci_commands(&out), vec![HciCommand::ReadBdAddr]);
        feed_event(
            core,
            &command_complete([0x09, 0x10], &[0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]),
        );
        let out = idle_events(core, 1);
        assert_eq!(
            hci_commands(&out),
            vec![HciCommand::WriteScanEnable(ScanMode::PageOnly)]
        );

        let out = feed_event(
            core,
            &[0x04, 0x0A, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x08, 0x05, 0x00, 0x01],
        );
        assert!(matches!(
            hci_commands(&out).as_slice(),
            [HciCommand::RemoteNameRequest(_)]
        ));

        let mut name_event = vec![0x07, 0xFF, 0x00, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11];
        let mut padded = name.to_vec();
        padded.resize(248, 0);
        name_event.extend_from_slice(&padded);
        let out = feed_event(core, &name_event);
        assert!(matches!(
            hci_commands(&out).as_slice(),
            [HciCommand::AcceptConnection {
                role: Role::Master,
                ..
            }]
        ));

        let out = feed_event(
            core,
            &[0x03, 0x0B, 0x00, 0x2A, 0x00, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x01, 0x00],
        );
        assert_eq!(
            hci_commands(&out),
            vec![HciCommand::WriteScanEnable(ScanMode::Disabled)]
        );
        feed_event(core, &command_complete([0x1A, 0x0C], &[]));
        assert_eq!(core.link_state(), LinkState::Done);
        assert_eq!(core.channel_state(), ChannelState::ControlSetup);
    }

    fn open_channels(core: &mut HostCore) -> Vec<Outbound> {
        feed_signal(
            core,
            SignalPdu::ConnectionRequest {
                id: 1,
                psm: 0x11,
                source_cid: PEER_CONTROL,
            },
        );
        feed_signal(
            core,
            SignalPdu::ConfigRequest {
                id: 2,
                dest_cid: CONTROL_CID,
                flags: 0,
                mtu: None,
            },
        );
        feed_signal(
            core,
            SignalPdu::ConfigResponse {
                id: 1,
                source_cid: CONTROL_CID,
                flags: 0,
                result: 0,
                mtu: None,
            },
        );
        core.on_acl_cycle(None);
        feed_signal(
            core,
            SignalPdu::ConnectionRequest {
                id: 3,
                psm: 0x13,
                source_cid: PEER_INTERRUPT,
            },
        );
        feed_signal(
            core,
            SignalPdu::ConfigRequest {
                id: 4,
                dest_cid: INTERRUPT_CID,
                flags: 0,
                mtu: None,
            },
        );
        feed_signal(
            core,
            SignalPdu::ConfigResponse {
                id: 2,
                source_cid: INTERRUPT_CID,
                flags: 0,
                result: 0,
                mtu: None,
            },
        )
    }

    #[test]
    fn gamepad_bring_up_end_to_end() {
        let mut core = HostCore::new(LinkTiming::default());
        bring_up(&mut core, b"PLAYSTATION(R)3 Controller");

        let snapshot = core.snapshot();
        assert_eq!(snapshot.local_address.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(snapshot.remote_address.to_string(), "11:22:33:44:55:66");
        assert_eq!(snapshot.remote_name, "PLAYSTATION(R)3 Controller");
        assert_eq!(core.handle(), HANDLE);

        let out = open_channels(&mut core);
        assert_eq!(out, vec![Outbound::EnableProfile(ControllerKind::Gamepad)]);
        assert_eq!(core.remote_cid(Channel::Control), PEER_CONTROL);
        assert_eq!(core.remote_cid(Channel::Interrupt), PEER_INTERRUPT);

        core.mark_connected(ControllerKind::Gamepad);
        core.on_acl_cycle(None);
        assert_eq!(core.channel_state(), ChannelState::Steady);

        let mut report = vec![HID_INPUT_REPORT, 0x01, 0x00, 0x00, 0x40];
        report.resize(50, 0);
        core.on_acl_cycle(Some(&acl::encode(HANDLE, INTERRUPT_CID, &report)));
        assert!(core.report().button(Button::Cross));
        assert!(core.snapshot().is_connected());
    }

    #[test]
    fn unknown_name_enables_nothing() {
        let mut core = HostCore::new(LinkTiming::default());
        bring_up(&mut core, b"Keyboard");
        let out = open_channels(&mut core);
        assert!(out.is_empty());
        assert_eq!(core.channel_state(), ChannelState::ProfileEnabled);
        assert_eq!(core.connected(), None);
    }

    #[test]
    fn disconnect_sequence_is_ordered() {
        let mut core = HostCore::new(LinkTiming::default());
        bring_up(&mut core, b"PLAYSTATION(R)3 Controller");
        open_channels(&mut core);
        core.mark_connected(ControllerKind::Gamepad);
        core.on_acl_cycle(None);

        let out = core.disconnect_controller().unwrap();
        let interrupt_id = match signals(&out).as_slice() {
            [SignalPdu::DisconnectRequest {
                id,
                dest_cid: PEER_INTERRUPT,
                source_cid: INTERRUPT_CID,
            }] => *id,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(core.connected(), None);

        assert!(core.on_acl_cycle(None).is_empty());
        assert!(idle_events(&mut core, 3).is_empty());

        let out = feed_signal(
            &mut core,
            SignalPdu::DisconnectResponse {
                id: interrupt_id,
                dest_cid: PEER_INTERRUPT,
                source_cid: INTERRUPT_CID,
            },
        );
        let control_id = match signals(&out).as_slice() {
            [SignalPdu::DisconnectRequest {
                id,
                dest_cid: PEER_CONTROL,
                source_cid: CONTROL_CID,
            }] => *id,
            other => panic!("unexpected {other:?}"),
        };
        assert!(hci_commands(&out).is_empty());

        let out = feed_signal(
            &mut core,
            SignalPdu::DisconnectResponse {
                id: control_id,
                dest_cid: PEER_CONTROL,
                source_cid: CONTROL_CID,
            },
        );
        assert_eq!(
            hci_commands(&out),
            vec![HciCommand::Disconnect {
                handle: HANDLE,
                reason: 0x13
            }]
        );
        assert_eq!(core.link_state(), LinkState::Disconnecting);

        feed_event(&mut core, &[0x0F, 0x04, 0x00, 0x01, 0x06, 0x04]);
        let out = feed_event(&mut core, &[0x05, 0x04, 0x00, 0x2A, 0x00, 0x16]);
        assert!(out.contains(&Outbound::ConnectionReset));
        assert_eq!(core.link_state(), LinkState::Scanning);
        assert_eq!(core.channel_state(), ChannelState::Idle);
        assert!(!core.report().has_report());
        assert_eq!(
            hci_commands(&idle_events(&mut core, 1)),
            vec![HciCommand::WriteScanEnable(ScanMode::PageOnly)]
        );
    }

    #[test]
    fn disconnect_requires_link() {
        let mut core = HostCore::new(LinkTiming::default());
        assert!(matches!(
            core.disconnect_controller(),
            Err(HostError::NotConnected)
        ));
        assert_eq!(core.detach_request(), None);
    }

    #[test]
    fn reports_for_other_handles_are_ignored() {
        let mut core = HostCore::new(LinkTiming::default());
        bring_up(&mut core, b"Motion Controller");
        open_channels(&mut core);
        core.mark_connected(ControllerKind::Motion);
        core.on_acl_cycle(Some(&acl::encode(0x0033, INTERRUPT_CID, &[0xA1, 0x01, 0xFF])));
        assert!(!core.report().has_report());
        assert!(core.detach_request().is_some());
        core.reset();
        assert_eq!(core.link_state(), LinkState::Init);
        assert_eq!(core.connected(), None);
    }
}
