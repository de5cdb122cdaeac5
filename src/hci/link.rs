use super::address::BdAddr;
use super::command::{HciCommand, Opcode, Role, ScanMode, REMOTE_USER_TERMINATED};
use super::event::{EventFlags, HciEvent, RemoteName};
use tracing::{debug, info, warn};

/// Radio bring-up and connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Init,
    Resetting,
    ReadingAddress,
    Scanning,
    AwaitingConnection,
    ReadingRemoteName,
    Connected,
    ScanDisabled,
    Done,
    Disconnecting,
}

/// Cycle budgets for the bring-up phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    /// Cycles spent in Init before the first Reset
    pub init_debounce_cycles: u32,
    /// Cycles to wait for the Reset to complete before starting over
    pub reset_timeout_cycles: u32,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self {
            init_debounce_cycles: 10,
            reset_timeout_cycles: 100,
        }
    }
}

/// Addresses and handle of the current link
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkIdentity {
    pub local_address: BdAddr,
    pub remote_address: BdAddr,
    pub handle: u16,
    pub role: Role,
}

/// Something the rest of the host has to react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkNotice {
    /// Scan is off and the ACL link is up; channel negotiation may start
    LinkReady,
    /// The link is gone and every buffer must be cleared
    LinkClosed,
}

/// Result of one `advance` call: at most one command and one notice
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkStep {
    pub command: Option<HciCommand>,
    pub notice: Option<LinkNotice>,
}

impl LinkStep {
    fn idle() -> Self {
        Self::default()
    }

    fn command(command: HciCommand) -> Self {
        Self {
            command: Some(command),
            notice: None,
        }
    }

    fn notice(notice: LinkNotice) -> Self {
        Self {
            command: None,
            notice: Some(notice),
        }
    }
}

/// HCI state machine
#[derive(Debug, Clone, Default)]
pub struct LinkController {
    state: LinkState,
    timing: LinkTiming,
    counter: u32,
    identity: LinkIdentity,
    remote_name: RemoteName,
    command_credits: u8,
}

impl LinkController {
    pub fn new(timing: LinkTiming) -> Self {
        Self {
            timing,
            ..Self::default()
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn identity(&self) -> &LinkIdentity {
        &self.identity
    }

    pub fn remote_name(&self) -> &RemoteName {
        &self.remote_name
    }

    pub fn handle(&self) -> u16 {
        self.identity.handle
    }

    /// Record what an event tells us and raise the matching flags
    pub fn absorb(&mut self, event: &HciEvent, flags: &mut EventFlags) {
        match event {
            HciEvent::CommandComplete {
                packets,
                opcode,
                status,
                parameters,
            } => {
                self.command_credits = *packets;
                if *status != 0x00 {
                    // the flag stays down so the waiting phase stalls visibly
                    warn!(
                        "HCI Command Complete failed - {} status {:#04x}",
                        opcode, status
                    );
                    return;
                }
                flags.insert(EventFlags::COMMAND_COMPLETE);
                if *opcode == Opcode::READ_BD_ADDR {
                    if let Some(address) = BdAddr::from_wire_slice(parameters) {
                        self.identity.local_address = address;
                    }
                }
            }
            HciEvent::CommandStatus {
                status,
                packets,
                opcode,
            } => {
                self.command_credits = *packets;
                flags.insert(EventFlags::COMMAND_STATUS);
                if *status == 0 {
                    debug!("Command Status - Complete: {}", opcode);
                } else {
                    warn!("HCI Command Failed - Error: {:#04x} {}", status, opcode);
                }
            }
            HciEvent::ConnectionComplete { status, handle } => {
                if *status == 0 {
                    self.identity.handle = *handle;
                    debug!("Connect Complete - HCI Handle: {:#05x}", handle);
                    flags.insert(EventFlags::CONNECT_COMPLETE);
                } else {
                    warn!("Connection failed with status {:#04x}", status);
                }
            }
            HciEvent::DisconnectionComplete { status, reason, .. } => {
                if *status == 0 {
                    info!(
                        "Disconnect Complete - Reason: {}",
                        HciEvent::disconnect_reason(*reason)
                    );
                    flags.insert(EventFlags::DISCONNECT_COMPLETE);
                    flags.remove(EventFlags::CONNECT_COMPLETE);
                }
            }
            HciEvent::ConnectionRequest { address, .. } => {
                self.identity.remote_address = *address;
                info!("Incoming Connection from {}", address);
                flags.insert(EventFlags::INCOMING_REQUEST);
            }
            HciEvent::RoleChange { role, .. } => {
                debug!("Role Changed: {:?}", role);
                self.identity.role = *role;
            }
            HciEvent::RemoteNameComplete { status, name, .. } => {
                if *status != 0 {
                    warn!("Remote name request failed with status {:#04x}", status);
                }
                self.remote_name = name.clone();
                flags.insert(EventFlags::REMOTE_NAME);
            }
            HciEvent::NumberOfCompletedPackets { handle, count } => {
                debug!("Number Of Completed Packets: {} on {:#05x}", count, handle);
            }
            HciEvent::Unknown { code } => {
                debug!("Unmanaged event: {:#04x}", code);
            }
        }
    }

    /// One tick of the state machine
    pub fn advance(&mut self, flags: &mut EventFlags) -> LinkStep {
        match self.state {
            LinkState::Init => {
                self.counter += 1;
                if self.counter > self.timing.init_debounce_cycles {
                    info!("Init State");
                    self.counter = 0;
                    self.state = LinkState::Resetting;
                    return self.issue(HciCommand::Reset, flags);
                }
                LinkStep::idle()
            }
            LinkState::Resetting => {
                self.counter += 1;
                if flags.contains(EventFlags::COMMAND_COMPLETE) {
                    info!("HCI Reset Complete");
                    self.counter = 0;
                    self.state = LinkState::ReadingAddress;
                    return self.issue(HciCommand::ReadBdAddr, flags);
                }
                if self.counter > self.timing.reset_timeout_cycles {
                    warn!("No Response to HCI Reset - Try reconnecting the Bluetooth Dongle");
                    self.counter = 0;
                    self.state = LinkState::Init;
                }
                LinkStep::idle()
            }
            LinkState::ReadingAddress => {
                if flags.contains(EventFlags::COMMAND_COMPLETE) {
                    flags.remove(EventFlags::COMMAND_COMPLETE);
                    info!("Local Bluetooth Address: {}", self.identity.local_address);
                    self.state = LinkState::Scanning;
                }
                LinkStep::idle()
            }
            LinkState::Scanning => {
                info!("Wait For Incoming Connection Request");
                self.state = LinkState::AwaitingConnection;
                self.issue(HciCommand::WriteScanEnable(ScanMode::PageOnly), flags)
            }
            LinkState::AwaitingConnection => {
                if flags.contains(EventFlags::INCOMING_REQUEST) {
                    info!("Incoming Request");
                    self.state = LinkState::ReadingRemoteName;
                    return self.issue(
                        HciCommand::RemoteNameRequest(self.identity.remote_address),
                        flags,
                    );
                }
                LinkStep::idle()
            }
            LinkState::ReadingRemoteName => {
                if flags.contains(EventFlags::REMOTE_NAME) {
                    flags.remove(EventFlags::REMOTE_NAME);
                    info!("Remote Name: {}", self.remote_name);
                    self.state = LinkState::Connected;
                    return self.issue(
                        HciCommand::AcceptConnection {
                            address: self.identity.remote_address,
                            role: Role::Master,
                        },
                        flags,
                    );
                }
                LinkStep::idle()
            }
            LinkState::Connected => {
                if flags.contains(EventFlags::CONNECT_COMPLETE) {
                    info!("Connected to Device: {}", self.identity.remote_address);
                    self.state = LinkState::ScanDisabled;
                    return self.issue(HciCommand::WriteScanEnable(ScanMode::Disabled), flags);
                }
                LinkStep::idle()
            }
            LinkState::ScanDisabled => {
                if flags.contains(EventFlags::COMMAND_COMPLETE) {
                    flags.remove(EventFlags::COMMAND_COMPLETE);
                    info!("Scan Disabled");
                    self.state = LinkState::Done;
                    return LinkStep::notice(LinkNotice::LinkReady);
                }
                LinkStep::idle()
            }
            LinkState::Done => {
                if flags.contains(EventFlags::DISCONNECT_COMPLETE) {
                    self.state = LinkState::Disconnecting;
                }
                LinkStep::idle()
            }
            LinkState::Disconnecting => {
                if flags.contains(EventFlags::DISCONNECT_COMPLETE) {
                    info!(
                        "Disconnected from Device: {}",
                        self.identity.remote_address
                    );
                    *flags = EventFlags::empty();
                    let local_address = self.identity.local_address;
                    self.identity = LinkIdentity {
                        local_address,
                        ..LinkIdentity::default()
                    };
                    self.remote_name = RemoteName::default();
                    self.state = LinkState::Scanning;
                    return LinkStep::notice(LinkNotice::LinkClosed);
                }
                LinkStep::idle()
            }
        }
    }

    /// Drop the ACL link after the channels are closed
    pub fn begin_disconnect(&mut self, flags: &mut EventFlags) -> HciCommand {
        self.state = LinkState::Disconnecting;
        let command = HciCommand::Disconnect {
            handle: self.identity.handle,
            reason: REMOTE_USER_TERMINATED,
        };
        flags.remove(command.clears());
        command
    }

    /// Forget everything, as after the dongle was unplugged
    pub fn reset(&mut self) {
        *self = Self::new(self.timing);
    }

    fn issue(&mut self, command: HciCommand, flags: &mut EventFlags) -> LinkStep {
        flags.remove(command.clears());
        self.command_credits = self.command_credits.saturating_sub(1);
        LinkStep::command(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_until_command(link: &mut LinkController, flags: &mut EventFlags) -> HciCommand {
        for _ in 0..200 {
            if let Some(command) = link.advance(flags).command {
                return command;
            }
        }
        panic!("no command issued from {:?}", link.state());
    }

    fn command_complete(opcode: Opcode, status: u8, parameters: &[u8]) -> HciEvent {
        HciEvent::CommandComplete {
            packets: 1,
            opcode,
            status,
            parameters: parameters.to_vec(),
        }
    }

    #[test]
    fn debounces_before_reset() {
        let mut link = LinkController::new(LinkTiming::default());
        let mut flags = EventFlags::empty();
        for _ in 0..10 {
            assert_eq!(link.advance(&mut flags), LinkStep::idle());
        }
        assert_eq!(link.advance(&mut flags).command, Some(HciCommand::Reset));
        assert_eq!(link.state(), LinkState::Resetting);
    }

    #[test]
    fn retries_reset_after_timeout() {
        let mut link = LinkController::new(LinkTiming {
            init_debounce_cycles: 0,
            reset_timeout_cycles: 3,
        });
        let mut flags = EventFlags::empty();
        assert_eq!(link.advance(&mut flags).command, Some(HciCommand::Reset));
        for _ in 0..4 {
            link.advance(&mut flags);
        }
        assert_eq!(link.state(), LinkState::Init);
        assert_eq!(link.advance(&mut flags).command, Some(HciCommand::Reset));
    }

    #[test]
    fn failed_command_complete_stalls() {
        let mut link = LinkController::new(LinkTiming {
            init_debounce_cycles: 0,
            reset_timeout_cycles: 1000,
        });
        let mut flags = EventFlags::empty();
        assert_eq!(link.advance(&mut flags).command, Some(HciCommand::Reset));
        link.absorb(&command_complete(Opcode::RESET, 0x0C, &[]), &mut flags);
        assert!(!flags.contains(EventFlags::COMMAND_COMPLETE));
        for _ in 0..50 {
            assert_eq!(link.advance(&mut flags), LinkStep::idle());
        }
        assert_eq!(link.state(), LinkState::Resetting);
    }

    #[test]
    fn walks_bring_up_sequence() {
        let mut link = LinkController::new(LinkTiming::default());
        let mut flags = EventFlags::empty();

        assert_eq!(tick_until_command(&mut link, &mut flags), HciCommand::Reset);
        link.absorb(&command_complete(Opcode::RESET, 0, &[]), &mut flags);
        assert_eq!(
            tick_until_command(&mut link, &mut flags),
            HciCommand::ReadBdAddr
        );
        link.absorb(
            &command_complete(
                Opcode::READ_BD_ADDR,
                0,
                &[0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA],
            ),
            &mut flags,
        );
        assert_eq!(
            tick_until_command(&mut link, &mut flags),
            HciCommand::WriteScanEnable(ScanMode::PageOnly)
        );
        assert_eq!(link.identity().local_address.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(link.state(), LinkState::AwaitingConnection);

        let peer = BdAddr::from_display([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        link.absorb(
            &HciEvent::ConnectionRequest {
                address: peer,
                class: [0x08, 0x05, 0x00],
                link_type: 0x01,
            },
            &mut flags,
        );
        assert_eq!(
            tick_until_command(&mut link, &mut flags),
            HciCommand::RemoteNameRequest(peer)
        );
        link.absorb(
            &HciEvent::RemoteNameComplete {
                status: 0,
                address: peer,
                name: RemoteName::from_bytes(b"PLAYSTATION(R)3 Controller"),
            },
            &mut flags,
        );
        assert_eq!(
            tick_until_command(&mut link, &mut flags),
            HciCommand::AcceptConnection {
                address: peer,
                role: Role::Master
            }
        );
        assert!(!flags.contains(EventFlags::INCOMING_REQUEST));

        link.absorb(
            &HciEvent::ConnectionComplete {
                status: 0,
                handle: 0x002A,
            },
            &mut flags,
        );
        assert_eq!(
            tick_until_command(&mut link, &mut flags),
            HciCommand::WriteScanEnable(ScanMode::Disabled)
        );
        link.absorb(&command_complete(Opcode::WRITE_SCAN_ENABLE, 0, &[]), &mut flags);
        assert_eq!(
            link.advance(&mut flags).notice,
            Some(LinkNotice::LinkReady)
        );
        assert_eq!(link.state(), LinkState::Done);
        assert_eq!(link.handle(), 0x002A);
        assert_eq!(link.remote_name().first_char(), Some('P'));
    }

    #[test]
    fn remote_disconnect_returns_to_scanning() {
        let mut link = LinkController::new(LinkTiming::default());
        link.state = LinkState::Done;
        link.identity.handle = 0x002A;
        let mut flags = EventFlags::CONNECT_COMPLETE;

        link.absorb(
            &HciEvent::DisconnectionComplete {
                status: 0,
                handle: 0x002A,
                reason: 0x13,
            },
            &mut flags,
        );
        assert!(!flags.contains(EventFlags::CONNECT_COMPLETE));
        assert_eq!(link.advance(&mut flags), LinkStep::idle());
        assert_eq!(link.state(), LinkState::Disconnecting);
        assert_eq!(link.advance(&mut flags).notice, Some(LinkNotice::LinkClosed));
        assert_eq!(link.state(), LinkState::Scanning);
        assert!(flags.is_empty());
        assert_eq!(link.handle(), 0);
    }
}
