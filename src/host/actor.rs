use super::engine::{HostCore, Outbound};
use super::reader::PipeReader;
use super::{HostSettings, HostSnapshot};
use crate::error::HostError;
use crate::hci::HciCommand;
use crate::l2cap::{acl, Channel, SignalPdu, SIGNALING_CID};
use crate::output::{
    Color, CommandPacer, GamepadOutput, KeepAlive, Led, Rgb, Rumble, WandOutput,
    ENABLE_STREAMING,
};
use crate::report::ControllerKind;
use crate::transport::{Endpoint, Pipe, SetupPacket, UsbDevice};
use statum::{machine, state};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Largest HCI event chunk the dongle's interrupt endpoint delivers
const EVENT_CHUNK: usize = 16;
const ACL_CHUNK: usize = 64;

/// Controllers driven through the 48-byte output report
const SIXAXIS: &[ControllerKind] = &[ControllerKind::Gamepad, ControllerKind::Navigation];

/// Requests a caller can make while a controller is connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    SetLed { led: Led, on: bool },
    RumbleOn(Rumble),
    RumbleOff,
    AllOff,
    WandColor(Rgb),
    WandRumble(u8),
    DisconnectController,
}

/// Everything the host task reacts to arrives through one mailbox
#[derive(Debug)]
pub enum HostMessage {
    /// One poll of the HCI event pipe, `None` when nothing arrived
    Event(Option<Vec<u8>>),
    /// One poll of the ACL bulk-in pipe
    Acl(Option<Vec<u8>>),
    Command {
        command: HostCommand,
        response_tx: oneshot::Sender<Result<(), HostError>>,
    },
    Detach {
        response_tx: oneshot::Sender<()>,
    },
}

#[state]
#[derive(Debug, Clone)]
pub enum HostPhase {
    Attaching,
    Running,
}

#[machine]
#[derive(Debug)]
pub struct Host<S: HostPhase> {
    device: Arc<dyn UsbDevice>,
    settings: HostSettings,
    core: HostCore,
    bulk_out: Option<Box<dyn Pipe>>,
    pacer: CommandPacer,
    keep_alive: KeepAlive,
    gamepad: GamepadOutput,
    wand: WandOutput,
    inbox: mpsc::Receiver<HostMessage>,
    snapshot_tx: watch::Sender<HostSnapshot>,
    cancel: CancellationToken,
    readers: Vec<JoinHandle<()>>,
}

impl Host<Attaching> {
    pub fn create(
        device: Arc<dyn UsbDevice>,
        settings: HostSettings,
        inbox: mpsc::Receiver<HostMessage>,
        snapshot_tx: watch::Sender<HostSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        let core = HostCore::new(settings.link_timing);
        let pacer = CommandPacer::new(settings.command_spacing);
        let keep_alive = KeepAlive::new(settings.wand_keepalive);
        Self::new(
            device,
            settings,
            core,
            None,
            pacer,
            keep_alive,
            GamepadOutput::new(),
            WandOutput::default(),
            inbox,
            snapshot_tx,
            cancel,
            Vec::new(),
        )
    }

    /// Open the dongle's pipes and start both readers
    pub async fn attach(
        mut self,
        mailbox: mpsc::Sender<HostMessage>,
    ) -> Result<Host<Running>, HostError> {
        let timeout = self.settings.transfer_timeout;
        let events = self.device.open_pipe(Endpoint::InterruptIn, timeout).await?;
        let acl_in = self.device.open_pipe(Endpoint::BulkIn, timeout).await?;
        let acl_out = self.device.open_pipe(Endpoint::BulkOut, timeout).await?;
        debug!("Dongle pipes open");

        let event_reader = PipeReader::create(
            "HCI event",
            events,
            EVENT_CHUNK,
            HostMessage::Event,
            mailbox.clone(),
            self.cancel.clone(),
        );
        let acl_reader = PipeReader::create(
            "ACL",
            acl_in,
            ACL_CHUNK,
            HostMessage::Acl,
            mailbox,
            self.cancel.clone(),
        );
        self.readers.push(event_reader.start().spawn());
        self.readers.push(acl_reader.start().spawn());
        self.bulk_out = Some(acl_out);

        info!("Host attached to dongle");
        Ok(self.transition())
    }
}

impl Host<Running> {
    pub async fn run(mut self) {
        self.publish();
        let mut detached = None;
        loop {
            let keep_alive_at = self.keep_alive.deadline();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Host cancelled");
                    break;
                }
                message = self.inbox.recv() => {
                    let Some(message) = message else {
                        debug!("All senders gone, host exiting");
                        break;
                    };
                    if let ControlFlow::Break(reply) = self.handle(message).await {
                        detached = reply;
                        break;
                    }
                }
                _ = wait_until(keep_alive_at) => {
                    debug!("Refreshing wand state");
                    self.write_wand().await;
                }
            }
            self.publish();
        }
        self.shutdown().await;
        if let Some(reply) = detached {
            let _ = reply.send(());
        }
    }

    /// Breaks with the detach reply once the host should stop
    async fn handle(&mut self, message: HostMessage) -> ControlFlow<Option<oneshot::Sender<()>>> {
        match message {
            HostMessage::Event(chunk) => {
                let outbound = self.core.on_event_cycle(chunk.as_deref());
                self.carry_out(outbound).await;
            }
            HostMessage::Acl(packet) => {
                let outbound = self.core.on_acl_cycle(packet.as_deref());
                self.carry_out(outbound).await;
            }
            HostMessage::Command {
                command,
                response_tx,
            } => {
                let result = self.execute(command).await;
                if let Err(e) = &result {
                    debug!("Command {:?} rejected: {}", command, e);
                }
                let _ = response_tx.send(result);
            }
            HostMessage::Detach { response_tx } => {
                info!("Detach requested");
                if let Some(pdu) = self.core.detach_request() {
                    self.send_signal(&pdu).await;
                }
                return ControlFlow::Break(Some(response_tx));
            }
        }
        ControlFlow::Continue(())
    }

    async fn carry_out(&mut self, outbound: Vec<Outbound>) {
        for item in outbound {
            match item {
                Outbound::Hci(command) => self.send_hci(&command).await,
                Outbound::Signal(pdu) => self.send_signal(&pdu).await,
                Outbound::EnableProfile(kind) => self.enable_profile(kind).await,
                Outbound::ConnectionReset => {
                    debug!("Resetting output state");
                    self.gamepad = GamepadOutput::new();
                    self.wand = WandOutput::default();
                    self.keep_alive.stop();
                    self.pacer.reset();
                }
            }
        }
    }

    async fn execute(&mut self, command: HostCommand) -> Result<(), HostError> {
        match command {
            HostCommand::DisconnectController => {
                let outbound = self.core.disconnect_controller()?;
                self.keep_alive.stop();
                self.carry_out(outbound).await;
            }
            HostCommand::SetLed { led, on } => {
                self.require(command, SIXAXIS)?;
                if on {
                    self.gamepad.led_on(led);
                } else if !self.gamepad.led_off(led) {
                    return Ok(());
                }
                self.write_gamepad().await;
            }
            HostCommand::RumbleOn(rumble) => {
                self.require(command, SIXAXIS)?;
                self.gamepad.rumble_on(rumble);
                self.write_gamepad().await;
            }
            HostCommand::RumbleOff => {
                self.require(command, SIXAXIS)?;
                self.gamepad.rumble_off();
                self.write_gamepad().await;
            }
            HostCommand::AllOff => {
                self.require(command, SIXAXIS)?;
                self.gamepad.all_off();
                self.write_gamepad().await;
            }
            HostCommand::WandColor(color) => {
                self.require(command, &[ControllerKind::Motion])?;
                self.wand.color = color;
                self.write_wand().await;
            }
            HostCommand::WandRumble(value) => {
                self.require(command, &[ControllerKind::Motion])?;
                self.wand.rumble = value;
                self.write_wand().await;
            }
        }
        Ok(())
    }

    fn require(&self, command: HostCommand, kinds: &[ControllerKind]) -> Result<(), HostError> {
        let connected = self.core.connected().ok_or(HostError::NotConnected)?;
        if kinds.contains(&connected) {
            Ok(())
        } else {
            Err(HostError::WrongController(format!(
                "{:?} does not apply to a {}",
                command, connected
            )))
        }
    }

    async fn enable_profile(&mut self, kind: ControllerKind) {
        info!("Channels open, enabling {}", kind);
        tokio::time::sleep(self.settings.profile_enable_delay).await;

        match kind {
            ControllerKind::Gamepad => {
                self.send_hid(Channel::Control, ENABLE_STREAMING.to_vec())
                    .await;
                self.gamepad.led_on(Led::Led1);
                self.write_gamepad().await;
            }
            ControllerKind::Navigation => {
                self.send_hid(Channel::Control, ENABLE_STREAMING.to_vec())
                    .await;
            }
            ControllerKind::Motion => {
                for color in Color::PALETTE {
                    self.wand.color = color.rgb();
                    let payload = self.wand.bluetooth_payload();
                    self.send_hid(Channel::Interrupt, payload).await;
                    tokio::time::sleep(self.settings.palette_step).await;
                }
            }
        }

        self.core.mark_connected(kind);
        if kind == ControllerKind::Motion {
            self.keep_alive.start();
        }
        info!("{} connected", kind);
    }

    async fn write_gamepad(&mut self) {
        let payload = self.gamepad.bluetooth_payload();
        self.send_hid(Channel::Control, payload).await;
    }

    /// A failed write still counts as a refresh so the loop does not spin
    async fn write_wand(&mut self) {
        let payload = self.wand.bluetooth_payload();
        self.send_hid(Channel::Interrupt, payload).await;
        self.keep_alive.refreshed();
    }

    /// Paced write on one of the HID channels
    async fn send_hid(&mut self, channel: Channel, payload: Vec<u8>) {
        self.pacer.ready().await;
        let mut packet = acl::encode(self.core.handle(), self.core.remote_cid(channel), &payload);
        let Some(pipe) = self.bulk_out.as_mut() else {
            error!("HID write before attach");
            return;
        };
        match pipe.transfer(&mut packet).await {
            Ok(_) => self.pacer.mark_sent(),
            Err(e) => warn!("HID write on {:?} channel failed: {}", channel, e),
        }
    }

    async fn send_signal(&mut self, pdu: &SignalPdu) {
        let mut packet = acl::encode(self.core.handle(), SIGNALING_CID, &pdu.encode());
        let Some(pipe) = self.bulk_out.as_mut() else {
            error!("Signaling before attach");
            return;
        };
        match pipe.transfer(&mut packet).await {
            Ok(_) => debug!("Sent {:?}", pdu),
            Err(e) => warn!("Signaling write failed: {}", e),
        }
    }

    async fn send_hci(&self, command: &HciCommand) {
        let mut packet = command.encode();
        match self
            .device
            .control_transfer(SetupPacket::HCI_COMMAND, &mut packet)
            .await
        {
            Ok(_) => debug!("HCI command {} sent", command.opcode()),
            Err(e) => warn!("HCI command {} failed: {}", command.opcode(), e),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.core.snapshot());
    }

    async fn shutdown(&mut self) {
        self.cancel.cancel();
        for reader in self.readers.drain(..) {
            if let Err(e) = reader.await {
                warn!("Reader task ended abnormally: {}", e);
            }
        }
        self.core.reset();
        self.gamepad = GamepadOutput::new();
        self.wand = WandOutput::default();
        self.keep_alive.stop();
        self.pacer.reset();
        self.publish();
        info!("Host stopped");
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
