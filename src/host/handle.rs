//! Host Handle - caller-facing API of the wireless host
//!
//! Spawns the host task on a dongle and turns every request into a mailbox
//! message with a oneshot reply. State is observed through a watch channel.

use super::actor::{Host, HostCommand, HostMessage};
use super::{HostSettings, HostSnapshot};
use crate::error::HostError;
use crate::output::{Led, Rgb, Rumble};
use crate::transport::{DeviceKind, UsbDevice};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cheap, cloneable access to a running host
///
/// # Threading Model
///
/// One tokio task owns the HCI and L2CAP state machines. Two reader tasks poll
/// the dongle's event and ACL pipes and feed the same mailbox the handle writes
/// to, so commands are applied strictly between polls.
///
/// ```text
/// event reader ─┐
/// ACL reader   ─┼─[HostMessage]→ Host ─[HostSnapshot]→ subscribers
/// HostHandle   ─┘
/// ```
#[derive(Debug, Clone)]
pub struct HostHandle {
    sender: mpsc::Sender<HostMessage>,
    snapshot_rx: watch::Receiver<HostSnapshot>,
    cancel: CancellationToken,
}

impl HostHandle {
    /// Attach to a dongle and start scanning for controllers
    ///
    /// # Errors
    ///
    /// * [`HostError::UnsupportedDevice`] - the device is not the configured dongle
    /// * [`HostError::Transport`] - one of the dongle's pipes could not be opened
    pub async fn spawn(
        device: Arc<dyn UsbDevice>,
        settings: HostSettings,
    ) -> Result<Self, HostError> {
        let (vendor_id, product_id) = (device.vendor_id(), device.product_id());
        info!(
            "Spawning host on {:04x}:{:04x} ({:?})",
            vendor_id,
            product_id,
            DeviceKind::of(device.as_ref())
        );

        if vendor_id != settings.dongle_vendor_id || product_id != settings.dongle_product_id {
            warn!("Device is not the configured dongle");
            return Err(HostError::UnsupportedDevice {
                vendor_id,
                product_id,
            });
        }

        let (sender, inbox) = mpsc::channel(settings.mailbox_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(HostSnapshot::default());
        let cancel = CancellationToken::new();
        debug!("Host settings: {:?}", settings);

        let host = Host::create(device, settings, inbox, snapshot_tx, cancel.clone());
        let running = host.attach(sender.clone()).await?;
        let handle = tokio::spawn(running.run());
        debug!("Tokio task spawned with handle: {:?}", handle);

        Ok(Self {
            sender,
            snapshot_rx,
            cancel,
        })
    }

    /// Receiver that changes after every message the host handles
    pub fn subscribe(&self) -> watch::Receiver<HostSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn snapshot(&self) -> HostSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// False once the host has stopped, for whatever reason
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Resolves when the host stops
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }

    pub async fn set_led(&self, led: Led, on: bool) -> Result<(), HostError> {
        self.command(HostCommand::SetLed { led, on }).await
    }

    pub async fn rumble_on(&self, rumble: Rumble) -> Result<(), HostError> {
        self.command(HostCommand::RumbleOn(rumble)).await
    }

    pub async fn rumble_off(&self) -> Result<(), HostError> {
        self.command(HostCommand::RumbleOff).await
    }

    /// Clears every LED and stops rumble
    pub async fn all_off(&self) -> Result<(), HostError> {
        self.command(HostCommand::AllOff).await
    }

    pub async fn set_wand_color(&self, color: impl Into<Rgb>) -> Result<(), HostError> {
        self.command(HostCommand::WandColor(color.into())).await
    }

    pub async fn set_wand_rumble(&self, value: u8) -> Result<(), HostError> {
        self.command(HostCommand::WandRumble(value)).await
    }

    /// Close both channels and then the link. The host goes back to scanning.
    pub async fn disconnect_controller(&self) -> Result<(), HostError> {
        self.command(HostCommand::DisconnectController).await
    }

    /// Stop the host. A connected controller is asked to close its interrupt
    /// channel first; nothing waits for the answer.
    pub async fn detach(self) -> Result<(), HostError> {
        info!("Detaching host");
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .sender
            .send(HostMessage::Detach { response_tx })
            .await
            .is_err()
        {
            debug!("Host already stopped");
            return Ok(());
        }
        response_rx
            .await
            .map_err(|e| HostError::ChannelClosed(e.to_string()))
    }

    async fn command(&self, command: HostCommand) -> Result<(), HostError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.sender
            .send(HostMessage::Command {
                command,
                response_tx,
            })
            .await
            .map_err(|e| HostError::ChannelClosed(e.to_string()))?;
        response_rx
            .await
            .map_err(|e| HostError::ChannelClosed(e.to_string()))?
    }
}
