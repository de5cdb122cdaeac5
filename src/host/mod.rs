//! Wireless host: one actor task owns every state machine
//!
//! Two [`reader::PipeReader`] tasks poll the dongle's event and bulk-in pipes
//! and forward what they read through a single mailbox. The actor feeds it to
//! [`engine::HostCore`], performs the resulting transfers, paces HID output and
//! publishes a [`HostSnapshot`] after every message.

pub mod actor;
pub mod engine;
pub mod handle;
pub mod reader;

use crate::hci::{BdAddr, LinkState, LinkTiming};
use crate::l2cap::ChannelState;
use crate::report::{ControllerKind, LatestReport};
use crate::transport::{CSR_PRODUCT_ID, CSR_VENDOR_ID};
use chrono::{DateTime, Local};
use std::time::Duration;

pub use engine::{HostCore, Outbound};
pub use actor::{HostCommand, HostMessage};
pub use handle::HostHandle;

/// Runtime settings for the host task
#[derive(Clone, Debug)]
pub struct HostSettings {
    /// USB ids of the Bluetooth dongle the host accepts
    pub dongle_vendor_id: u16,
    pub dongle_product_id: u16,

    pub link_timing: LinkTiming,

    /// Minimum gap between two HID writes
    pub command_spacing: Duration,

    /// Wand LED and rumble state is re-sent after this much silence
    pub wand_keepalive: Duration,

    /// Pause between channel setup and the first profile write
    pub profile_enable_delay: Duration,

    /// Pause between colors of the wand's connect animation
    pub palette_step: Duration,

    /// Timeout for every pipe transfer
    pub transfer_timeout: Duration,

    pub mailbox_capacity: usize,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            dongle_vendor_id: CSR_VENDOR_ID,
            dongle_product_id: CSR_PRODUCT_ID,
            link_timing: LinkTiming::default(),
            command_spacing: Duration::from_millis(250),
            wand_keepalive: Duration::from_millis(4000),
            profile_enable_delay: Duration::from_millis(1000),
            palette_step: Duration::from_millis(100),
            transfer_timeout: Duration::from_millis(5),
            mailbox_capacity: 100,
        }
    }
}

/// Read-only view of the host published after every handled message
#[derive(Debug, Clone, Default)]
pub struct HostSnapshot {
    pub link_state: LinkState,
    pub channel_state: ChannelState,
    pub local_address: BdAddr,
    pub remote_address: BdAddr,
    pub remote_name: String,
    pub connected: Option<ControllerKind>,
    pub connected_at: Option<DateTime<Local>>,
    pub report: LatestReport,
}

impl HostSnapshot {
    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }
}
