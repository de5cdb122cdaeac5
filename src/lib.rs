//! Bluetooth host for PS3 family controllers
//!
//! Brings a USB Bluetooth dongle out of reset, accepts one inbound controller
//! connection, negotiates the two HID channels and decodes the reports that
//! stream in afterwards.
//!
//! ```text
//! interrupt-in ──► PipeReader ─┐
//!                              ├─► Host ──► watch<HostSnapshot> ──► application
//! bulk-in      ──► PipeReader ─┘    ▲
//!                                   └── HostHandle commands (paced HID writes)
//! ```
//!
//! Wired controllers are handled by [`wired::WiredController`], which shares the
//! report codec and output encoder with the wireless path.

pub mod config;
pub mod error;
pub mod hci;
pub mod host;
pub mod l2cap;
pub mod output;
pub mod report;
pub mod transport;
pub mod wired;

pub use config::HostConfig;
pub use error::{HostError, PacketError, TransportError};
pub use host::{HostHandle, HostSettings, HostSnapshot};
pub use report::{ControllerKind, LatestReport};
