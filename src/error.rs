//! Error types shared across the host

use thiserror::Error;

/// Rejections produced while decoding inbound HCI or ACL buffers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Truncated packet: needed {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("Unknown signaling code: {0:#04x}")]
    UnknownSignal(u8),

    #[error("ACL frame for handle {actual:#06x}, expected {expected:#06x}")]
    BadHandle { expected: u16, actual: u16 },
}

/// Failures reported by the USB transport collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transfer timed out")]
    Timeout,

    #[error("Device disconnected")]
    Disconnected,

    #[error("Endpoint stalled")]
    Stall,

    #[error("Transport I/O error: {0}")]
    Io(String),
}

/// Errors surfaced to callers of the host and wired APIs
#[derive(Debug, Error)]
pub enum HostError {
    /// No controller has finished negotiation yet
    #[error("No controller connected")]
    NotConnected,

    /// The command does not apply to the connected controller type
    #[error("Command not supported by connected controller: {0}")]
    WrongController(String),

    #[error("Unsupported device {vendor_id:04x}:{product_id:04x}")]
    UnsupportedDevice { vendor_id: u16, product_id: u16 },

    /// The host task is gone
    #[error("Channel error: {0}")]
    ChannelClosed(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
