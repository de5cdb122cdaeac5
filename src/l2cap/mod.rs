//! L2CAP signaling for the two HID channels
//!
//! [`acl`] wraps and unwraps the ACL envelope, [`signaling`] holds the
//! C-frame codec and [`channel`] the [`ChannelNegotiator`] state machine.

pub mod acl;
pub mod channel;
pub mod signaling;

pub use acl::AclFrame;
pub use channel::{
    Channel, ChannelIdentity, ChannelNegotiator, ChannelNotice, ChannelState, ChannelStep,
    SignalFlags,
};
pub use signaling::{ConnectionResult, SignalPdu, CONTROL_CID, INTERRUPT_CID, SIGNALING_CID};
