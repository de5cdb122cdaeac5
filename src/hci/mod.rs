//! Host Controller Interface
//!
//! Only the handful of commands and events needed to accept a single
//! controller connection:
//!
//! 1. [`command`] - command encoders and the flags each command invalidates
//! 2. [`event`] - event reassembly, decoding and the [`EventFlags`] bitset
//! 3. [`link`] - the [`LinkController`] state machine

pub mod address;
pub mod command;
pub mod event;
pub mod link;

pub use address::BdAddr;
pub use command::{HciCommand, Opcode, Role, ScanMode};
pub use event::{EventAssembler, EventFlags, HciEvent, RemoteName};
pub use link::{LinkController, LinkIdentity, LinkNotice, LinkState, LinkStep, LinkTiming};
