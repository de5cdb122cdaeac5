//! Input report decoding for the three controller profiles
//!
//! The per-profile offset tables in [`layout`] are plain data; [`LatestReport`]
//! answers every query by looking up the field there.

pub mod codec;
pub mod layout;
pub mod status;

pub use codec::{tilt, LatestReport};
pub use layout::{AnalogButton, AnalogHat, Angle, Button, ControllerKind, Sensor};
pub use status::{ConnectionStatus, PowerRating, WirelessStatus};
