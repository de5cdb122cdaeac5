//! HID output reports and the timing rules for sending them

pub mod encoder;
pub mod pacer;

pub use encoder::{Color, GamepadOutput, Led, Rgb, Rumble, WandOutput, ENABLE_STREAMING};
pub use pacer::{CommandPacer, KeepAlive};
