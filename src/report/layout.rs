use crate::hci::RemoteName;
use crate::transport::{GAMEPAD_PRODUCT_ID, MOTION_PRODUCT_ID, NAVIGATION_PRODUCT_ID};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three supported controller models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerKind {
    Gamepad,
    Navigation,
    Motion,
}

impl ControllerKind {
    /// Profile selection from the first letter of the Bluetooth name:
    /// "PLAYSTATION(R)3 Controller", "Navigation Controller", "Motion Controller"
    pub fn from_initial(initial: char) -> Option<Self> {
        match initial {
            'P' => Some(ControllerKind::Gamepad),
            'N' => Some(ControllerKind::Navigation),
            'M' => Some(ControllerKind::Motion),
            _ => None,
        }
    }

    pub fn from_remote_name(name: &RemoteName) -> Option<Self> {
        name.first_char().and_then(Self::from_initial)
    }

    pub fn from_product_id(product_id: u16) -> Option<Self> {
        match product_id {
            GAMEPAD_PRODUCT_ID => Some(ControllerKind::Gamepad),
            NAVIGATION_PRODUCT_ID => Some(ControllerKind::Navigation),
            MOTION_PRODUCT_ID => Some(ControllerKind::Motion),
            _ => None,
        }
    }

    pub fn layout(self) -> &'static ReportLayout {
        match self {
            ControllerKind::Gamepad => &GAMEPAD_LAYOUT,
            ControllerKind::Navigation => &NAVIGATION_LAYOUT,
            ControllerKind::Motion => &MOTION_LAYOUT,
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerKind::Gamepad => "Dualshock 3 Controller",
            ControllerKind::Navigation => "Navigation Controller",
            ControllerKind::Motion => "Motion Controller",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Select,
    L3,
    R3,
    Start,
    Up,
    Right,
    Down,
    Left,
    L2,
    R2,
    L1,
    R1,
    Triangle,
    Circle,
    Cross,
    Square,
    Ps,
    Move,
    T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalogButton {
    Up,
    Right,
    Down,
    Left,
    L2,
    R2,
    L1,
    R1,
    Triangle,
    Circle,
    Cross,
    Square,
    T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalogHat {
    LeftX,
    LeftY,
    RightX,
    RightY,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    AccelX,
    AccelY,
    AccelZ,
    GyroX,
    GyroY,
    GyroZ,
    Temperature,
    MagX,
    MagY,
    MagZ,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Angle {
    Pitch,
    Roll,
}

/// How two adjacent report bytes combine into one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorRule {
    /// `b0 << 8 | b1`
    BigEndian,
    /// `(b1 << 8 | b0) - 0x8000`
    LittleEndianBiased,
    /// Unsigned 12 bits: `b0 << 4 | b1 >> 4`
    HighNibbleFirst,
    /// Signed 12 bits: `b0 << 4 | b1 >> 4`
    SignedHighNibbleFirst,
    /// Signed 12 bits: `(b0 & 0x0F) << 8 | b1`
    SignedLowNibbleFirst,
}

fn sign_extend_12(value: i32) -> i32 {
    (value << 20) >> 20
}

impl SensorRule {
    pub fn combine(self, b0: u8, b1: u8) -> i32 {
        let (b0, b1) = (b0 as i32, b1 as i32);
        match self {
            SensorRule::BigEndian => (b0 << 8) | b1,
            SensorRule::LittleEndianBiased => ((b1 << 8) | b0) - 0x8000,
            SensorRule::HighNibbleFirst => (b0 << 4) | (b1 >> 4),
            SensorRule::SignedHighNibbleFirst => sign_extend_12((b0 << 4) | (b1 >> 4)),
            SensorRule::SignedLowNibbleFirst => sign_extend_12(((b0 & 0x0F) << 8) | b1),
        }
    }
}

/// Where the status bytes live. The wand only reports its power rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLayout {
    pub connection: Option<usize>,
    pub power: usize,
    pub wireless: Option<usize>,
}

/// Offsets of every field in one controller's input report, counted from the report-ID byte
#[derive(Debug)]
pub struct ReportLayout {
    pub buttons: &'static [(Button, usize, u8)],
    pub analog_buttons: &'static [(AnalogButton, usize)],
    pub hats: &'static [(AnalogHat, usize)],
    pub sensors: &'static [(Sensor, usize, SensorRule)],
    pub status: StatusLayout,
    pub tilt: bool,
}

impl ReportLayout {
    pub fn button(&self, button: Button) -> Option<(usize, u8)> {
        self.buttons
            .iter()
            .find(|(b, _, _)| *b == button)
            .map(|&(_, offset, mask)| (offset, mask))
    }

    pub fn analog_button(&self, button: AnalogButton) -> Option<usize> {
        self.analog_buttons
            .iter()
            .find(|(b, _)| *b == button)
            .map(|&(_, offset)| offset)
    }

    pub fn hat(&self, hat: AnalogHat) -> Option<usize> {
        self.hats
            .iter()
            .find(|(h, _)| *h == hat)
            .map(|&(_, offset)| offset)
    }

    pub fn sensor(&self, sensor: Sensor) -> Option<(usize, SensorRule)> {
        self.sensors
            .iter()
            .find(|(s, _, _)| *s == sensor)
            .map(|&(_, offset, rule)| (offset, rule))
    }
}

const SIXAXIS_STATUS: StatusLayout = StatusLayout {
    connection: Some(29),
    power: 30,
    wireless: Some(31),
};

pub static GAMEPAD_LAYOUT: ReportLayout = ReportLayout {
    buttons: &[
        (Button::Select, 2, 0x01),
        (Button::L3, 2, 0x02),
        (Button::R3, 2, 0x04),
        (Button::Start, 2, 0x08),
        (Button::Up, 2, 0x10),
        (Button::Right, 2, 0x20),
        (Button::Down, 2, 0x40),
        (Button::Left, 2, 0x80),
        (Button::L2, 3, 0x01),
        (Button::R2, 3, 0x02),
        (Button::L1, 3, 0x04),
        (Button::R1, 3, 0x08),
        (Button::Triangle, 3, 0x10),
        (Button::Circle, 3, 0x20),
        (Button::Cross, 3, 0x40),
        (Button::Square, 3, 0x80),
        (Button::Ps, 4, 0x01),
    ],
    analog_buttons: &[
        (AnalogButton::Up, 14),
        (AnalogButton::Right, 15),
        (AnalogButton::Down, 16),
        (AnalogButton::Left, 17),
        (AnalogButton::L2, 18),
        (AnalogButton::R2, 19),
        (AnalogButton::L1, 20),
        (AnalogButton::R1, 21),
        (AnalogButton::Triangle, 22),
        (AnalogButton::Circle, 23),
        (AnalogButton::Cross, 24),
        (AnalogButton::Square, 25),
    ],
    hats: &[
        (AnalogHat::LeftX, 6),
        (AnalogHat::LeftY, 7),
        (AnalogHat::RightX, 8),
        (AnalogHat::RightY, 9),
    ],
    sensors: &[
        (Sensor::AccelX, 41, SensorRule::BigEndian),
        (Sensor::AccelY, 43, SensorRule::BigEndian),
        (Sensor::AccelZ, 45, SensorRule::BigEndian),
        (Sensor::GyroZ, 47, SensorRule::BigEndian),
    ],
    status: SIXAXIS_STATUS,
    tilt: true,
};

pub static NAVIGATION_LAYOUT: ReportLayout = ReportLayout {
    buttons: &[
        (Button::L3, 2, 0x02),
        (Button::Up, 2, 0x10),
        (Button::Right, 2, 0x20),
        (Button::Down, 2, 0x40),
        (Button::Left, 2, 0x80),
        (Button::L2, 3, 0x01),
        (Button::L1, 3, 0x04),
        (Button::Circle, 3, 0x20),
        (Button::Cross, 3, 0x40),
        (Button::Ps, 4, 0x01),
    ],
    analog_buttons: &[
        (AnalogButton::Up, 14),
        (AnalogButton::Right, 15),
        (AnalogButton::Down, 16),
        (AnalogButton::Left, 17),
        (AnalogButton::L2, 18),
        (AnalogButton::L1, 20),
        (AnalogButton::Circle, 23),
        (AnalogButton::Cross, 24),
    ],
    hats: &[(AnalogHat::LeftX, 6), (AnalogHat::LeftY, 7)],
    sensors: &[],
    status: SIXAXIS_STATUS,
    tilt: false,
};

pub static MOTION_LAYOUT: ReportLayout = ReportLayout {
    buttons: &[
        (Button::Select, 1, 0x01),
        (Button::Start, 1, 0x08),
        (Button::Triangle, 2, 0x10),
        (Button::Circle, 2, 0x20),
        (Button::Cross, 2, 0x40),
        (Button::Square, 2, 0x80),
        (Button::Ps, 3, 0x01),
        (Button::Move, 3, 0x08),
        (Button::T, 3, 0x10),
    ],
    analog_buttons: &[(AnalogButton::T, 6)],
    hats: &[],
    // second of the two sample frames in each report
    sensors: &[
        (Sensor::AccelX, 19, SensorRule::LittleEndianBiased),
        (Sensor::AccelZ, 21, SensorRule::LittleEndianBiased),
        (Sensor::AccelY, 23, SensorRule::LittleEndianBiased),
        (Sensor::GyroX, 31, SensorRule::LittleEndianBiased),
        (Sensor::GyroZ, 33, SensorRule::LittleEndianBiased),
        (Sensor::GyroY, 35, SensorRule::LittleEndianBiased),
        (Sensor::Temperature, 37, SensorRule::HighNibbleFirst),
        (Sensor::MagX, 38, SensorRule::SignedLowNibbleFirst),
        (Sensor::MagY, 40, SensorRule::SignedHighNibbleFirst),
        (Sensor::MagZ, 41, SensorRule::SignedLowNibbleFirst),
    ],
    status: StatusLayout {
        connection: None,
        power: 12,
        wireless: None,
    },
    tilt: false,
};
