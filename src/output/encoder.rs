use serde::{Deserialize, Serialize};
use std::fmt;

pub const OUTPUT_REPORT_LEN: usize = 48;

/// Output report with all LEDs and rumble off
pub const OUTPUT_REPORT_TEMPLATE: [u8; OUTPUT_REPORT_LEN] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0xFF, 0x27, 0x10, 0x00, 0x32, //
    0xFF, 0x27, 0x10, 0x00, 0x32, //
    0xFF, 0x27, 0x10, 0x00, 0x32, //
    0xFF, 0x27, 0x10, 0x00, 0x32, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// HID SET_REPORT (0x50) | Output (0x02), report 0x01
const BT_OUTPUT_HEADER: [u8; 2] = [0x52, 0x01];
/// HID SET_REPORT (0x50) | Feature (0x03), report 0xF4: start streaming input reports
pub const ENABLE_STREAMING: [u8; 6] = [0x53, 0xF4, 0x42, 0x03, 0x00, 0x00];

const LED_BYTE: usize = 9;

/// The four player LEDs and their combinations, numbered 1 to 10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Led {
    Led1 = 0x01,
    Led2 = 0x02,
    Led3 = 0x04,
    Led4 = 0x08,
    Led5 = 0x09,
    Led6 = 0x0A,
    Led7 = 0x0C,
    Led8 = 0x0D,
    Led9 = 0x0E,
    Led10 = 0x0F,
}

impl Led {
    fn bits(self) -> u8 {
        ((self as u8) & 0x0F) << 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rumble {
    High,
    Low,
}

/// LED and rumble state of a gamepad, kept between writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamepadOutput {
    report: [u8; OUTPUT_REPORT_LEN],
}

impl Default for GamepadOutput {
    fn default() -> Self {
        Self {
            report: OUTPUT_REPORT_TEMPLATE,
        }
    }
}

impl GamepadOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> &[u8; OUTPUT_REPORT_LEN] {
        &self.report
    }

    pub fn all_off(&mut self) {
        self.report = OUTPUT_REPORT_TEMPLATE;
    }

    pub fn led_on(&mut self, led: Led) {
        self.report[LED_BYTE] |= led.bits();
    }

    /// Returns false when the LED was not lit, in which case nothing needs sending
    pub fn led_off(&mut self, led: Led) -> bool {
        if self.report[LED_BYTE] & ((led as u8) << 1) == 0 {
            return false;
        }
        self.report[LED_BYTE] ^= led.bits();
        true
    }

    pub fn rumble_on(&mut self, rumble: Rumble) {
        self.report[1] = 0xFE;
        self.report[3] = 0xFE;
        match rumble {
            Rumble::High => {
                self.report[2] = 0x00;
                self.report[4] = 0xFF;
            }
            Rumble::Low => {
                self.report[4] = 0x00;
                self.report[2] = 0xFF;
            }
        }
    }

    pub fn rumble_off(&mut self) {
        self.report[1..5].fill(0);
    }

    /// L2CAP payload for the control channel
    pub fn bluetooth_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(BT_OUTPUT_HEADER.len() + OUTPUT_REPORT_LEN);
        payload.extend_from_slice(&BT_OUTPUT_HEADER);
        payload.extend_from_slice(&self.report);
        payload
    }

    /// SET_REPORT data for the wired control pipe
    pub fn wired_payload(&self) -> Vec<u8> {
        self.report.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Named wand colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    Red,
    Green,
    Blue,
    Yellow,
    Lightblue,
    Purple,
    Off,
}

impl Color {
    /// Order shown on the wand when it connects
    pub const PALETTE: [Color; 7] = [
        Color::Red,
        Color::Green,
        Color::Blue,
        Color::Yellow,
        Color::Lightblue,
        Color::Purple,
        Color::Off,
    ];

    pub fn rgb(self) -> Rgb {
        match self {
            Color::Red => Rgb::new(0xFF, 0x00, 0x00),
            Color::Green => Rgb::new(0x00, 0xFF, 0x00),
            Color::Blue => Rgb::new(0x00, 0x00, 0xFF),
            Color::Yellow => Rgb::new(0xFF, 0xEB, 0x04),
            Color::Lightblue => Rgb::new(0x00, 0xFF, 0xFF),
            Color::Purple => Rgb::new(0xFF, 0x00, 0xFF),
            Color::Off => Rgb::new(0x00, 0x00, 0x00),
        }
    }
}

impl From<Color> for Rgb {
    fn from(color: Color) -> Self {
        color.rgb()
    }
}

pub const WAND_BT_REPORT_LEN: usize = 50;

/// Sphere color and rumble of a motion wand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WandOutput {
    pub color: Rgb,
    pub rumble: u8,
}

impl WandOutput {
    /// HID DATA (0xA0) | Output (0x02), report 0x02, for the interrupt channel
    pub fn bluetooth_payload(&self) -> Vec<u8> {
        let mut payload = vec![0u8; WAND_BT_REPORT_LEN];
        payload[0] = 0xA2;
        payload[1] = 0x02;
        payload[3] = self.color.r;
        payload[4] = self.color.g;
        payload[5] = self.color.b;
        payload[7] = self.rumble;
        payload
    }

    /// Interrupt-out report for a wand on USB
    pub fn wired_payload(&self) -> [u8; 7] {
        [
            0x02,
            0x00,
            self.color.r,
            self.color.g,
            self.color.b,
            0x00,
            self.rumble,
        ]
    }
}
