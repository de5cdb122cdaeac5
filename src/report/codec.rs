use super::layout::{
    AnalogButton, AnalogHat, Angle, Button, ControllerKind, ReportLayout, Sensor,
};
use super::status;
use serde::Serialize;
use std::f64::consts::PI;

/// Zero-g output of the sixaxis accelerometer: 1.65 V of a 3.3 V, 10 bit range
pub const ZERO_G: f64 = 511.5;
/// 660 mV per g on the same scale
pub const SENSITIVITY: f64 = 204.6;

/// Most recent input report and the one before it
///
/// Buffers start right at the report-ID byte for both wired and wireless
/// input. An update replaces the whole buffer. Every query answers false or 0
/// until the first report arrives, and for fields the profile does not have.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LatestReport {
    kind: Option<ControllerKind>,
    current: Vec<u8>,
    previous: Vec<u8>,
    received: u64,
}

impl LatestReport {
    pub fn new(kind: ControllerKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn kind(&self) -> Option<ControllerKind> {
        self.kind
    }

    /// Switch profile. Stored samples belong to the old layout and are dropped.
    pub fn set_kind(&mut self, kind: Option<ControllerKind>) {
        if self.kind != kind {
            *self = Self {
                kind,
                ..Self::default()
            };
        }
    }

    pub fn update(&mut self, report: &[u8]) {
        self.previous = std::mem::replace(&mut self.current, report.to_vec());
        self.received += 1;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn has_report(&self) -> bool {
        self.received > 0
    }

    /// Number of reports since the last profile change
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn raw(&self) -> &[u8] {
        &self.current
    }

    fn layout(&self) -> Option<&'static ReportLayout> {
        self.kind.map(ControllerKind::layout)
    }

    fn byte(buf: &[u8], offset: usize) -> u8 {
        buf.get(offset).copied().unwrap_or(0)
    }

    fn held(&self, buf: &[u8], button: Button) -> bool {
        self.layout()
            .and_then(|layout| layout.button(button))
            .is_some_and(|(offset, mask)| Self::byte(buf, offset) & mask != 0)
    }

    pub fn button(&self, button: Button) -> bool {
        self.held(&self.current, button)
    }

    /// Held now but not in the previous report
    pub fn button_pressed(&self, button: Button) -> bool {
        self.held(&self.current, button) && !self.held(&self.previous, button)
    }

    /// Held in the previous report but not any more
    pub fn button_released(&self, button: Button) -> bool {
        !self.held(&self.current, button) && self.held(&self.previous, button)
    }

    pub fn analog_button(&self, button: AnalogButton) -> u8 {
        self.layout()
            .and_then(|layout| layout.analog_button(button))
            .map_or(0, |offset| Self::byte(&self.current, offset))
    }

    pub fn analog_hat(&self, hat: AnalogHat) -> u8 {
        self.layout()
            .and_then(|layout| layout.hat(hat))
            .map_or(0, |offset| Self::byte(&self.current, offset))
    }

    pub fn sensor(&self, sensor: Sensor) -> i32 {
        if !self.has_report() {
            return 0;
        }
        self.layout()
            .and_then(|layout| layout.sensor(sensor))
            .map_or(0, |(offset, rule)| {
                rule.combine(
                    Self::byte(&self.current, offset),
                    Self::byte(&self.current, offset + 1),
                )
            })
    }

    /// Pitch or roll in degrees for profiles with a three axis accelerometer
    pub fn angle(&self, angle: Angle) -> i16 {
        match self.layout() {
            Some(layout) if layout.tilt && self.has_report() => tilt(
                self.sensor(Sensor::AccelX),
                self.sensor(Sensor::AccelY),
                self.sensor(Sensor::AccelZ),
                angle,
            ),
            _ => 0,
        }
    }

    pub fn status_byte(&self, offset: Option<usize>) -> u8 {
        offset.map_or(0, |offset| Self::byte(&self.current, offset))
    }

    /// Connection, battery and radio status in human readable form
    pub fn status_string(&self) -> String {
        let Some(kind) = self.kind else {
            return "Error".to_string();
        };
        let layout = kind.layout();
        match kind {
            ControllerKind::Motion => {
                status::motion_status_line(self.status_byte(Some(layout.status.power)))
            }
            ControllerKind::Gamepad | ControllerKind::Navigation => status::sixaxis_status_line(
                self.status_byte(layout.status.connection),
                self.status_byte(Some(layout.status.power)),
                self.status_byte(layout.status.wireless),
            ),
        }
    }
}

fn to_g(raw: i32) -> f64 {
    (ZERO_G - raw as f64) / SENSITIVITY * 2.0
}

/// Tilt from raw accelerometer readings.
///
/// The angle is measured against the horizontal and folded out to the full
/// circle when the Z axis points down.
pub fn tilt(raw_x: i32, raw_y: i32, raw_z: i32, angle: Angle) -> i16 {
    let x = to_g(raw_x);
    let y = to_g(raw_y);
    let z = to_g(raw_z);
    let r = (x.powi(2) + y.powi(2) + z.powi(2)).sqrt();

    let axis = match angle {
        Angle::Pitch => x,
        Angle::Roll => y,
    };
    let mut degrees = (axis / r).acos() * 180.0 / PI - 90.0;
    if z < 0.0 {
        degrees = if degrees < 0.0 {
            -180.0 - degrees
        } else {
            180.0 - degrees
        };
    }
    degrees as i16
}
