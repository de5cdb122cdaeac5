//! USB transport seam
//!
//! The host never talks to a USB stack directly. Whatever enumerates devices
//! hands over a [`UsbDevice`], and the host opens the pipes it needs through it.

pub mod sim;

use crate::error::TransportError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

pub const SONY_VENDOR_ID: u16 = 0x054C;
pub const GAMEPAD_PRODUCT_ID: u16 = 0x0268;
pub const MOTION_PRODUCT_ID: u16 = 0x03D5;
pub const NAVIGATION_PRODUCT_ID: u16 = 0x042F;
pub const CSR_VENDOR_ID: u16 = 0x0A12;
pub const CSR_PRODUCT_ID: u16 = 0x0001;

/// Endpoints used by the dongle and the wired controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// HCI events on the dongle, input reports on wired controllers
    InterruptIn,
    /// Output reports on the wired motion controller
    InterruptOut,
    BulkIn,
    BulkOut,
}

/// USB control request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl SetupPacket {
    /// Class request carrying an HCI command to the primary controller
    pub const HCI_COMMAND: SetupPacket = SetupPacket {
        request_type: 0x20,
        request: 0x00,
        value: 0x0000,
        index: 0x0000,
    };

    /// HID SET_REPORT for the given report type and id
    pub fn set_report(report_type: u8, report_id: u8) -> Self {
        Self {
            request_type: 0x21,
            request: 0x09,
            value: u16::from(report_type) << 8 | u16::from(report_id),
            index: 0x0000,
        }
    }

    /// HID GET_REPORT for the given report type and id
    pub fn get_report(report_type: u8, report_id: u8) -> Self {
        Self {
            request_type: 0xA1,
            request: 0x01,
            value: u16::from(report_type) << 8 | u16::from(report_id),
            index: 0x0000,
        }
    }
}

/// A device handed over by the USB host stack
#[async_trait]
pub trait UsbDevice: Send + Sync + fmt::Debug {
    fn vendor_id(&self) -> u16;

    fn product_id(&self) -> u16;

    /// Open a pipe on the first interface. Transfers on it give up after `timeout`.
    async fn open_pipe(
        &self,
        endpoint: Endpoint,
        timeout: Duration,
    ) -> Result<Box<dyn Pipe>, TransportError>;

    /// Control transfer on endpoint zero. Returns the number of bytes moved.
    async fn control_transfer(
        &self,
        setup: SetupPacket,
        data: &mut [u8],
    ) -> Result<usize, TransportError>;
}

/// An opened endpoint
#[async_trait]
pub trait Pipe: Send + Sync + fmt::Debug {
    /// Polling interval advertised by the endpoint descriptor
    fn poll_interval(&self) -> Duration;

    /// Move one buffer. IN pipes fill `buf` and return the received length,
    /// OUT pipes send all of it.
    async fn transfer(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// What a VID/PID pair is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    BluetoothDongle,
    Gamepad,
    Motion,
    Navigation,
    Unknown,
}

impl DeviceKind {
    pub fn classify(vendor_id: u16, product_id: u16) -> Self {
        match (vendor_id, product_id) {
            (CSR_VENDOR_ID, CSR_PRODUCT_ID) => DeviceKind::BluetoothDongle,
            (SONY_VENDOR_ID, GAMEPAD_PRODUCT_ID) => DeviceKind::Gamepad,
            (SONY_VENDOR_ID, MOTION_PRODUCT_ID) => DeviceKind::Motion,
            (SONY_VENDOR_ID, NAVIGATION_PRODUCT_ID) => DeviceKind::Navigation,
            _ => DeviceKind::Unknown,
        }
    }

    pub fn of(device: &dyn UsbDevice) -> Self {
        Self::classify(device.vendor_id(), device.product_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_devices() {
        assert_eq!(
            DeviceKind::classify(0x0A12, 0x0001),
            DeviceKind::BluetoothDongle
        );
        assert_eq!(DeviceKind::classify(0x054C, 0x0268), DeviceKind::Gamepad);
        assert_eq!(DeviceKind::classify(0x054C, 0x03D5), DeviceKind::Motion);
        assert_eq!(DeviceKind::classify(0x054C, 0x042F), DeviceKind::Navigation);
        assert_eq!(DeviceKind::classify(0x046D, 0xC21D), DeviceKind::Unknown);
    }

    #[test]
    fn report_setup_values() {
        let setup = SetupPacket::set_report(0x03, 0xF4);
        assert_eq!(setup.request_type, 0x21);
        assert_eq!(setup.request, 0x09);
        assert_eq!(setup.value, 0x03F4);

        let setup = SetupPacket::get_report(0x03, 0x04);
        assert_eq!(setup.request_type, 0xA1);
        assert_eq!(setup.request, 0x01);
        assert_eq!(setup.value, 0x0304);
    }
}
