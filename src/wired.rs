//! Controllers plugged in over USB
//!
//! No radio involved: feature reports switch the controller on and set the
//! Bluetooth host it will pair with, input reports arrive on the interrupt-in
//! pipe in the same layout as over the air.

use crate::error::{HostError, TransportError};
use crate::hci::BdAddr;
use crate::output::{GamepadOutput, KeepAlive, Led, Rgb, Rumble, WandOutput};
use crate::report::{ControllerKind, LatestReport};
use crate::transport::{DeviceKind, Endpoint, Pipe, SetupPacket, UsbDevice};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const HID_OUTPUT: u8 = 0x02;
const HID_FEATURE: u8 = 0x03;

const INPUT_REPORT_LEN: usize = 64;
const CALIBRATION_BLOCK_LEN: usize = 49;
const CALIBRATION_BLOCKS: usize = 3;

/// Timing for a wired controller
#[derive(Clone, Debug)]
pub struct WiredSettings {
    pub transfer_timeout: Duration,
    /// The wand forgets its color after about five seconds on USB
    pub wired_keepalive: Duration,
}

impl Default for WiredSettings {
    fn default() -> Self {
        Self {
            transfer_timeout: Duration::from_millis(5),
            wired_keepalive: Duration::from_millis(4500),
        }
    }
}

#[derive(Debug)]
pub struct WiredController {
    device: Arc<dyn UsbDevice>,
    kind: ControllerKind,
    input: Box<dyn Pipe>,
    output: Option<Box<dyn Pipe>>,
    report: LatestReport,
    gamepad: GamepadOutput,
    wand: WandOutput,
    keep_alive: KeepAlive,
}

impl WiredController {
    /// Open the input pipe, and for a wand the output pipe as well
    pub async fn open(
        device: Arc<dyn UsbDevice>,
        settings: WiredSettings,
    ) -> Result<Self, HostError> {
        let kind = match DeviceKind::of(device.as_ref()) {
            DeviceKind::Gamepad => ControllerKind::Gamepad,
            DeviceKind::Navigation => ControllerKind::Navigation,
            DeviceKind::Motion => ControllerKind::Motion,
            other => {
                warn!("Not a wired controller: {:?}", other);
                return Err(HostError::UnsupportedDevice {
                    vendor_id: device.vendor_id(),
                    product_id: device.product_id(),
                });
            }
        };

        let input = device
            .open_pipe(Endpoint::InterruptIn, settings.transfer_timeout)
            .await?;
        let mut keep_alive = KeepAlive::new(settings.wired_keepalive);
        let output = if kind == ControllerKind::Motion {
            keep_alive.start();
            Some(
                device
                    .open_pipe(Endpoint::InterruptOut, settings.transfer_timeout)
                    .await?,
            )
        } else {
            None
        };

        info!("Opened wired {}", kind);
        Ok(Self {
            device,
            kind,
            input,
            output,
            report: LatestReport::new(kind),
            gamepad: GamepadOutput::new(),
            wand: WandOutput::default(),
            keep_alive,
        })
    }

    pub fn kind(&self) -> ControllerKind {
        self.kind
    }

    pub fn report(&self) -> &LatestReport {
        &self.report
    }

    /// Switch on report streaming. The wand streams on its own.
    pub async fn enable(&self) -> Result<(), HostError> {
        if self.kind == ControllerKind::Motion {
            return Ok(());
        }
        let mut data = [0x42, 0x0C, 0x00, 0x00];
        self.device
            .control_transfer(SetupPacket::set_report(HID_FEATURE, 0xF4), &mut data)
            .await?;
        debug!("Wired {} enabled", self.kind);
        Ok(())
    }

    /// Store the Bluetooth host this controller will connect to
    pub async fn set_host_address(&self, address: BdAddr) -> Result<(), HostError> {
        match self.kind {
            ControllerKind::Motion => {
                let mut data = [0u8; 11];
                data[0] = 0x05;
                data[1..7].copy_from_slice(&address.wire_bytes());
                data[7..].copy_from_slice(&[0x10, 0x01, 0x02, 0x12]);
                self.device
                    .control_transfer(SetupPacket::set_report(HID_FEATURE, 0x05), &mut data)
                    .await?;
            }
            _ => {
                let mut data = [0u8; 8];
                data[0] = 0x01;
                data[2..].copy_from_slice(&address.display_bytes());
                self.device
                    .control_transfer(SetupPacket::set_report(HID_FEATURE, 0xF5), &mut data)
                    .await?;
            }
        }
        info!("Pairing address of {} set to {}", self.kind, address);
        Ok(())
    }

    pub async fn host_address(&self) -> Result<BdAddr, HostError> {
        let address = match self.kind {
            ControllerKind::Motion => {
                let mut data = [0u8; 16];
                self.device
                    .control_transfer(SetupPacket::get_report(HID_FEATURE, 0x04), &mut data)
                    .await?;
                BdAddr::from_wire_slice(&data[10..])
            }
            _ => {
                let mut data = [0u8; 8];
                self.device
                    .control_transfer(SetupPacket::get_report(HID_FEATURE, 0xF5), &mut data)
                    .await?;
                let mut display = [0u8; 6];
                display.copy_from_slice(&data[2..]);
                Some(BdAddr::from_display(display))
            }
        };
        Ok(address.unwrap_or_default())
    }

    /// Calibration blob of a wand, as three consecutive feature reads
    pub async fn read_calibration(&self) -> Result<Vec<u8>, HostError> {
        self.require(&[ControllerKind::Motion], "calibration")?;
        let mut calibration = Vec::with_capacity(CALIBRATION_BLOCK_LEN * CALIBRATION_BLOCKS);
        for _ in 0..CALIBRATION_BLOCKS {
            let mut block = [0u8; CALIBRATION_BLOCK_LEN];
            let len = self
                .device
                .control_transfer(SetupPacket::get_report(HID_FEATURE, 0x10), &mut block)
                .await?;
            calibration.extend_from_slice(&block[..len.min(CALIBRATION_BLOCK_LEN)]);
        }
        Ok(calibration)
    }

    /// Read one input report. Returns false when none was waiting.
    pub async fn poll(&mut self) -> Result<bool, HostError> {
        let mut buf = [0u8; INPUT_REPORT_LEN];
        match self.input.transfer(&mut buf).await {
            Ok(0) | Err(TransportError::Timeout) => Ok(false),
            Ok(len) => {
                self.report.update(&buf[..len]);
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn set_led(&mut self, led: Led, on: bool) -> Result<(), HostError> {
        self.require(&[ControllerKind::Gamepad, ControllerKind::Navigation], "LED")?;
        if on {
            self.gamepad.led_on(led);
        } else if !self.gamepad.led_off(led) {
            return Ok(());
        }
        self.write_gamepad().await
    }

    pub async fn rumble_on(&mut self, rumble: Rumble) -> Result<(), HostError> {
        self.require(&[ControllerKind::Gamepad, ControllerKind::Navigation], "rumble")?;
        self.gamepad.rumble_on(rumble);
        self.write_gamepad().await
    }

    pub async fn rumble_off(&mut self) -> Result<(), HostError> {
        self.require(&[ControllerKind::Gamepad, ControllerKind::Navigation], "rumble")?;
        self.gamepad.rumble_off();
        self.write_gamepad().await
    }

    pub async fn all_off(&mut self) -> Result<(), HostError> {
        self.require(&[ControllerKind::Gamepad, ControllerKind::Navigation], "LED")?;
        self.gamepad.all_off();
        self.write_gamepad().await
    }

    pub async fn set_wand_color(&mut self, color: impl Into<Rgb>) -> Result<(), HostError> {
        self.require(&[ControllerKind::Motion], "wand color")?;
        self.wand.color = color.into();
        self.write_wand().await
    }

    pub async fn set_wand_rumble(&mut self, value: u8) -> Result<(), HostError> {
        self.require(&[ControllerKind::Motion], "wand rumble")?;
        self.wand.rumble = value;
        self.write_wand().await
    }

    /// Re-send the wand state if it has not been written for a while
    pub async fn keep_alive(&mut self) -> Result<(), HostError> {
        if self.keep_alive.is_due() {
            debug!("Wired wand keep-alive");
            self.write_wand().await?;
        }
        Ok(())
    }

    async fn write_gamepad(&mut self) -> Result<(), HostError> {
        let mut report = self.gamepad.wired_payload();
        self.device
            .control_transfer(SetupPacket::set_report(HID_OUTPUT, 0x01), &mut report)
            .await?;
        Ok(())
    }

    async fn write_wand(&mut self) -> Result<(), HostError> {
        let mut report = self.wand.wired_payload();
        let Some(output) = self.output.as_mut() else {
            return Err(HostError::WrongController(format!(
                "{} has no output pipe",
                self.kind
            )));
        };
        output.transfer(&mut report).await?;
        self.keep_alive.refreshed();
        Ok(())
    }

    fn require(&self, kinds: &[ControllerKind], what: &str) -> Result<(), HostError> {
        if kinds.contains(&self.kind) {
            Ok(())
        } else {
            Err(HostError::WrongController(format!(
                "{} does not support {}",
                self.kind, what
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Button;
    use crate::transport::{MOTION_PRODUCT_ID, GAMEPAD_PRODUCT_ID, SONY_VENDOR_ID};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorded {
        control: Vec<(SetupPacket, Vec<u8>)>,
        control_replies: VecDeque<Vec<u8>>,
        input: VecDeque<Vec<u8>>,
        output: Vec<Vec<u8>>,
    }

    #[derive(Debug)]
    struct FakeController {
        product_id: u16,
        recorded: Arc<Mutex<Recorded>>,
    }

    impl FakeController {
        fn new(product_id: u16) -> (Arc<Self>, Arc<Mutex<Recorded>>) {
            let recorded = Arc::new(Mutex::new(Recorded::default()));
            let device = Arc::new(Self {
                product_id,
                recorded: recorded.clone(),
            });
            (device, recorded)
        }
    }

    #[derive(Debug)]
    struct FakePipe {
        endpoint: Endpoint,
        recorded: Arc<Mutex<Recorded>>,
    }

    #[async_trait]
    impl UsbDevice for FakeController {
        fn vendor_id(&self) -> u16 {
            SONY_VENDOR_ID
        }

        fn product_id(&self) -> u16 {
            self.product_id
        }

        async fn open_pipe(
            &self,
            endpoint: Endpoint,
            _timeout: Duration,
        ) -> Result<Box<dyn Pipe>, TransportError> {
            Ok(Box::new(FakePipe {
                endpoint,
                recorded: self.recorded.clone(),
            }))
        }

        async fn control_transfer(
            &self,
            setup: SetupPacket,
            data: &mut [u8],
        ) -> Result<usize, TransportError> {
            let mut recorded = self.recorded.lock().unwrap();
            if let Some(reply) = recorded.control_replies.pop_front() {
                let len = reply.len().min(data.len());
                data[..len].copy_from_slice(&reply[..len]);
            }
            recorded.control.push((setup, data.to_vec()));
            Ok(data.len())
        }
    }

    #[async_trait]
    impl Pipe for FakePipe {
        fn poll_interval(&self) -> Duration {
            Duration::from_millis(1)
        }

        async fn transfer(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let mut recorded = self.recorded.lock().unwrap();
            match self.endpoint {
                Endpoint::InterruptOut => {
                    recorded.output.push(buf.to_vec());
                    Ok(buf.len())
                }
                _ => match recorded.input.pop_front() {
                    Some(report) => {
                        buf[..report.len()].copy_from_slice(&report);
                        Ok(report.len())
                    }
                    None => Err(TransportError::Timeout),
                },
            }
        }
    }

    fn host() -> BdAddr {
        BdAddr::from_display([0x00, 0x1B, 0xDC, 0x0F, 0x22, 0x33])
    }

    #[tokio::test]
    async fn gamepad_enable_and_pairing_reports() {
        let (device, recorded) = FakeController::new(GAMEPAD_PRODUCT_ID);
        let controller = WiredController::open(device, WiredSettings::default())
            .await
            .unwrap();
        controller.enable().await.unwrap();
        controller.set_host_address(host()).await.unwrap();

        let recorded = recorded.lock().unwrap();
        let (setup, data) = &recorded.control[0];
        assert_eq!(setup.value, 0x03F4);
        assert_eq!(data, &vec![0x42, 0x0C, 0x00, 0x00]);

        let (setup, data) = &recorded.control[1];
        assert_eq!((setup.request_type, setup.request, setup.value), (0x21, 0x09, 0x03F5));
        assert_eq!(data, &vec![0x01, 0x00, 0x00, 0x1B, 0xDC, 0x0F, 0x22, 0x33]);
    }

    #[tokio::test]
    async fn wand_pairing_address_is_lsb_first() {
        let (device, recorded) = FakeController::new(MOTION_PRODUCT_ID);
        let controller = WiredController::open(device, WiredSettings::default())
            .await
            .unwrap();
        controller.set_host_address(host()).await.unwrap();

        let mut reply = vec![0u8; 16];
        reply[10..].copy_from_slice(&host().wire_bytes());
        recorded.lock().unwrap().control_replies.push_back(reply);
        assert_eq!(controller.host_address().await.unwrap(), host());

        let recorded = recorded.lock().unwrap();
        let (setup, data) = &recorded.control[0];
        assert_eq!(setup.value, 0x0305);
        assert_eq!(
            data,
            &vec![0x05, 0x33, 0x22, 0x0F, 0xDC, 0x1B, 0x00, 0x10, 0x01, 0x02, 0x12]
        );
        assert_eq!(recorded.control[1].0.value, 0x0304);
    }

    #[tokio::test]
    async fn calibration_is_three_blocks() {
        let (device, recorded) = FakeController::new(MOTION_PRODUCT_ID);
        let controller = WiredController::open(device, WiredSettings::default())
            .await
            .unwrap();
        let calibration = controller.read_calibration().await.unwrap();
        assert_eq!(calibration.len(), 3 * 49);
        assert!(recorded
            .lock()
            .unwrap()
            .control
            .iter()
            .all(|(setup, _)| setup.value == 0x0310));
    }

    #[tokio::test]
    async fn gamepad_rejects_wand_commands() {
        let (device, _) = FakeController::new(GAMEPAD_PRODUCT_ID);
        let mut controller = WiredController::open(device, WiredSettings::default())
            .await
            .unwrap();
        assert!(matches!(
            controller.set_wand_rumble(0x80).await,
            Err(HostError::WrongController(_))
        ));
        assert!(matches!(
            controller.read_calibration().await,
            Err(HostError::WrongController(_))
        ));
    }

    #[tokio::test]
    async fn led_goes_out_as_output_report() {
        let (device, recorded) = FakeController::new(GAMEPAD_PRODUCT_ID);
        let mut controller = WiredController::open(device, WiredSettings::default())
            .await
            .unwrap();
        controller.set_led(Led::Led1, true).await.unwrap();
        // already off, nothing to send
        controller.set_led(Led::Led2, false).await.unwrap();

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.control.len(), 1);
        let (setup, data) = &recorded.control[0];
        assert_eq!(setup.value, 0x0201);
        assert_eq!(data.len(), 48);
        assert_eq!(data[9], 0x02);
    }

    #[tokio::test]
    async fn poll_feeds_the_report_codec() {
        let (device, recorded) = FakeController::new(GAMEPAD_PRODUCT_ID);
        let mut controller = WiredController::open(device, WiredSettings::default())
            .await
            .unwrap();
        assert!(!controller.poll().await.unwrap());

        let mut report = vec![0u8; 49];
        report[0] = 0x01;
        report[2] = 0x08;
        recorded.lock().unwrap().input.push_back(report);
        assert!(controller.poll().await.unwrap());
        assert!(controller.report().button(Button::Start));
        assert!(controller.report().button_pressed(Button::Start));
    }

    #[tokio::test(start_paused = true)]
    async fn wand_keep_alive_resends_after_silence() {
        let (device, recorded) = FakeController::new(MOTION_PRODUCT_ID);
        let mut controller = WiredController::open(device, WiredSettings::default())
            .await
            .unwrap();
        controller
            .set_wand_color(Rgb::new(0x10, 0x20, 0x30))
            .await
            .unwrap();

        controller.keep_alive().await.unwrap();
        assert_eq!(recorded.lock().unwrap().output.len(), 1);

        tokio::time::sleep(Duration::from_millis(4600)).await;
        controller.keep_alive().await.unwrap();
        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.output.len(), 2);
        assert_eq!(
            recorded.output[1],
            vec![0x02, 0x00, 0x10, 0x20, 0x30, 0x00, 0x00]
        );
    }
}
