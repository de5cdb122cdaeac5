use color_eyre::{eyre::eyre, Result};
use ps3host::host::{HostHandle, HostSnapshot};
use ps3host::output::{Led, Rumble};
use ps3host::report::{AnalogHat, Angle, Button, Sensor};
use ps3host::transport::sim::SimulatedDongle;
use ps3host::HostConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DEMO_CONTROLLER: &str = "PLAYSTATION(R)3 Controller";

#[tokio::main]
async fn main() -> Result<()> {
    let config = setup().await?;
    let settings = config.to_settings();

    // Real hardware needs a USB backend; the demo runs against the simulated dongle
    let dongle = SimulatedDongle::with_controller(DEMO_CONTROLLER);
    let host = HostHandle::spawn(Arc::new(dongle.clone()), settings)
        .await
        .map_err(|e| eyre!("Failed to spawn host: {}", e))?;

    let mut snapshots = host.subscribe();
    let connected = tokio::select! {
        snapshot = wait_for(&mut snapshots, HostSnapshot::is_connected) => snapshot?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            host.detach().await?;
            return Ok(());
        }
    };
    info!(
        "{} at {} ({})",
        connected.remote_name, connected.remote_address, connected.report.status_string()
    );

    host.set_led(Led::Led2, true).await?;
    host.rumble_on(Rumble::Low).await?;

    let mut report = [0u8; 49];
    report[0] = 0x01;
    report[2] = 0x08; // Start
    report[6] = 0xFF; // left stick full right
    dongle.push_report(&report).await;

    let snapshot = wait_for(&mut snapshots, |s| s.report.has_report()).await?;
    let latest = &snapshot.report;
    info!(
        "Start pressed: {}, left stick X: {}, accel X: {}, pitch: {}",
        latest.button_pressed(Button::Start),
        latest.analog_hat(AnalogHat::LeftX),
        latest.sensor(Sensor::AccelX),
        latest.angle(Angle::Pitch),
    );
    info!("Status: {}", latest.status_string());

    host.rumble_off().await?;
    host.disconnect_controller().await?;
    wait_for(&mut snapshots, |s| !s.is_connected() && s.remote_address.is_zero()).await?;
    info!("Controller released, host is scanning again");

    host.detach().await?;
    Ok(())
}

async fn wait_for(
    snapshots: &mut watch::Receiver<HostSnapshot>,
    condition: impl Fn(&HostSnapshot) -> bool,
) -> Result<HostSnapshot> {
    let snapshot = tokio::time::timeout(Duration::from_secs(30), snapshots.wait_for(|s| condition(s)))
        .await
        .map_err(|_| eyre!("Timed out waiting for the host"))?
        .map_err(|e| eyre!("Host stopped: {}", e))?;
    Ok(snapshot.clone())
}

async fn setup() -> Result<HostConfig> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }

    let config = HostConfig::load_or_create().await;
    let level = config
        .as_ref()
        .ok()
        .and_then(|config| config.log_level.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    setup_logging_env(level);

    match config {
        Ok(config) => {
            debug!("Config: {:?}", config);
            Ok(config)
        }
        Err(e) => {
            warn!("Using default config: {}", e);
            Ok(HostConfig::default())
        }
    }
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
