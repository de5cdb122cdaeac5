use crate::hci::{BdAddr, LinkTiming};
use crate::host::HostSettings;
use crate::wired::WiredSettings;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "ps3host";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DongleConfig {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl Default for DongleConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x0A12,
            product_id: 0x0001,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub init_debounce_cycles: u32,
    pub reset_timeout_cycles: u32,
    pub command_spacing_ms: u64,
    pub wand_keepalive_ms: u64,
    pub profile_enable_delay_ms: u64,
    pub palette_step_ms: u64,
    pub transfer_timeout_ms: u64,
    pub wired_keepalive_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            init_debounce_cycles: 10,
            reset_timeout_cycles: 100,
            command_spacing_ms: 250,
            wand_keepalive_ms: 4000,
            profile_enable_delay_ms: 1000,
            palette_step_ms: 100,
            transfer_timeout_ms: 5,
            wired_keepalive_ms: 4500,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PairingConfig {
    /// Host address written to wired controllers, "AA:BB:CC:DD:EE:FF"
    pub host_address: Option<String>,
}

/// Everything the binary reads from `<config_dir>/ps3host/config.toml`
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct HostConfig {
    pub dongle: DongleConfig,
    pub timing: TimingConfig,
    pub pairing: PairingConfig,
    pub log_level: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            dongle: DongleConfig::default(),
            timing: TimingConfig::default(),
            pairing: PairingConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl HostConfig {
    pub fn path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Read the config file, writing the defaults first if there is none
    pub async fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(Self::path()).await
    }

    pub async fn load_or_create_at(path: PathBuf) -> Result<Self> {
        if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| eyre!("Failed to read config file: {}", e))?;
            let config =
                toml::from_str(&content).map_err(|e| eyre!("Failed to parse config file: {}", e))?;
            debug!("Loaded config from {}", path.display());
            return Ok(config);
        }

        let config = Self::default();
        config.save_at(&path).await?;
        info!("Wrote default config to {}", path.display());
        Ok(config)
    }

    pub async fn save_at(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;
        Ok(())
    }

    pub fn pairing_address(&self) -> Result<Option<BdAddr>> {
        self.pairing
            .host_address
            .as_deref()
            .map(|address| {
                address
                    .parse()
                    .map_err(|e| eyre!("Invalid pairing address: {}", e))
            })
            .transpose()
    }

    pub fn to_settings(&self) -> HostSettings {
        let timing = &self.timing;
        HostSettings {
            dongle_vendor_id: self.dongle.vendor_id,
            dongle_product_id: self.dongle.product_id,
            link_timing: LinkTiming {
                init_debounce_cycles: timing.init_debounce_cycles,
                reset_timeout_cycles: timing.reset_timeout_cycles,
            },
            command_spacing: Duration::from_millis(timing.command_spacing_ms),
            wand_keepalive: Duration::from_millis(timing.wand_keepalive_ms),
            profile_enable_delay: Duration::from_millis(timing.profile_enable_delay_ms),
            palette_step: Duration::from_millis(timing.palette_step_ms),
            transfer_timeout: Duration::from_millis(timing.transfer_timeout_ms),
            ..HostSettings::default()
        }
    }

    pub fn to_wired_settings(&self) -> WiredSettings {
        WiredSettings {
            transfer_timeout: Duration::from_millis(self.timing.transfer_timeout_ms),
            wired_keepalive: Duration::from_millis(self.timing.wired_keepalive_ms),
        }
    }
}
