use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use anyhow::{bail, Context, Result};
use shared::protocol::{ANNOUNCE_PAYLOAD, DEFAULT_GROUP, DEFAULT_PORT};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Multicast group the beacons are exchanged on
    #[serde(default = "default_group")]
    pub group: Ipv4Addr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_sending_period")]
    pub sending_period_ms: u64,
    /// Payload the announcer sends every period
    #[serde(default = "default_beacon")]
    pub beacon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Delay between two interface enumeration passes
    #[serde(default = "default_delayed_check")]
    pub delayed_check_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_group() -> Ipv4Addr {
    DEFAULT_GROUP
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_sending_period() -> u64 {
    2000
}

fn default_beacon() -> String {
    ANNOUNCE_PAYLOAD.to_string()
}

fn default_delayed_check() -> u64 {
    5000
}

fn default_sweep_interval() -> u64 {
    1000
}

fn default_listen() -> String {
    "127.0.0.1:8054".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            group: default_group(),
            port: default_port(),
            sending_period_ms: default_sending_period(),
            beacon: default_beacon(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            delayed_check_ms: default_delayed_check(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl DiscoveryConfig {
    pub fn group_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group, self.port)
    }

    pub fn sending_period(&self) -> Duration {
        Duration::from_millis(self.sending_period_ms)
    }
}

impl ScannerConfig {
    pub fn delayed_check(&self) -> Duration {
        Duration::from_millis(self.delayed_check_ms)
    }
}

impl LivenessConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.discovery.group.is_multicast() {
            bail!("discovery.group {} is not a multicast address", self.discovery.group);
        }
        if self.discovery.port == 0 {
            bail!("discovery.port must be non-zero");
        }
        if self.discovery.sending_period_ms == 0 {
            bail!("discovery.sending_period_ms must be non-zero");
        }
        if self.scanner.delayed_check_ms == 0 {
            bail!("scanner.delayed_check_ms must be non-zero");
        }
        if self.liveness.sweep_interval_ms == 0 {
            bail!("liveness.sweep_interval_ms must be non-zero");
        }
        Ok(())
    }
}
