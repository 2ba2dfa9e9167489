//! Configuration file management.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use bellcast_core::{
    ControllerConfig, DeviceDescriptor, FallbackPolicy, PersistedDeviceHint, ScanOptions,
    SerialConfig, TransportKind,
};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default device identifier (BLE address, CoreBluetooth UUID or serial port)
    #[serde(default)]
    pub device: Option<String>,

    /// Scan session length in seconds
    #[serde(default)]
    pub scan_timeout: Option<u64>,

    /// Baud rate for classic serial controllers
    #[serde(default)]
    pub baud_rate: Option<u32>,

    /// When a failed connect tries the other transport
    #[serde(default)]
    pub fallback_policy: FallbackPolicy,

    /// Schedule file to send
    #[serde(default)]
    pub schedules: Option<PathBuf>,

    /// Name fragments that mark a bell controller (empty = built-in list)
    #[serde(default)]
    pub controller_hints: Vec<String>,

    /// School name shown in headers
    #[serde(default)]
    pub school_name: Option<String>,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,

    /// Last successfully connected device (auto-updated)
    #[serde(default)]
    pub last_device: Option<String>,

    /// Name of the last connected device (for display)
    #[serde(default)]
    pub last_device_name: Option<String>,

    /// Transport the last connection succeeded over
    #[serde(default)]
    pub last_transport: Option<TransportKind>,
}

impl Config {
    /// Default config file location.
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bellcast")
            .join("config.toml")
    }

    /// Load config from the default location, or return default if not found.
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`. Unreadable or malformed files yield the default.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => warn!("Failed to parse config {}: {}", path.display(), e),
                },
                Err(e) => warn!("Failed to read config {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Scan length: explicit argument, then config, then the core default.
    pub fn scan_options(&self, timeout: Option<u64>) -> ScanOptions {
        let mut options = ScanOptions::new();
        if let Some(secs) = timeout.or(self.scan_timeout) {
            options = options.duration(Duration::from_secs(secs.max(1)));
        }
        if !self.controller_hints.is_empty() {
            options = options.controller_hints(self.controller_hints.iter().cloned());
        }
        options
    }

    /// Facade configuration derived from this file.
    pub fn controller_config(&self, timeout: Option<u64>) -> ControllerConfig {
        ControllerConfig {
            scan: self.scan_options(timeout),
            fallback_policy: self.fallback_policy,
            ..ControllerConfig::default()
        }
    }

    /// Classic serial settings derived from this file.
    pub fn serial_config(&self) -> SerialConfig {
        match self.baud_rate {
            Some(baud) => SerialConfig::default().baud_rate(baud),
            None => SerialConfig::default(),
        }
    }
}

/// Where a resolved device identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSource {
    Argument,
    Default,
    Last,
}

/// Resolve the target device: argument, then configured default, then the
/// last connected device.
///
/// The stored transport is only offered for the last device, where it is
/// known to have worked.
pub fn resolve_device(
    device: Option<String>,
    transport: Option<TransportKind>,
    config: &Config,
) -> Option<(String, Option<TransportKind>, DeviceSource)> {
    if let Some(d) = device {
        return Some((d, transport, DeviceSource::Argument));
    }
    if let Some(d) = &config.device {
        return Some((d.clone(), transport, DeviceSource::Default));
    }
    config.last_device.as_ref().map(|d| {
        (
            d.clone(),
            transport.or(config.last_transport),
            DeviceSource::Last,
        )
    })
}

/// Config file backed [`PersistedDeviceHint`].
///
/// Every write re-reads the file so settings edited while a command runs are
/// kept.
#[derive(Debug)]
pub struct ConfigDeviceHint {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConfigDeviceHint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut Config)) -> bellcast_core::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut config = Config::load_from(&self.path);
        apply(&mut config);
        config
            .save_to(&self.path)
            .map_err(|e| bellcast_core::Error::Io(io::Error::other(format!("{e:#}"))))
    }
}

impl PersistedDeviceHint for ConfigDeviceHint {
    fn get_last_connected(&self) -> Option<String> {
        Config::load_from(&self.path).last_device
    }

    fn set_last_connected(&self, id: &str) -> bellcast_core::Result<()> {
        self.update(|config| {
            if config.last_device.as_deref() != Some(id) {
                config.last_device_name = None;
                config.last_transport = None;
            }
            config.last_device = Some(id.to_string());
        })
    }

    fn remember(
        &self,
        device: &DeviceDescriptor,
        transport: TransportKind,
    ) -> bellcast_core::Result<()> {
        self.update(|config| {
            config.last_device = Some(device.id.clone());
            config.last_device_name = Some(device.display_name.clone());
            config.last_transport = Some(transport);
        })
    }
}
