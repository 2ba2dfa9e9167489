//! Command implementations.

mod config;
mod scan;
mod schedules;
mod send;

use std::sync::Arc;

use bellcast_core::{BellController, ConnectionConfig};

use crate::config::{Config, ConfigDeviceHint};

pub use config::cmd_config;
pub use scan::cmd_scan;
pub use schedules::cmd_schedules;
pub use send::cmd_send;

/// Controller over the host radios, recording connections in the config file.
fn platform_controller(config: &Config, scan_timeout: Option<u64>) -> BellController {
    BellController::with_platform_transports(
        Arc::new(ConfigDeviceHint::new(Config::path())),
        config.controller_config(scan_timeout),
        ConnectionConfig::default(),
        config.serial_config(),
    )
}
