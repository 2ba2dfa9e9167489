//! Config command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::util::write_output;

pub fn cmd_config(path_only: bool, output: Option<&PathBuf>, config: &Config) -> Result<()> {
    let path = Config::path();
    if path_only {
        return write_output(output, &format!("{}\n", path.display()));
    }

    let mut content = format!("# {}\n", path.display());
    if let Some(device) = &config.last_device {
        let name = config.last_device_name.as_deref().unwrap_or(device);
        match config.last_transport {
            Some(transport) => {
                content.push_str(&format!("# Last connected: {} over {}\n", name, transport))
            }
            None => content.push_str(&format!("# Last connected: {}\n", name)),
        }
    }
    content.push('\n');
    content.push_str(&toml::to_string_pretty(config).context("Failed to serialize config")?);
    write_output(output, &content)
}
