//! Shared helpers for commands.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Write `content` to `output`, or to stdout when no file is given.
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}
