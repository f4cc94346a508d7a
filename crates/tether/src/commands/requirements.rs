//! `tether requirements` - inspect a build's firmware metadata

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use std::path::Path;
use tether_core::flash::FirmwareRequirements;
use tracing::debug;

pub fn run(file: &Path, output: OutputFormat) -> Result<()> {
    debug!("parsing firmware metadata from {}", file.display());
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let requirements = FirmwareRequirements::parse(&text)
        .with_context(|| format!("failed to parse {}", file.display()))?;

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&requirements)?);
        }
        OutputFormat::Text => {
            print_text(&requirements);
        }
    }
    Ok(())
}

fn print_text(requirements: &FirmwareRequirements) {
    if requirements.boards.is_empty() {
        println!("boards: (none declared)");
    } else {
        println!("boards: {}", requirements.boards_for_display());
    }
    println!(
        "bootloader version: {}",
        requirements
            .bootloader_version
            .as_deref()
            .unwrap_or("(not required)")
    );
    println!(
        "baseband version: {}",
        requirements
            .baseband_version
            .as_deref()
            .unwrap_or("(not required)")
    );
}
