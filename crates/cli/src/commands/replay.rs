//! `tracefold replay`: print the view model of a saved log.

use std::path::Path;
use tracefold_agent::Surface;
use tracefold_core::StreamStatus;

pub fn run(
    file: &Path,
    surface: Surface,
    status: Option<StreamStatus>,
) -> Result<(), Box<dyn std::error::Error>> {
    let input = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let view = tracefold::replay::replay(&input, surface, status)?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
