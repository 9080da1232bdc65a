use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Serializes `value` as JSON to `output`, or stdout when no path is given.
pub fn write_json<T: Serialize>(value: &T, pretty: bool, output: Option<&Path>) -> Result<()> {
    let json = to_json(value, pretty)?;
    write_text(&json, output)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

/// Writes rendered output to a file, or stdout when no path is given.
pub fn write_text(text: &str, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, format!("{text}\n"))
            .with_context(|| format!("Failed to write output file: {}", path.display()))?;
        info!("Output written to: {}", path.display());
    } else {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{text}")?;
    }
    Ok(())
}
