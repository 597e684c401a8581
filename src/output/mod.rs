use anyhow::Result;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::server::TranscriptResponse;

/// Render a fetched transcript in the requested format
pub fn render(result: &TranscriptResponse, format: &OutputFormat) -> Result<String> {
    let content = match format {
        OutputFormat::Text => result.text.clone(),
        OutputFormat::Json => serde_json::to_string_pretty(result)?,
    };
    Ok(content)
}

/// Save transcript to file
pub fn save_to_file(result: &TranscriptResponse, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = render(result, format)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Print transcript to console
pub fn print_to_console(result: &TranscriptResponse, format: &OutputFormat) -> Result<()> {
    println!("{}", render(result, format)?);
    Ok(())
}
