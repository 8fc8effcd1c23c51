use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::api::ProcessingResult;
use crate::cli::OutputFormat;
use crate::utils::output_stem;

pub mod formatters;

pub use formatters::*;

pub fn render(result: &ProcessingResult, format: &OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => format_as_text(result),
        OutputFormat::Json => format_as_json(result)?,
        OutputFormat::Markdown => format_as_markdown(result),
    })
}

/// Save processing result to file
pub async fn save_to_file(result: &ProcessingResult, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = render(result, format)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs_err::create_dir_all(parent)?;
        }
    }

    fs_err::write(path, content)?;
    Ok(())
}

/// Print processing result to console
pub fn print_to_console(result: &ProcessingResult, format: &OutputFormat) -> Result<()> {
    let content = render(result, format)?;
    println!("{}", content);
    Ok(())
}

/// Write each section to `<stem>_<section>.txt` in `dir`, skipping empty ones
pub fn save_sections(result: &ProcessingResult, dir: &Path) -> Result<Vec<PathBuf>> {
    fs_err::create_dir_all(dir).context("Failed to create output directory")?;

    let stem = output_stem(result.display_name());
    let mut written = Vec::new();

    for (title, body) in sections(result) {
        if body.trim().is_empty() {
            continue;
        }

        let suffix = title.to_lowercase().replace(' ', "_");
        let path = dir.join(format!("{stem}_{suffix}.txt"));
        fs_err::write(&path, body.trim())?;
        tracing::debug!("Wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}
