use anyhow::Result;

use crate::api::{HistoryEntry, ProcessingResult};

/// Plain text with a header per section
pub fn format_as_text(result: &ProcessingResult) -> String {
    let mut output = String::new();

    output.push_str(&format!("Source: {}\n", result.display_name()));
    if let Some(message) = &result.message {
        output.push_str(&format!("Status: {}\n", message));
    }

    for (title, body) in sections(result) {
        output.push_str(&format!("\n=== {} ===\n{}\n", title, body.trim()));
    }

    output
}

pub fn format_as_json(result: &ProcessingResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

pub fn format_as_markdown(result: &ProcessingResult) -> String {
    let mut output = format!("# {}\n", result.display_name());

    for (title, body) in sections(result) {
        output.push_str(&format!("\n## {}\n\n{}\n", title, body.trim()));
    }

    output
}

/// One line per history item: id, name, upload time
pub fn format_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No history yet.\n".to_string();
    }

    let mut output = String::new();
    for entry in entries {
        output.push_str(&format!(
            "{}  {}  {}\n",
            entry.id,
            entry.filename.as_deref().unwrap_or("untitled"),
            entry.upload_time_label().unwrap_or_else(|| "-".to_string())
        ));
    }
    output
}

/// Section title and body, in display order
pub fn sections(result: &ProcessingResult) -> [(&'static str, &str); 3] {
    [
        ("Transcript", result.transcript.as_str()),
        ("Summary", result.summary.as_str()),
        ("Blog Post", result.blog_post.as_str()),
    ]
}
