use anyhow::Result;
use std::path::{Path, PathBuf};
use url::Url;

/// Validate a base URL and return normalized version (always ending in `/`)
pub fn validate_and_normalize_url(url: &str) -> Result<Url> {
    let mut parsed = Url::parse(url)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }

    Ok(parsed)
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            match c {
                // Keep alphanumeric characters, spaces, hyphens, underscores, and dots
                c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
                // Replace everything else with underscore
                _ => '_',
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Basename without its last extension, sanitized for use in output file names
pub fn output_stem(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let stem = sanitize_filename(stem);
    if stem.is_empty() {
        format!("verbatim_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S"))
    } else {
        stem
    }
}

/// Where `extract` writes audio named `filename` for `input` when no output is given.
///
/// The file lands next to the input. If that would be the input itself, `.audio`
/// goes before the extension.
pub fn extracted_audio_path(input: &Path, filename: &str) -> PathBuf {
    let sibling = |name: &str| {
        input
            .parent()
            .map(|dir| dir.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    };

    let candidate = sibling(filename);
    if !same_path(&candidate, input) {
        return candidate;
    }

    let name = Path::new(filename);
    let stem = name.file_stem().and_then(|s| s.to_str()).unwrap_or(filename);
    match name.extension().and_then(|e| e.to_str()) {
        Some(ext) => sibling(&format!("{stem}.audio.{ext}")),
        None => sibling(&format!("{stem}.audio")),
    }
}

/// Whether two paths name the same file, resolving them when they exist
pub fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs_err::canonicalize(a), fs_err::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Check the external tools used for local audio extraction
pub async fn check_dependencies(ffmpeg: &str, ffprobe: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(ffmpeg, "-version").await {
        missing.push(format!("{ffmpeg} - required for local audio extraction"));
    }

    if !check_command_available(ffprobe, "-version").await {
        missing.push(format!("{ffprobe} - required for extraction progress"));
    }

    missing
}

/// Check if a command is available in PATH
pub async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World!"), "Hello World_");
        assert_eq!(sanitize_filename("test/file?name"), "test_file_name");
        assert_eq!(sanitize_filename("  spaced  "), "spaced");
    }

    #[test]
    fn test_output_stem() {
        assert_eq!(output_stem("Team sync.final.mp4"), "Team sync.final");
        assert_eq!(output_stem("a?b.mov"), "a_b");
        assert!(output_stem("").starts_with("verbatim_"));
    }

    #[test]
    fn test_extracted_audio_path_never_targets_the_input() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        let audio = dir.path().join("memo.m4a");
        fs_err::write(&video, b"v").unwrap();
        fs_err::write(&audio, b"a").unwrap();

        assert_eq!(extracted_audio_path(&video, "clip.m4a"), dir.path().join("clip.m4a"));
        assert_eq!(extracted_audio_path(&audio, "memo.m4a"), dir.path().join("memo.audio.m4a"));
        assert_eq!(
            extracted_audio_path(Path::new("memo.m4a"), "memo.m4a"),
            PathBuf::from("memo.audio.m4a")
        );
    }

    #[test]
    fn test_same_path_resolves_relative_components() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.m4a");
        fs_err::write(&file, b"a").unwrap();
        let detour = dir.path().join(".").join("a.m4a");

        assert!(same_path(&file, &detour));
        assert!(!same_path(&file, &dir.path().join("b.m4a")));
    }

    #[test]
    fn test_validate_and_normalize_url() {
        assert_eq!(
            validate_and_normalize_url("https://example.com").unwrap().as_str(),
            "https://example.com/"
        );
        assert_eq!(
            validate_and_normalize_url("http://localhost:8000/v1").unwrap().as_str(),
            "http://localhost:8000/v1/"
        );
        assert!(validate_and_normalize_url("ftp://example.com").is_err());
        assert!(validate_and_normalize_url("not-a-url").is_err());
    }

    #[tokio::test]
    async fn test_missing_command_is_reported() {
        assert!(!check_command_available("verbatim-no-such-binary", "-version").await);
        let missing = check_dependencies("verbatim-no-such-binary", "verbatim-no-such-probe").await;
        assert_eq!(missing.len(), 2);
    }
}
