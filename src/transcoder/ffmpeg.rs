use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::{EngineError, FractionFn, TranscodeEngine};
use crate::config::TranscoderConfig;
use crate::utils::check_command_available;

/// Lines of ffmpeg stderr kept in error messages
const STDERR_TAIL_LINES: usize = 6;

/// Engine backed by the system `ffmpeg`/`ffprobe` binaries.
///
/// Scratch files live in a private temporary directory created on `load` and
/// removed when the engine is dropped.
pub struct FfmpegEngine {
    enabled: bool,
    ffmpeg: String,
    ffprobe: String,
    required_encoder: String,
    workdir: OnceLock<TempDir>,
}

impl FfmpegEngine {
    pub fn from_config(config: &TranscoderConfig) -> Self {
        Self {
            enabled: config.enabled,
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            required_encoder: config.output_format.fallback_encoder().to_string(),
            workdir: OnceLock::new(),
        }
    }

    fn workdir(&self) -> Result<&Path, EngineError> {
        self.workdir
            .get()
            .map(|dir| dir.path())
            .ok_or(EngineError::NotLoaded)
    }

    fn scratch_path(&self, name: &str) -> Result<PathBuf, EngineError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(EngineError::InvalidFileName(name.to_string()));
        }
        Ok(self.workdir()?.join(name))
    }

    /// Duration of a media file in seconds, if ffprobe can tell
    async fn probe_duration(&self, path: &Path) -> Option<f64> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
        info["format"]["duration"]
            .as_str()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| *d > 0.0)
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    async fn is_supported(&self) -> bool {
        if !self.enabled {
            tracing::debug!("Local transcoding disabled in configuration");
            return false;
        }

        check_command_available(&self.ffmpeg, "-version").await
            && check_command_available(&self.ffprobe, "-version").await
    }

    async fn load(&self) -> Result<(), EngineError> {
        if self.workdir.get().is_some() {
            return Ok(());
        }

        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-encoders"])
            .output()
            .await
            .map_err(|e| EngineError::Load(format!("cannot run {}: {}", self.ffmpeg, e)))?;

        if !output.status.success() {
            return Err(EngineError::Load(format!(
                "{} -encoders exited with {}",
                self.ffmpeg, output.status
            )));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        if !lists_encoder(&listing, &self.required_encoder) {
            return Err(EngineError::Load(format!(
                "ffmpeg build lacks the {} encoder",
                self.required_encoder
            )));
        }

        let dir = tempfile::Builder::new()
            .prefix("verbatim-transcode-")
            .tempdir()
            .map_err(|e| EngineError::Load(format!("cannot create scratch directory: {e}")))?;
        tracing::debug!("Transcoder scratch directory: {}", dir.path().display());

        // A concurrent load may have won; its directory is as good as ours
        let _ = self.workdir.set(dir);
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        let path = self.scratch_path(name)?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn exec(&self, args: &[String], on_progress: FractionFn) -> Result<(), EngineError> {
        let dir = self.workdir()?;

        let duration = match input_argument(args) {
            Some(input) => self.probe_duration(&dir.join(input)).await,
            None => None,
        };

        tracing::debug!("Running {} {}", self.ffmpeg, args.join(" "));

        let mut child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-nostdin", "-y", "-progress", "pipe:1", "-nostats"])
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf).await;
            }
            buf
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(fraction) = parse_progress_line(&line, duration) {
                    on_progress(fraction);
                }
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(EngineError::Exec {
                code: status.code(),
                message: stderr_tail(&stderr),
            });
        }

        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.scratch_path(name)?;
        Ok(tokio::fs::read(&path).await?)
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        let path = self.scratch_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The value following `-i`
fn input_argument(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|a| a == "-i")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

/// Interpret one `key=value` line of `-progress` output.
///
/// `out_time_us` and `out_time_ms` both carry microseconds.
pub fn parse_progress_line(line: &str, duration_secs: Option<f64>) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "progress" if value == "end" => Some(1.0),
        "out_time_us" | "out_time_ms" => {
            let duration = duration_secs.filter(|d| *d > 0.0)?;
            let micros = value.parse::<f64>().ok()?;
            Some((micros / 1_000_000.0 / duration).clamp(0.0, 1.0))
        }
        _ => None,
    }
}

fn lists_encoder(listing: &str, encoder: &str) -> bool {
    // Rows look like " A..... aac                  AAC (Advanced Audio Coding)"
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|name| name == encoder)
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join("\n");
    if tail.is_empty() {
        "no diagnostic output".to_string()
    } else {
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(parse_progress_line("out_time_us=5000000", Some(10.0)), Some(0.5));
        assert_eq!(parse_progress_line("out_time_ms=20000000", Some(10.0)), Some(1.0));
        assert_eq!(parse_progress_line("out_time_us=N/A", Some(10.0)), None);
        assert_eq!(parse_progress_line("out_time_us=5000000", None), None);
        assert_eq!(parse_progress_line("progress=continue", Some(10.0)), None);
        assert_eq!(parse_progress_line("progress=end", None), Some(1.0));
        assert_eq!(parse_progress_line("bitrate=64.0kbits/s", Some(10.0)), None);
    }

    #[test]
    fn test_lists_encoder() {
        let listing = "Encoders:\n ------\n A....D aac                  AAC (Advanced Audio Coding)\n A....D libmp3lame           libmp3lame MP3\n";
        assert!(lists_encoder(listing, "aac"));
        assert!(lists_encoder(listing, "libmp3lame"));
        assert!(!lists_encoder(listing, "libopus"));
    }

    #[test]
    fn test_input_argument() {
        let args: Vec<String> = ["-i", "input.mp4", "-vn", "out.m4a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(input_argument(&args), Some("input.mp4"));
        assert_eq!(input_argument(&args[2..]), None);
    }

    #[test]
    fn test_stderr_tail() {
        let stderr = (1..=10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 5"));
        assert!(tail.ends_with("line 10"));
        assert_eq!(stderr_tail("\n\n"), "no diagnostic output");
    }

    #[tokio::test]
    async fn test_scratch_files_require_load() {
        let engine = FfmpegEngine::from_config(&TranscoderConfig::default());
        assert!(matches!(
            engine.write_file("input.mp4", b"x").await,
            Err(EngineError::NotLoaded)
        ));
    }

    #[tokio::test]
    async fn test_disabled_engine_is_unsupported() {
        let config = TranscoderConfig {
            enabled: false,
            ..TranscoderConfig::default()
        };
        assert!(!FfmpegEngine::from_config(&config).is_supported().await);
    }

    #[test]
    fn test_scratch_names_cannot_escape() {
        let engine = FfmpegEngine::from_config(&TranscoderConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let _ = engine.workdir.set(dir);
        assert!(engine.scratch_path("../etc/passwd").is_err());
        assert!(engine.scratch_path("..").is_err());
        assert!(engine.scratch_path("output.m4a").is_ok());
    }
}
