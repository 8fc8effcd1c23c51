use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::media::AudioFormat;
use crate::pipeline::DubSource;

#[derive(Parser)]
#[command(
    name = "verbatim",
    about = "Verbatim - Transcribe, summarize and dub audio and video files",
    version,
    long_about = "Command line client for the Verbatim backend. Video files have their audio track extracted locally with ffmpeg before upload when possible; the backend returns a transcript, a summary and a blog post, and can dub them into other languages."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to ./config.yaml or the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// User id to act as (overrides the configured identity)
    #[arg(long, global = true, env = "VERBATIM_USER_ID", value_name = "ID")]
    pub user_id: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload an audio or video file and get its transcript, summary and blog post
    Process {
        /// Local audio or video file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Also write each section to its own text file in this directory
        #[arg(long, value_name = "DIR")]
        sections: Option<PathBuf>,

        /// Upload the file as-is, without local audio extraction
        #[arg(long)]
        no_extract: bool,
    },

    /// Extract the audio track of a video locally, without uploading
    Extract {
        /// Local video file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Where to write the audio (defaults to <name>.<format> next to the input)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Audio container (overrides the configured output format)
        #[arg(short, long)]
        format: Option<AudioFormat>,
    },

    /// Generate a dubbed voice track for a processed item from your history
    Dub {
        /// History item id
        #[arg(value_name = "ITEM_ID")]
        item: String,

        /// Target language (as listed by `verbatim languages`)
        #[arg(short, long)]
        language: Option<String>,

        /// Voice id or name (defaults to the first voice of the language)
        #[arg(long)]
        voice: Option<String>,

        /// Emotion label
        #[arg(short, long)]
        emotion: Option<String>,

        /// Text to dub
        #[arg(short, long)]
        source: Option<DubSource>,
    },

    /// List dubbing languages
    Languages,

    /// List voices available for a language
    Voices {
        #[arg(value_name = "LANGUAGE")]
        language: String,
    },

    /// Browse or delete previously processed items
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Check local audio extraction support and backend settings
    Check,

    /// Show or initialize configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List processed items
    List,

    /// Show one processed item
    Show {
        #[arg(value_name = "ITEM_ID")]
        item: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a processed item
    Delete {
        #[arg(value_name = "ITEM_ID")]
        item: String,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON
    Json,
    /// Markdown document
    Markdown,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_arguments() {
        let cli = Cli::parse_from([
            "verbatim", "process", "talk.mp4", "-f", "markdown", "--no-extract", "--user-id", "u1",
        ]);
        assert_eq!(cli.user_id.as_deref(), Some("u1"));
        match cli.command {
            Commands::Process { file, format, no_extract, .. } => {
                assert_eq!(file, PathBuf::from("talk.mp4"));
                assert_eq!(format.to_string(), "markdown");
                assert!(no_extract);
            }
            _ => panic!("expected process"),
        }
    }

    #[test]
    fn test_dub_and_extract_parse_domain_values() {
        let cli = Cli::parse_from(["verbatim", "dub", "doc-1", "--source", "transcript", "-e", "Happy"]);
        match cli.command {
            Commands::Dub { item, source, emotion, .. } => {
                assert_eq!(item, "doc-1");
                assert_eq!(source, Some(DubSource::Transcript));
                assert_eq!(emotion.as_deref(), Some("Happy"));
            }
            _ => panic!("expected dub"),
        }

        let cli = Cli::parse_from(["verbatim", "extract", "clip.mov", "-f", "mp3"]);
        match cli.command {
            Commands::Extract { format, .. } => assert_eq!(format, Some(AudioFormat::Mp3)),
            _ => panic!("expected extract"),
        }
    }
}
