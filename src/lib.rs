//! YouTube Audio Extractor - A Rust CLI tool for turning video URLs into MP3 files
//!
//! This library drives two external tools, `yt-dlp` for downloading and `ffmpeg` for
//! transcoding, parses their textual progress output into a common model and runs
//! any number of URLs through a download → transcode pipeline with a unified
//! progress display.

pub mod batch;
pub mod cli;
pub mod config;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod utils;

pub use batch::{BatchContext, BatchOrchestrator, BatchReport};
pub use cli::Cli;
pub use config::{Config, Settings};
pub use pipeline::{FailureReason, Job, JobOutcome, JobPipeline, JobReport, JobState, Quality, StageResult};
pub use process::{Invocation, Launcher, ProcessLaunchError, ProcessRunner, Toolchain};
pub use progress::{ProgressEvent, Stage};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the extractor
#[derive(thiserror::Error, Debug)]
pub enum ExtractorError {
    #[error("No URLs provided. Use arguments or --list option.")]
    NoUrls,

    #[error("The -o/--output option can only be used when processing a single URL.")]
    OutputWithMultipleUrls,

    #[error("The list file '{0}' was not found.")]
    ListFileNotFound(std::path::PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Launch(#[from] ProcessLaunchError),
}
