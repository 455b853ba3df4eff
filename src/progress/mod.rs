use std::fmt;
use std::path::PathBuf;

pub mod parser;
pub mod presenter;

pub use parser::{parse_download_line, parse_transcode_line, DownloadState, TranscodeState};
pub use presenter::{Indicator, Presenter, RawSink, StructuredPresenter};

/// One of the two subprocess phases of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Download,
    Transcode,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Download => "Downloading",
            Stage::Transcode => "Converting",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Download => write!(f, "download"),
            Stage::Transcode => write!(f, "transcode"),
        }
    }
}

/// Downloader progress snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    /// Percent complete, 0 to 100
    pub percent: f64,

    /// Transfer rate in bytes per second
    pub speed: Option<f64>,

    /// Remaining time in seconds
    pub eta: Option<u64>,

    /// Expected size of the download in bytes
    pub total_bytes: Option<u64>,
}

/// Transcoder progress snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeProgress {
    /// Percent of the input duration encoded, when the duration is known
    pub percent: Option<f64>,

    /// Encoded position in seconds
    pub position: f64,
}

/// A normalized unit of status derived from one raw output line
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Download(DownloadProgress),
    Transcode(TranscodeProgress),
    Warning { message: String, fatal: bool },
    Info(String),
    Destination(PathBuf),
    Unrecognized(String),
}

impl ProgressEvent {
    /// Stage whose indicator this event drives
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ProgressEvent::Download(_) => Some(Stage::Download),
            ProgressEvent::Transcode(_) => Some(Stage::Transcode),
            _ => None,
        }
    }

    pub fn percent(&self) -> Option<f64> {
        match self {
            ProgressEvent::Download(progress) => Some(progress.percent),
            ProgressEvent::Transcode(progress) => progress.percent,
            _ => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ProgressEvent::Warning { fatal: true, .. })
    }
}
