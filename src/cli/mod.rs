use clap::Parser;
use std::path::PathBuf;

use crate::pipeline::Quality;

/// Default transcript file for a bare `--log`
pub const DEFAULT_LOG_FILE: &str = "yt-dlp.log";

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "ytmp3",
    about = "Download audio from video URLs and convert it to MP3 using yt-dlp and ffmpeg",
    version,
    long_about = "Turns one or many video URLs into MP3 files. yt-dlp fetches the best audio stream, \
ffmpeg converts it, and both tools' progress is shown as one unified display. \
Wrap every URL in double quotes so the shell does not split it at '&'."
)]
pub struct Cli {
    /// Video URLs to process (quote each one); ignored when --list is given
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Output file name, `.mp3` added if missing (single URL only)
    #[arg(short, long, value_name = "FILENAME")]
    pub output: Option<String>,

    /// Read URLs from a text file, one per line
    #[arg(long, value_name = "FILE")]
    pub list: Option<PathBuf>,

    /// Directory for the MP3 files (created if missing)
    #[arg(short = 'd', long = "dst", value_name = "DIRECTORY")]
    pub dst: Option<PathBuf>,

    /// Replace existing files without asking
    #[arg(long)]
    pub overwrite: bool,

    /// Fast conversion: stream copy for MP3 sources, otherwise VBR (default)
    #[arg(long, conflicts_with = "mp3128")]
    pub mp3fast: bool,

    /// Constant 128 kbit/s conversion
    #[arg(long)]
    pub mp3128: bool,

    /// Use cookies from a browser, e.g. `firefox` or `chrome:Profile 1`
    #[arg(long, value_name = "BROWSER[:PROFILE]")]
    pub cookies: Option<String>,

    /// Maximum download rate, e.g. `500K` or `2M`
    #[arg(short = 'r', long, value_name = "RATE")]
    pub limit_rate: Option<String>,

    /// Colorful status messages
    #[arg(long)]
    pub color: bool,

    /// Detailed progress bar with size, speed and ETA
    #[arg(long)]
    pub pb: bool,

    /// Append all tool output to a log file
    #[arg(
        long,
        value_name = "FILE",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = DEFAULT_LOG_FILE
    )]
    pub log: Option<PathBuf>,

    /// Show the raw output of the external tools and debug logging
    #[arg(long)]
    pub debug: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub show_config: bool,

    /// Path or name of the yt-dlp executable
    #[arg(long = "yt-dlp", env = "YTMP3_YT_DLP", value_name = "PATH")]
    pub yt_dlp: Option<String>,

    /// Path or name of the ffmpeg executable
    #[arg(long, env = "YTMP3_FFMPEG", value_name = "PATH")]
    pub ffmpeg: Option<String>,

    /// Configuration file to use instead of the default location
    #[arg(long, env = "YTMP3_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Quality chosen on the command line, if any
    pub fn quality(&self) -> Option<Quality> {
        if self.mp3128 {
            Some(Quality::Cbr128)
        } else if self.mp3fast {
            Some(Quality::Fast)
        } else {
            None
        }
    }
}
