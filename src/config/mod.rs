use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::batch::JobDefaults;
use crate::cli::Cli;
use crate::pipeline::{DownloadOptions, Quality};
use crate::ExtractorError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External tool locations
    pub tools: ToolsConfig,

    /// Application defaults
    pub app: AppConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Downloader executable name or path
    pub yt_dlp: String,

    /// Transcoder executable name or path
    pub ffmpeg: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for finished MP3 files (current directory if unset)
    pub destination: Option<PathBuf>,

    pub quality: Quality,

    /// Browser to borrow cookies from
    pub cookies: Option<String>,

    /// Download rate limit
    pub limit_rate: Option<String>,

    pub color: bool,
    pub progress_bar: bool,

    /// Transcript log written on every run
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load the configuration from `explicit`, or from the default location if present
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Get configuration file path
    pub fn config_path() -> Option<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::config_dir().map(|dir| dir.join("yt-audio-extractor").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tools.yt_dlp.trim().is_empty() || self.tools.ffmpeg.trim().is_empty() {
            return Err(ExtractorError::InvalidConfig("tool paths must not be empty".into()).into());
        }

        if let Some(rate) = &self.app.limit_rate {
            if !is_valid_rate(rate) {
                return Err(ExtractorError::InvalidConfig(format!(
                    "'{}' is not a valid rate limit (expected e.g. 500K or 2M)",
                    rate
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Apply command-line overrides, giving the settings for this run
    pub fn merge(&self, cli: &Cli) -> Result<Settings> {
        let mut effective = self.clone();

        if let Some(yt_dlp) = &cli.yt_dlp {
            effective.tools.yt_dlp = yt_dlp.clone();
        }
        if let Some(ffmpeg) = &cli.ffmpeg {
            effective.tools.ffmpeg = ffmpeg.clone();
        }
        if cli.dst.is_some() {
            effective.app.destination = cli.dst.clone();
        }
        if let Some(quality) = cli.quality() {
            effective.app.quality = quality;
        }
        if cli.cookies.is_some() {
            effective.app.cookies = cli.cookies.clone();
        }
        if cli.limit_rate.is_some() {
            effective.app.limit_rate = cli.limit_rate.clone();
        }
        if cli.log.is_some() {
            effective.app.log_file = cli.log.clone();
        }
        effective.app.color |= cli.color;
        effective.app.progress_bar |= cli.pb;

        effective.validate()?;

        Ok(Settings {
            destination: effective
                .app
                .destination
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            explicit_name: cli.output.clone(),
            overwrite: cli.overwrite,
            debug: cli.debug,
            config: effective,
        })
    }
}

fn rate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+)?[KMGTkmgt]?$").expect("valid rate regex"))
}

/// Rate in the downloader's notation: a number with an optional K/M/G/T suffix
pub fn is_valid_rate(rate: &str) -> bool {
    rate_re().is_match(rate.trim())
}

/// Effective settings for one run: the config file with command-line overrides
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config: Config,
    pub destination: PathBuf,
    pub explicit_name: Option<String>,
    pub overwrite: bool,
    pub debug: bool,
}

impl Settings {
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            cookies: self.config.app.cookies.clone(),
            limit_rate: self.config.app.limit_rate.clone(),
            verbose: self.debug,
            color: self.config.app.color,
        }
    }

    pub fn job_defaults(&self) -> JobDefaults {
        JobDefaults {
            destination: self.destination.clone(),
            explicit_name: self.explicit_name.clone(),
            quality: self.config.app.quality,
            overwrite: self.overwrite,
        }
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.config.app.log_file.as_deref()
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        if let Some(path) = Config::config_path() {
            let state = if path.exists() { "" } else { " (not present)" };
            println!("  Config File: {}{}", path.display(), state);
        }
        println!("  yt-dlp: {}", self.config.tools.yt_dlp);
        println!("  ffmpeg: {}", self.config.tools.ffmpeg);
        println!("  Destination: {}", self.destination.display());
        println!("  Quality: {}", self.config.app.quality);
        if let Some(cookies) = &self.config.app.cookies {
            println!("  Cookies: {}", cookies);
        }
        if let Some(rate) = &self.config.app.limit_rate {
            println!("  Rate Limit: {}", rate);
        }
        println!("  Color: {}", self.config.app.color);
        println!("  Progress Bar: {}", self.config.app.progress_bar);
        if let Some(log) = self.log_file() {
            println!("  Log File: {}", log.display());
        }
    }
}
