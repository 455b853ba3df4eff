//! Line parsers for the downloader (`yt-dlp`) and transcoder (`ffmpeg`) output.
//!
//! Each parser maps exactly one raw line to a [`ProgressEvent`]. The only state
//! carried between lines lives in a per-stage accumulator owned by the caller:
//! the last known speed/ETA for downloads, the learned duration and furthest
//! position for transcodes. Parsing never fails; anything not understood comes
//! back as [`ProgressEvent::Unrecognized`].

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

use super::{DownloadProgress, ProgressEvent, TranscodeProgress};

/// Carried-forward values for one download stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadState {
    last_speed: Option<f64>,
    last_eta: Option<u64>,
}

impl DownloadState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Learned duration and furthest position for one transcode stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscodeState {
    duration: Option<f64>,
    position: f64,
}

impl TranscodeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a duration known ahead of time
    pub fn with_duration(duration: f64) -> Self {
        Self {
            duration: (duration > 0.0).then_some(duration),
            position: 0.0,
        }
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn report(&self) -> ProgressEvent {
        ProgressEvent::Transcode(TranscodeProgress {
            percent: self
                .duration
                .map(|total| (self.position / total * 100.0).clamp(0.0, 100.0)),
            position: self.position,
        })
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid progress regex"))
}

fn download_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"^\[download\]\s+(?P<percent>\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*(?P<size>\d+(?:\.\d+)?\s*[kKMGT]?i?B|Unknown(?:\s+size)?))?(?:\s+in\s+(?P<elapsed>[\d:.]+))?(?:\s+at\s+(?P<speed>\d+(?:\.\d+)?\s*[kKMGT]?i?B/s|Unknown(?:\s+B/s|\s+speed)?|N/A))?(?:\s+ETA\s+(?P<eta>[\d:]+|Unknown|--:--|NA|N/A))?",
    )
}

fn byte_size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^(?P<value>\d+(?:\.\d+)?)\s*(?P<unit>[kKMGT]?i?B)$")
}

fn warning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)^(?:error|warning)\b|\b(?:error|warning):|unable to|conversion failed|invalid data found|no such file or directory|permission denied",
    )
}

fn fatal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^ERROR:|(?i:unable to download)")
}

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"Duration:\s*(?P<clock>\d+:\d{2}:\d{2}(?:\.\d+)?)")
}

fn out_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^out_time_us=(?P<micros>-?\d+)$")
}

fn stats_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?:^|\s)time=\s*(?P<clock>-?\d+:\d{2}:\d{2}(?:\.\d+)?)")
}

/// Classify a line as a warning if it matches the error/warning heuristic
pub fn classify_warning(line: &str) -> Option<ProgressEvent> {
    let text = line.trim();
    if !warning_re().is_match(text) {
        return None;
    }
    Some(ProgressEvent::Warning {
        message: text.to_string(),
        fatal: fatal_re().is_match(text),
    })
}

/// Parse one line of downloader output
pub fn parse_download_line(line: &str, state: &mut DownloadState) -> ProgressEvent {
    let clean = console::strip_ansi_codes(line);
    let text = clean.trim();

    if let Some(warning) = classify_warning(text) {
        return warning;
    }
    if let Some(progress) = download_progress(text, state) {
        return ProgressEvent::Download(progress);
    }
    if let Some(path) = download_destination(text) {
        return ProgressEvent::Destination(path);
    }
    if text.starts_with("[youtube") || text.starts_with("[info]") {
        return ProgressEvent::Info(text.to_string());
    }

    ProgressEvent::Unrecognized(line.to_string())
}

fn download_progress(text: &str, state: &mut DownloadState) -> Option<DownloadProgress> {
    let caps = download_line_re().captures(text)?;
    let percent = caps["percent"].parse::<f64>().ok()?.clamp(0.0, 100.0);

    if let Some(speed) = caps.name("speed").and_then(|m| parse_rate(m.as_str())) {
        state.last_speed = Some(speed);
    }
    if let Some(eta) = caps.name("eta").and_then(|m| parse_clock(m.as_str())) {
        state.last_eta = Some(eta.max(0.0).round() as u64);
    }

    let total_bytes = caps
        .name("size")
        .and_then(|m| parse_byte_size(m.as_str()))
        .map(|bytes| bytes.round() as u64);

    Some(DownloadProgress {
        percent,
        speed: state.last_speed,
        eta: if percent >= 100.0 { Some(0) } else { state.last_eta },
        total_bytes,
    })
}

fn download_destination(text: &str) -> Option<PathBuf> {
    let path = if let Some(rest) = text.strip_prefix("[download] Destination:") {
        rest.trim()
    } else {
        text.strip_prefix("[download] ")?
            .strip_suffix(" has already been downloaded")?
            .trim()
    };

    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// Parse one line of transcoder output
pub fn parse_transcode_line(line: &str, state: &mut TranscodeState) -> ProgressEvent {
    let text = line.trim();

    if let Some(warning) = classify_warning(text) {
        return warning;
    }

    if let Some(caps) = duration_re().captures(text) {
        if let Some(duration) = parse_clock(&caps["clock"]).filter(|d| *d > 0.0) {
            state.duration = Some(duration);
            return state.report();
        }
    }

    let position = if let Some(caps) = out_time_re().captures(text) {
        caps["micros"].parse::<i64>().ok().map(|us| us as f64 / 1_000_000.0)
    } else if let Some(caps) = stats_time_re().captures(text) {
        parse_clock(&caps["clock"])
    } else {
        None
    };

    match position {
        Some(position) => {
            state.position = state.position.max(position);
            state.report()
        }
        None => ProgressEvent::Unrecognized(line.to_string()),
    }
}

/// Parse `MM:SS`, `HH:MM:SS` or `HH:MM:SS.ff` into seconds
pub fn parse_clock(text: &str) -> Option<f64> {
    let (negative, body) = match text.trim().strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.trim()),
    };

    let parts: Vec<&str> = body.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }

    let mut seconds = 0.0;
    for (idx, part) in parts.iter().enumerate() {
        let is_last = idx + 1 == parts.len();
        let numeric = !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_digit() || (is_last && c == '.'));
        if !numeric {
            return None;
        }
        let value: f64 = part.parse().ok()?;
        seconds = seconds * 60.0 + value;
    }

    Some(if negative { -seconds } else { seconds })
}

/// Parse a size such as `3.50MiB` into bytes
pub fn parse_byte_size(text: &str) -> Option<f64> {
    let caps = byte_size_re().captures(text.trim())?;
    let value: f64 = caps["value"].parse().ok()?;
    Some(value * unit_multiplier(&caps["unit"])?)
}

/// Parse a rate such as `512.00KiB/s` into bytes per second
pub fn parse_rate(text: &str) -> Option<f64> {
    parse_byte_size(text.trim().strip_suffix("/s")?)
}

fn unit_multiplier(unit: &str) -> Option<f64> {
    const KIB: f64 = 1024.0;
    let multiplier = match unit {
        "B" => 1.0,
        "KiB" => KIB,
        "MiB" => KIB * KIB,
        "GiB" => KIB * KIB * KIB,
        "TiB" => KIB * KIB * KIB * KIB,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some(multiplier)
}
