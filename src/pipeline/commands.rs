//! Command lines for the downloader and transcoder.

use std::path::{Path, PathBuf};

use super::Quality;
use crate::process::{Invocation, Toolchain};

/// Placeholder the downloader replaces with the real extension
pub const EXTENSION_PLACEHOLDER: &str = "%(ext)s";

/// Options passed through to every downloader call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Browser (and optional profile) to borrow cookies from
    pub cookies: Option<String>,

    /// Rate limit such as `500K` or `2M`
    pub limit_rate: Option<String>,

    /// Ask the downloader for verbose output
    pub verbose: bool,

    /// Let the downloader colorize its own output
    pub color: bool,
}

/// Downloader call that prints only the media title
pub fn title_lookup(tools: &Toolchain, url: &str, options: &DownloadOptions) -> Invocation {
    let mut invocation = Invocation::new(&tools.downloader)
        .args(["--encoding", "utf-8", "--get-filename", "-o", "%(title)s"])
        .args(["--no-playlist", "--no-warnings"])
        .env("PYTHONIOENCODING", "utf-8");

    if let Some(cookies) = &options.cookies {
        invocation = invocation.args(["--cookies-from-browser", cookies.as_str()]);
    }

    invocation.arg(url)
}

/// Downloader call fetching the best audio stream into `template`
pub fn download(
    tools: &Toolchain,
    url: &str,
    template: &Path,
    options: &DownloadOptions,
) -> Invocation {
    let color = if options.verbose && options.color {
        "always"
    } else {
        "never"
    };

    let mut invocation = Invocation::new(&tools.downloader)
        .args(["-f", "bestaudio", "--no-mtime", "--newline", "--no-playlist"])
        .args(["--color", color])
        .env("PYTHONIOENCODING", "utf-8");

    if options.verbose {
        invocation = invocation.arg("--verbose");
    }
    if let Some(cookies) = &options.cookies {
        invocation = invocation.args(["--cookies-from-browser", cookies.as_str()]);
    }
    if let Some(rate) = &options.limit_rate {
        invocation = invocation.args(["--limit-rate", rate.as_str()]);
    }

    invocation
        .arg("-o")
        .arg(template.to_string_lossy())
        .arg(url)
}

/// Transcoder call converting `input` into the MP3 at `output`
pub fn transcode(tools: &Toolchain, input: &Path, output: &Path, quality: Quality) -> Invocation {
    Invocation::new(&tools.transcoder)
        .args(["-hide_banner", "-nostdin", "-i"])
        .arg(input.to_string_lossy())
        .arg("-vn")
        .args(quality_args(quality, input))
        .args(["-progress", "pipe:1", "-nostats", "-y"])
        .arg(output.to_string_lossy())
}

fn quality_args(quality: Quality, input: &Path) -> Vec<&'static str> {
    let already_mp3 = input
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false);

    match quality {
        Quality::Fast if already_mp3 => vec!["-c:a", "copy"],
        Quality::Fast => vec!["-c:a", "libmp3lame", "-q:a", "2"],
        Quality::Cbr128 => vec!["-c:a", "libmp3lame", "-b:a", "128k"],
    }
}

/// Output template for the temporary download, e.g. `dir/ytmp3_1a2b3c4d.%(ext)s`
pub fn temp_template(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}.{}", stem, EXTENSION_PLACEHOLDER))
}

/// Unique stem for one job's temporary download
pub fn temp_stem() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("ytmp3_{}", &id[..8])
}
