//! Turning command-line arguments and list files into URL arguments.

use anyhow::{Context, Result};
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use url::Url;

use crate::ExtractorError;

/// Marker for comment lines in list files
const COMMENT_MARKER: char = '#';

/// One URL as received, plus any pieces that look split off from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlArgument {
    pub url: String,
    pub stray_fragments: Vec<String>,
}

impl UrlArgument {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stray_fragments: Vec::new(),
        }
    }
}

/// Read a list file: one URL per line, blanks and `#` comments skipped
pub fn read_list_file(path: &Path) -> Result<Vec<UrlArgument>> {
    if !path.exists() {
        return Err(ExtractorError::ListFileNotFound(path.to_path_buf()).into());
    }
    let content = fs_err::read_to_string(path).context("Failed to read list file")?;
    Ok(parse_list(&content).into_iter().map(UrlArgument::new).collect())
}

/// URL arguments for a run: the list file when one is given, the
/// command-line URLs otherwise
pub fn collect_arguments(urls: &[String], list: Option<&Path>) -> Result<Vec<UrlArgument>> {
    let Some(list) = list else {
        return Ok(group_arguments(urls));
    };
    if !urls.is_empty() {
        tracing::warn!(
            "Ignoring {} command-line argument(s) because --list was given",
            urls.len()
        );
    }
    read_list_file(list)
}

pub fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .map(str::to_string)
        .collect()
}

fn query_fragment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*=").expect("valid query fragment regex")
    })
}

/// Whether an argument looks like a `key=value` piece cut off a URL by the shell
pub fn looks_like_query_fragment(arg: &str) -> bool {
    let arg = arg.trim();
    if arg.contains("://") || Url::parse(arg).is_ok() {
        return false;
    }
    query_fragment_re().is_match(arg)
}

/// Group positional arguments, attaching stray `key=value` pieces to the URL before them
pub fn group_arguments(args: &[String]) -> Vec<UrlArgument> {
    let mut grouped: Vec<UrlArgument> = Vec::new();

    for arg in args {
        match grouped.last_mut() {
            Some(previous) if looks_like_query_fragment(arg) => {
                previous.stray_fragments.push(arg.clone());
            }
            _ => grouped.push(UrlArgument::new(arg.clone())),
        }
    }

    grouped
}

/// Evidence that a URL was cut short by an unquoted `&`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncationHint {
    pub received: String,
    pub reconstructed: String,
}

impl fmt::Display for TruncationHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' looks like part of a URL; the full URL was probably \"{}\"",
            self.received, self.reconstructed
        )
    }
}

/// Best-effort detection of a URL split by the shell at an unquoted `&`.
///
/// This is a heuristic only; the URL is never rewritten.
pub fn detect_truncation(url: &str, stray_fragments: &[String]) -> Option<TruncationHint> {
    let trimmed = url.trim();

    if !stray_fragments.is_empty() {
        let mut reconstructed = trimmed.to_string();
        for fragment in stray_fragments {
            reconstructed.push('&');
            reconstructed.push_str(fragment);
        }
        return Some(TruncationHint {
            received: stray_fragments.join(" "),
            reconstructed,
        });
    }

    if looks_like_query_fragment(trimmed) {
        return Some(TruncationHint {
            received: trimmed.to_string(),
            reconstructed: format!("<URL>&{}", trimmed),
        });
    }

    let dangling = trimmed.ends_with('&')
        || trimmed.contains(" &")
        || trimmed.contains("& ");
    if dangling {
        return Some(TruncationHint {
            received: trimmed.to_string(),
            reconstructed: trimmed
                .split_whitespace()
                .collect::<String>()
                .trim_end_matches('&')
                .to_string(),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_list_skips_blanks_and_comments() {
        let content = "https://youtu.be/a\n\n   \n# comment\n  https://youtu.be/b  \n#https://youtu.be/c\n";
        assert_eq!(parse_list(content), vec!["https://youtu.be/a", "https://youtu.be/b"]);
    }

    #[test]
    fn test_read_list_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("list.txt");
        fs_err::write(&path, "https://youtu.be/a\nhttps://www.youtube.com/watch?v=b&list=c\n")
            .expect("write");

        let urls = read_list_file(&path).expect("read");
        assert_eq!(urls.len(), 2);
        assert!(urls.iter().all(|u| u.stray_fragments.is_empty()));
        assert_eq!(urls[1].url, "https://www.youtube.com/watch?v=b&list=c");
    }

    #[test]
    fn test_read_missing_list_file() {
        let err = read_list_file(Path::new("/definitely/not/here.txt")).expect_err("missing");
        assert!(err.to_string().contains("was not found"));
    }

    #[test]
    fn test_list_file_replaces_command_line_urls() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("list.txt");
        fs_err::write(&path, "https://youtu.be/from-list\n").expect("write");
        let urls = args(&["https://youtu.be/ignored", "list=123"]);

        let from_list = collect_arguments(&urls, Some(path.as_path())).expect("read");
        assert_eq!(from_list, vec![UrlArgument::new("https://youtu.be/from-list")]);

        let from_args = collect_arguments(&urls, None).expect("group");
        assert_eq!(from_args.len(), 1);
        assert_eq!(from_args[0].url, "https://youtu.be/ignored");
        assert_eq!(from_args[0].stray_fragments, vec!["list=123"]);

        assert!(collect_arguments(&urls, Some(dir.path().join("missing.txt").as_path())).is_err());
    }

    #[test]
    fn test_looks_like_query_fragment() {
        assert!(looks_like_query_fragment("list=PL123"));
        assert!(looks_like_query_fragment("t=42s"));
        assert!(looks_like_query_fragment("si=abc-def"));
        assert!(looks_like_query_fragment("pp=ygU"));
        assert!(!looks_like_query_fragment("https://youtu.be/abc?t=42"));
        assert!(!looks_like_query_fragment("dQw4w9WgXcQ"));
        assert!(!looks_like_query_fragment("=broken"));
    }

    #[test]
    fn test_group_arguments_attaches_fragments() {
        let grouped = group_arguments(&args(&[
            "https://x.test/watch?v=abc",
            "list=123",
            "https://youtu.be/other",
        ]));
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].stray_fragments, vec!["list=123"]);
        assert!(grouped[1].stray_fragments.is_empty());
    }

    #[test]
    fn test_group_arguments_leading_fragment_is_its_own_entry() {
        let grouped = group_arguments(&args(&["list=123"]));
        assert_eq!(grouped, vec![UrlArgument::new("list=123")]);
    }

    #[test]
    fn test_detect_truncation_from_split_arguments() {
        let hint = detect_truncation("https://x.test/watch?v=abc", &args(&["list=123"]))
            .expect("should be flagged");
        assert_eq!(hint.received, "list=123");
        assert_eq!(hint.reconstructed, "https://x.test/watch?v=abc&list=123");
    }

    #[test]
    fn test_detect_truncation_dangling_ampersand() {
        assert!(detect_truncation("https://x.test/watch?v=abc&", &[]).is_some());
        assert!(detect_truncation("list=123", &[]).is_some());
    }

    #[test]
    fn test_quoted_urls_are_not_flagged() {
        assert!(detect_truncation("https://x.test/watch?v=abc&list=123", &[]).is_none());
        assert!(detect_truncation("https://x.test/watch?v=abc%26list%3D1", &[]).is_none());
        assert!(detect_truncation("https://youtu.be/abc", &[]).is_none());
    }
}
