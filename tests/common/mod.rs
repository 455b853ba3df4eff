#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use yt_audio_extractor::pipeline::{DownloadOptions, OverwritePrompt};
use yt_audio_extractor::process::{ProcessExit, ProcessHandle};
use yt_audio_extractor::progress::Presenter;
use yt_audio_extractor::{
    Invocation, Job, Launcher, ProcessLaunchError, ProgressEvent, Stage, Toolchain,
};

pub const DOWNLOADER: &str = "yt-dlp";
pub const TRANSCODER: &str = "ffmpeg";

pub fn toolchain() -> Toolchain {
    Toolchain::new(DOWNLOADER, TRANSCODER)
}

pub fn options() -> DownloadOptions {
    DownloadOptions::default()
}

pub fn job(url: &str, destination: &Path) -> Job {
    Job::new(url, destination)
}

/// Title the fake downloader reports: the last path segment of the URL
pub fn title_for(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// Process that replays prepared output lines and exits with a fixed code
pub struct ScriptedProcess {
    lines: VecDeque<String>,
    code: i32,
}

#[async_trait]
impl ProcessHandle for ScriptedProcess {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        Ok(ProcessExit::from_code(self.code))
    }
}

/// Stand-in for yt-dlp and ffmpeg that records every invocation and
/// creates the files the real tools would
#[derive(Default)]
pub struct FakeTools {
    failing_downloads: HashSet<String>,
    fatal_warning_downloads: HashSet<String>,
    failing_lookups: HashSet<String>,
    failing_transcode: bool,
    noisy_downloads: HashSet<String>,
    noisy_transcode: bool,
    titles: HashMap<String, String>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_download(mut self, url: &str) -> Self {
        self.failing_downloads.insert(url.to_string());
        self
    }

    /// Download prints a fatal warning but still exits 0
    pub fn warn_download(mut self, url: &str) -> Self {
        self.fatal_warning_downloads.insert(url.to_string());
        self
    }

    pub fn fail_lookup(mut self, url: &str) -> Self {
        self.failing_lookups.insert(url.to_string());
        self
    }

    pub fn fail_transcode(mut self) -> Self {
        self.failing_transcode = true;
        self
    }

    /// Download retries a fragment and warns along the way, then succeeds
    pub fn noisy_download(mut self, url: &str) -> Self {
        self.noisy_downloads.insert(url.to_string());
        self
    }

    /// Transcode reports a recoverable decode error, then succeeds
    pub fn noisy_transcode(mut self) -> Self {
        self.noisy_transcode = true;
        self
    }

    /// Title reported for `url` instead of its last path segment
    pub fn with_title(mut self, url: &str, title: &str) -> Self {
        self.titles.insert(url.to_string(), title.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, program: &str) -> usize {
        self.calls().iter().filter(|c| c.program == program).count()
    }

    pub fn lookups(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.has_arg("--get-filename"))
            .count()
    }

    pub fn downloads(&self) -> usize {
        self.count(DOWNLOADER) - self.lookups()
    }

    fn script(&self, invocation: &Invocation) -> (Vec<String>, i32) {
        let url = invocation.args.last().cloned().unwrap_or_default();

        if invocation.program == DOWNLOADER && invocation.has_arg("--get-filename") {
            if self.failing_lookups.contains(&url) {
                return (vec!["ERROR: Unsupported URL: ".to_string() + &url], 1);
            }
            let title = self
                .titles
                .get(&url)
                .cloned()
                .unwrap_or_else(|| title_for(&url));
            return (vec![title], 0);
        }

        if invocation.program == DOWNLOADER {
            if self.failing_downloads.contains(&url) {
                return (
                    vec![
                        "[youtube] abc: Downloading webpage".to_string(),
                        "ERROR: [youtube] abc: Video unavailable".to_string(),
                    ],
                    1,
                );
            }

            let template = invocation.flag_value("-o").unwrap_or_default();
            let file = template.replace("%(ext)s", "webm");
            let _ = std::fs::write(&file, b"audio");

            if self.fatal_warning_downloads.contains(&url) {
                return (
                    vec!["WARNING: unable to download video data: HTTP Error 403".to_string()],
                    0,
                );
            }

            if self.noisy_downloads.contains(&url) {
                return (
                    vec![
                        "WARNING: [youtube] abc: unable to extract uploader id".to_string(),
                        format!("[download] Destination: {}", file),
                        "[download]  40.0% of 3.50MiB at 1.00MiB/s ETA 00:02".to_string(),
                        "[download] Got error: HTTP Error 503: Service Unavailable. Retrying fragment 3 (1/10)...".to_string(),
                        "[download] 100% of 3.50MiB in 00:00:04 at 900.00KiB/s".to_string(),
                    ],
                    0,
                );
            }

            return (
                vec![
                    "[youtube] abc: Downloading webpage".to_string(),
                    format!("[download] Destination: {}", file),
                    "[download]   0.0% of 3.50MiB at Unknown B/s ETA Unknown".to_string(),
                    "[download]  45.2% of 3.50MiB at 512.00KiB/s ETA 00:05".to_string(),
                    "[download]  80.0% of 3.50MiB at Unknown B/s ETA Unknown".to_string(),
                    "[download] 100% of 3.50MiB in 00:00:07 at 512.00KiB/s".to_string(),
                ],
                0,
            );
        }

        let output = invocation.args.last().cloned().unwrap_or_default();
        if self.failing_transcode {
            let _ = std::fs::write(&output, b"partial");
            return (
                vec![
                    "  Duration: 00:00:10.00, start: 0.000000, bitrate: 128 kb/s".to_string(),
                    "out_time_us=2000000".to_string(),
                    "Conversion failed!".to_string(),
                ],
                1,
            );
        }

        let _ = std::fs::write(&output, b"mp3");
        if self.noisy_transcode {
            return (
                vec![
                    "  Duration: 00:00:10.00, start: 0.000000, bitrate: 128 kb/s".to_string(),
                    "out_time_us=3000000".to_string(),
                    "[opus @ 0x55d0c0] Error while decoding stream #0:0: Invalid data found when processing input".to_string(),
                    "out_time_us=10000000".to_string(),
                    "progress=end".to_string(),
                ],
                0,
            );
        }
        (
            vec![
                "  Duration: 00:00:10.00, start: 0.000000, bitrate: 128 kb/s".to_string(),
                "out_time_us=2500000".to_string(),
                "out_time_us=5000000".to_string(),
                "out_time_us=4000000".to_string(),
                "out_time_us=10000000".to_string(),
                "progress=end".to_string(),
            ],
            0,
        )
    }
}

#[async_trait]
impl Launcher for FakeTools {
    async fn launch(
        &self,
        invocation: &Invocation,
    ) -> Result<Box<dyn ProcessHandle>, ProcessLaunchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        let (lines, code) = self.script(invocation);
        Ok(Box::new(ScriptedProcess {
            lines: lines.into(),
            code,
        }))
    }
}

/// Launcher for which no tool can be started
pub struct MissingTools;

#[async_trait]
impl Launcher for MissingTools {
    async fn launch(
        &self,
        invocation: &Invocation,
    ) -> Result<Box<dyn ProcessHandle>, ProcessLaunchError> {
        Err(ProcessLaunchError::not_found(
            invocation.program.clone(),
            "not installed",
        ))
    }
}

/// Presenter that keeps everything it is shown
#[derive(Default)]
pub struct RecordingPresenter {
    pub commands: Vec<String>,
    pub started: Vec<Stage>,
    pub events: Vec<(Stage, ProgressEvent)>,
    pub finished: Vec<(Stage, bool)>,
}

impl RecordingPresenter {
    /// Percentages reported for one stage, in order
    pub fn percents(&self, stage: Stage) -> Vec<f64> {
        self.events
            .iter()
            .filter(|(s, _)| *s == stage)
            .filter_map(|(_, event)| match event {
                ProgressEvent::Download(p) if stage == Stage::Download => Some(p.percent),
                ProgressEvent::Transcode(p) if stage == Stage::Transcode => p.percent,
                _ => None,
            })
            .collect()
    }
}

impl Presenter for RecordingPresenter {
    fn command(&mut self, command_line: &str) {
        self.commands.push(command_line.to_string());
    }

    fn stage_started(&mut self, stage: Stage) {
        self.started.push(stage);
    }

    fn line(&mut self, stage: Stage, _raw: &str, event: &ProgressEvent) {
        self.events.push((stage, event.clone()));
    }

    fn stage_finished(&mut self, stage: Stage, success: bool) {
        self.finished.push((stage, success));
    }
}

/// Overwrite prompt with a fixed answer that counts how often it was asked
pub struct CountingPrompt {
    answer: bool,
    asked: AtomicUsize,
}

impl CountingPrompt {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OverwritePrompt for CountingPrompt {
    async fn confirm_overwrite(&self, _path: &Path) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// Overwrite prompt that is never answered
pub struct SilentPrompt;

#[async_trait]
impl OverwritePrompt for SilentPrompt {
    async fn confirm_overwrite(&self, _path: &Path) -> bool {
        std::future::pending().await
    }
}

/// Regular files directly inside `dir`, sorted by name
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}
