//! One URL through download → transcode.
//!
//! [`JobPipeline::run`] drives a [`Job`] through its states, spawning the
//! downloader and transcoder through a [`Launcher`] and feeding their output
//! to the parsers and the active [`Presenter`]. Per-job failures end up in the
//! returned [`JobReport`]; only a tool that cannot be started is raised.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::batch::BatchContext;
use crate::input::detect_truncation;
use crate::output::{self, TranscriptLog};
use crate::process::{Invocation, Launcher, ProcessExit, ProcessLaunchError, Toolchain};
use crate::progress::{
    parse_download_line, parse_transcode_line, DownloadState, Presenter, ProgressEvent, Stage,
    TranscodeState,
};
use crate::utils::{mp3_file_name, remove_quietly, sanitize_filename};

pub mod commands;
pub mod prompt;

pub use commands::DownloadOptions;
pub use prompt::{ConsolePrompt, OverwritePrompt};

/// Lines of warnings and unrecognized output kept for failure messages
const DIAGNOSTIC_TAIL: usize = 20;

/// Suffixes the downloader uses for unfinished files
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl"];

/// Transcoder parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    /// Stream copy for MP3 sources, otherwise high quality VBR
    #[default]
    #[serde(rename = "fast")]
    Fast,

    /// Constant 128 kbit/s
    #[serde(rename = "128k")]
    Cbr128,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Fast => write!(f, "fast"),
            Quality::Cbr128 => write!(f, "128k"),
        }
    }
}

/// One URL to turn into an MP3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub url: String,

    /// 1-based position in the batch
    pub index: usize,

    pub destination: PathBuf,

    /// Name given with `-o`; the media title is used otherwise
    pub explicit_name: Option<String>,

    pub quality: Quality,
    pub overwrite: bool,

    /// `key=value` arguments that followed the URL on the command line
    pub stray_fragments: Vec<String>,
}

impl Job {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            index: 1,
            destination: destination.into(),
            explicit_name: None,
            quality: Quality::default(),
            overwrite: false,
            stray_fragments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    ResolvingPath,
    Skipped,
    Downloading,
    Transcoding,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    LikelyUnquotedUrl,
    PathResolutionFailed,
    DownloadFailed,
    TranscodeFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::LikelyUnquotedUrl => "likely unquoted URL",
            FailureReason::PathResolutionFailed => "could not determine file name",
            FailureReason::DownloadFailed => "download failed",
            FailureReason::TranscodeFailed => "conversion failed",
        };
        write!(f, "{}", text)
    }
}

/// Terminal result of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done { output: PathBuf },
    /// The operator declined to overwrite an existing file
    Skipped { path: PathBuf },
    Failed { reason: FailureReason, detail: String },
}

/// Result of one subprocess stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub stage: Stage,
    pub success: bool,
    pub exit_code: Option<i32>,

    /// File produced by the stage
    pub artifact: Option<PathBuf>,

    /// Tail of warnings and unrecognized output
    pub diagnostics: String,

    pub elapsed: Duration,
}

impl StageResult {
    /// Short explanation of why the stage failed
    fn failure_detail(&self, fatal: Option<&str>) -> String {
        if let Some(message) = fatal {
            return message.to_string();
        }
        let exit = match self.exit_code {
            Some(code) => ProcessExit::from_code(code),
            None => ProcessExit::without_code(),
        };
        match self.diagnostics.lines().last() {
            Some(last) => format!("{}: {}", exit, last),
            None => exit.to_string(),
        }
    }
}

/// Everything known about one job once it has finished
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job: Job,
    pub output_path: Option<PathBuf>,
    pub download: Option<StageResult>,
    pub transcode: Option<StageResult>,
    pub outcome: JobOutcome,
    trail: Vec<JobState>,
}

impl JobReport {
    /// Final state of the job
    pub fn state(&self) -> JobState {
        match self.outcome {
            JobOutcome::Done { .. } => JobState::Done,
            JobOutcome::Skipped { .. } => JobState::Skipped,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }

    /// Every state the job passed through, in order
    pub fn trail(&self) -> &[JobState] {
        &self.trail
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self.outcome {
            JobOutcome::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.outcome, JobOutcome::Done { .. })
    }
}

#[derive(thiserror::Error, Debug)]
enum JobError {
    #[error(transparent)]
    Launch(#[from] ProcessLaunchError),

    #[error("{reason}: {detail}")]
    Failed {
        reason: FailureReason,
        detail: String,
    },
}

impl JobError {
    fn failed(reason: FailureReason, detail: impl Into<String>) -> Self {
        JobError::Failed {
            reason,
            detail: detail.into(),
        }
    }
}

/// Mutable record of a job while it runs
struct JobRecord {
    index: usize,
    trail: Vec<JobState>,
    output_path: Option<PathBuf>,
    download: Option<StageResult>,
    transcode: Option<StageResult>,
}

impl JobRecord {
    fn new(index: usize) -> Self {
        Self {
            index,
            trail: vec![JobState::Pending],
            output_path: None,
            download: None,
            transcode: None,
        }
    }

    fn enter(&mut self, state: JobState) {
        if let Some(previous) = self.trail.last() {
            tracing::debug!("Job {}: {:?} -> {:?}", self.index, previous, state);
        }
        self.trail.push(state);
    }

    fn finish(mut self, job: &Job, outcome: JobOutcome) -> JobReport {
        let last = match outcome {
            JobOutcome::Done { .. } => JobState::Done,
            JobOutcome::Skipped { .. } => JobState::Skipped,
            JobOutcome::Failed { .. } => JobState::Failed,
        };
        if self.trail.last() != Some(&last) {
            self.enter(last);
        }
        JobReport {
            job: job.clone(),
            output_path: self.output_path,
            download: self.download,
            transcode: self.transcode,
            outcome,
            trail: self.trail,
        }
    }
}

/// Outcome of running one stage's process to completion
struct StageRun {
    result: StageResult,
    fatal: Option<String>,
    destination: Option<PathBuf>,
}

/// Runs jobs one at a time against a launcher, prompt and presenter
pub struct JobPipeline<'a> {
    launcher: &'a dyn Launcher,
    tools: &'a Toolchain,
    options: &'a DownloadOptions,
    prompt: &'a dyn OverwritePrompt,
    presenter: &'a mut dyn Presenter,
    transcript: Option<&'a TranscriptLog>,
}

impl<'a> JobPipeline<'a> {
    pub fn new(
        launcher: &'a dyn Launcher,
        tools: &'a Toolchain,
        options: &'a DownloadOptions,
        prompt: &'a dyn OverwritePrompt,
        presenter: &'a mut dyn Presenter,
    ) -> Self {
        Self {
            launcher,
            tools,
            options,
            prompt,
            presenter,
            transcript: None,
        }
    }

    /// Also append commands and raw tool output to a log file
    pub fn with_transcript(mut self, transcript: Option<&'a TranscriptLog>) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn log(&self, message: &str) {
        if let Some(transcript) = self.transcript {
            transcript.record(message);
        }
    }

    /// Run one job to a terminal state
    pub async fn run(
        &mut self,
        job: &Job,
        batch: &mut BatchContext,
    ) -> Result<JobReport, ProcessLaunchError> {
        tracing::info!("Starting job {}: {}", job.index, job.url);
        let mut record = JobRecord::new(job.index);

        let outcome = match self.drive(job, batch, &mut record).await {
            Ok(outcome) => outcome,
            Err(JobError::Launch(e)) => {
                self.log(&format!("Error: {}", e));
                return Err(e);
            }
            Err(JobError::Failed { reason, detail }) => {
                tracing::warn!("Job {} failed ({}): {}", job.index, reason, detail);
                self.log(&format!("Failed ({}): {} - {}", reason, job.url, detail));
                output::print_job_failed(reason, &detail);
                JobOutcome::Failed { reason, detail }
            }
        };

        Ok(record.finish(job, outcome))
    }

    async fn drive(
        &mut self,
        job: &Job,
        batch: &mut BatchContext,
        record: &mut JobRecord,
    ) -> Result<JobOutcome, JobError> {
        if let Some(hint) = detect_truncation(&job.url, &job.stray_fragments) {
            if !batch.unquoted_hint_shown {
                output::print_unquoted_hint(&hint);
                batch.unquoted_hint_shown = true;
            }
            return Err(JobError::failed(
                FailureReason::LikelyUnquotedUrl,
                hint.to_string(),
            ));
        }

        record.enter(JobState::ResolvingPath);
        let output_path = self.resolve_path(job).await?;
        record.output_path = Some(output_path.clone());

        let mut cleared = job.overwrite;
        if !cleared && output_path.exists() {
            if !self.prompt.confirm_overwrite(&output_path).await {
                return Ok(self.skip(record, output_path));
            }
            cleared = true;
        }

        record.enter(JobState::Downloading);
        let output_name = file_name(&output_path);
        output::print_step(Stage::Download, &output_name);

        let stem = commands::temp_stem();
        let template = commands::temp_template(&job.destination, &stem);
        let invocation = commands::download(self.tools, &job.url, &template, self.options);
        let mut state = DownloadState::new();
        let mut run = self
            .run_stage(Stage::Download, &invocation, &mut state, parse_download_line)
            .await?;

        if !run.result.success {
            let detail = run.result.failure_detail(run.fatal.as_deref());
            record.download = Some(run.result);
            remove_leftovers(&job.destination, &stem);
            return Err(JobError::failed(FailureReason::DownloadFailed, detail));
        }

        let artifact = run
            .destination
            .filter(|path| path.is_file())
            .or_else(|| find_artifact(&job.destination, &stem));
        run.result.artifact = artifact.clone();
        record.download = Some(run.result);

        let Some(artifact) = artifact else {
            remove_leftovers(&job.destination, &stem);
            return Err(JobError::failed(
                FailureReason::DownloadFailed,
                "the downloaded file could not be found",
            ));
        };

        // Something else may have written the file while we were downloading
        if !cleared
            && output_path.exists()
            && !self.prompt.confirm_overwrite(&output_path).await
        {
            remove_leftovers(&job.destination, &stem);
            return Ok(self.skip(record, output_path));
        }

        record.enter(JobState::Transcoding);
        output::print_step(Stage::Transcode, &output_name);

        let invocation = commands::transcode(self.tools, &artifact, &output_path, job.quality);
        let mut state = TranscodeState::new();
        let mut run = self
            .run_stage(Stage::Transcode, &invocation, &mut state, parse_transcode_line)
            .await?;

        remove_quietly(&artifact);
        remove_leftovers(&job.destination, &stem);

        if run.result.success && !output_path.is_file() {
            run.result.success = false;
            run.fatal = Some("the converted file was not created".to_string());
        }

        if !run.result.success {
            let detail = run.result.failure_detail(run.fatal.as_deref());
            record.transcode = Some(run.result);
            remove_quietly(&output_path);
            return Err(JobError::failed(FailureReason::TranscodeFailed, detail));
        }

        run.result.artifact = Some(output_path.clone());
        let download_time = record
            .download
            .as_ref()
            .map(|r| r.elapsed)
            .unwrap_or_default();
        let transcode_time = run.result.elapsed;
        record.transcode = Some(run.result);

        record.enter(JobState::Done);
        tracing::info!("Job {} done: {}", job.index, output_path.display());
        self.log(&format!("Successfully created: {}", output_path.display()));
        output::print_job_done(&output_path, download_time, transcode_time);

        Ok(JobOutcome::Done {
            output: output_path,
        })
    }

    fn skip(&self, record: &mut JobRecord, path: PathBuf) -> JobOutcome {
        record.enter(JobState::Skipped);
        self.log(&format!("Skipping file '{}'", path.display()));
        output::print_skipped(&path);
        JobOutcome::Skipped { path }
    }

    /// Final MP3 path: explicit name or the looked-up title, inside the destination
    async fn resolve_path(&mut self, job: &Job) -> Result<PathBuf, JobError> {
        let name = match &job.explicit_name {
            Some(name) => sanitize_filename(name),
            None => {
                let title = self.lookup_title(&job.url).await?;
                sanitize_filename(&title)
            }
        };

        if name.is_empty() {
            return Err(JobError::failed(
                FailureReason::PathResolutionFailed,
                "the file name is empty",
            ));
        }

        Ok(job.destination.join(mp3_file_name(&name)))
    }

    async fn lookup_title(&mut self, url: &str) -> Result<String, JobError> {
        let invocation = commands::title_lookup(self.tools, url, self.options);
        self.announce(&invocation);

        let mut process = self.launcher.launch(&invocation).await?;
        let mut title = None;
        let mut last_error = None;

        // The title is the last line printed; titles may read like warnings
        while let Some(line) = process.next_line().await {
            self.log(&line);
            self.presenter.raw(&line);
            let text = line.trim();
            if text.starts_with("ERROR:") {
                last_error = Some(text.to_string());
            } else if !text.is_empty() {
                title = Some(text.to_string());
            }
        }

        let exit = process.wait().await.unwrap_or_else(|e| {
            tracing::warn!("Could not collect exit status: {}", e);
            ProcessExit::without_code()
        });

        match title {
            Some(title) if exit.success() => {
                tracing::debug!("Resolved title: {}", title);
                Ok(title)
            }
            _ => {
                let detail = match last_error {
                    Some(error) => format!("{}: {}", exit, error),
                    None => format!("title lookup ended with {}", exit),
                };
                Err(JobError::failed(FailureReason::PathResolutionFailed, detail))
            }
        }
    }

    fn announce(&mut self, invocation: &Invocation) {
        let command_line = invocation.to_string();
        self.presenter.command(&command_line);
        self.log(&format!("Executing command: {}", command_line));
    }

    async fn run_stage<S>(
        &mut self,
        stage: Stage,
        invocation: &Invocation,
        state: &mut S,
        parse: fn(&str, &mut S) -> ProgressEvent,
    ) -> Result<StageRun, ProcessLaunchError> {
        self.announce(invocation);
        let started = Instant::now();
        let mut process = self.launcher.launch(invocation).await?;
        self.presenter.stage_started(stage);

        let mut diagnostics: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL);
        let mut fatal = None;
        let mut destination = None;

        while let Some(line) = process.next_line().await {
            self.log(&line);
            let event = parse(&line, state);

            match &event {
                ProgressEvent::Warning { message, fatal: is_fatal } => {
                    push_diagnostic(&mut diagnostics, message);
                    // The transcoder reports recoverable decode errors; its exit status decides
                    if *is_fatal && stage == Stage::Download && fatal.is_none() {
                        fatal = Some(message.clone());
                    }
                }
                ProgressEvent::Unrecognized(raw) => push_diagnostic(&mut diagnostics, raw),
                ProgressEvent::Destination(path) => destination = Some(path.clone()),
                _ => {}
            }

            self.presenter.line(stage, &line, &event);
        }

        let exit = process.wait().await.unwrap_or_else(|e| {
            tracing::warn!("Could not collect exit status: {}", e);
            ProcessExit::without_code()
        });
        let success = exit.success() && fatal.is_none();
        self.presenter.stage_finished(stage, success);
        tracing::debug!("{} stage ended with {}", stage, exit);

        Ok(StageRun {
            result: StageResult {
                stage,
                success,
                exit_code: exit.code(),
                artifact: None,
                diagnostics: Vec::from(diagnostics).join("\n"),
                elapsed: started.elapsed(),
            },
            fatal,
            destination,
        })
    }
}

fn push_diagnostic(diagnostics: &mut VecDeque<String>, line: &str) {
    if diagnostics.len() == DIAGNOSTIC_TAIL {
        diagnostics.pop_front();
    }
    diagnostics.push_back(line.to_string());
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Files in `dir` whose name starts with the temporary stem
fn temp_files(dir: &Path, stem: &str) -> Vec<PathBuf> {
    let entries = match fs_err::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("{}", e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().starts_with(stem))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// The finished download for `stem`, ignoring partial files
fn find_artifact(dir: &Path, stem: &str) -> Option<PathBuf> {
    let prefix = format!("{}.", stem);
    temp_files(dir, stem).into_iter().find(|path| {
        let name = file_name(path);
        name.starts_with(&prefix)
            && path.is_file()
            && !PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
    })
}

fn remove_leftovers(dir: &Path, stem: &str) {
    for path in temp_files(dir, stem) {
        remove_quietly(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::prompt::MockOverwritePrompt;
    use super::*;
    use crate::process::MockLauncher;
    use crate::progress::StructuredPresenter;

    fn tools() -> Toolchain {
        Toolchain::new("yt-dlp", "ffmpeg")
    }

    #[tokio::test]
    async fn test_unquoted_url_spawns_nothing() {
        let mut launcher = MockLauncher::new();
        launcher.expect_launch().times(0);
        let mut prompt = MockOverwritePrompt::new();
        prompt.expect_confirm_overwrite().times(0);
        let mut presenter = StructuredPresenter::hidden(false);
        let tools = tools();
        let options = DownloadOptions::default();

        let mut pipeline = JobPipeline::new(&launcher, &tools, &options, &prompt, &mut presenter);
        let mut batch = BatchContext::default();

        let mut job = Job::new("https://x.test/watch?v=abc", "/tmp");
        job.stray_fragments = vec!["list=123".to_string()];

        let report = pipeline.run(&job, &mut batch).await.expect("no launch error");
        assert_eq!(report.failure_reason(), Some(FailureReason::LikelyUnquotedUrl));
        assert_eq!(report.trail(), &[JobState::Pending, JobState::Failed]);
        assert!(report.download.is_none());
        assert!(batch.unquoted_hint_shown);
    }

    #[tokio::test]
    async fn test_declined_overwrite_is_a_skip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let existing = dir.path().join("song.mp3");
        fs_err::write(&existing, b"old").expect("seed");

        let mut launcher = MockLauncher::new();
        launcher.expect_launch().times(0);
        let mut prompt = MockOverwritePrompt::new();
        prompt
            .expect_confirm_overwrite()
            .times(1)
            .returning(|_| false);
        let mut presenter = StructuredPresenter::hidden(false);
        let tools = tools();
        let options = DownloadOptions::default();

        let mut pipeline = JobPipeline::new(&launcher, &tools, &options, &prompt, &mut presenter);
        let mut batch = BatchContext::default();

        let mut job = Job::new("https://youtu.be/abc", dir.path());
        job.explicit_name = Some("song".to_string());

        let report = pipeline.run(&job, &mut batch).await.expect("no launch error");
        assert_eq!(report.state(), JobState::Skipped);
        assert_eq!(
            report.trail(),
            &[JobState::Pending, JobState::ResolvingPath, JobState::Skipped]
        );
        assert_eq!(report.outcome, JobOutcome::Skipped { path: existing.clone() });
        assert_eq!(fs_err::read(&existing).expect("read"), b"old");
    }

    #[tokio::test]
    async fn test_empty_explicit_name_fails_resolution() {
        let mut launcher = MockLauncher::new();
        launcher.expect_launch().times(0);
        let prompt = MockOverwritePrompt::new();
        let mut presenter = StructuredPresenter::hidden(false);
        let tools = tools();
        let options = DownloadOptions::default();

        let mut pipeline = JobPipeline::new(&launcher, &tools, &options, &prompt, &mut presenter);
        let mut job = Job::new("https://youtu.be/abc", "/tmp");
        job.explicit_name = Some("  ...  ".to_string());

        let report = pipeline
            .run(&job, &mut BatchContext::default())
            .await
            .expect("no launch error");
        assert_eq!(report.failure_reason(), Some(FailureReason::PathResolutionFailed));
    }

    #[tokio::test]
    async fn test_launch_error_propagates() {
        let mut launcher = MockLauncher::new();
        launcher
            .expect_launch()
            .times(1)
            .returning(|inv| Err(ProcessLaunchError::not_found(inv.program.clone(), "missing")));
        let prompt = MockOverwritePrompt::new();
        let mut presenter = StructuredPresenter::hidden(false);
        let tools = tools();
        let options = DownloadOptions::default();

        let mut pipeline = JobPipeline::new(&launcher, &tools, &options, &prompt, &mut presenter);
        let job = Job::new("https://youtu.be/abc", "/tmp");

        let err = pipeline
            .run(&job, &mut BatchContext::default())
            .await
            .expect_err("launch error must propagate");
        assert_eq!(err.program, "yt-dlp");
    }

    #[test]
    fn test_find_artifact_ignores_partial_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs_err::write(dir.path().join("ytmp3_ab12cd34.webm.part"), b"x").expect("write");
        fs_err::write(dir.path().join("other.webm"), b"x").expect("write");
        assert_eq!(find_artifact(dir.path(), "ytmp3_ab12cd34"), None);

        fs_err::write(dir.path().join("ytmp3_ab12cd34.webm"), b"x").expect("write");
        assert_eq!(
            find_artifact(dir.path(), "ytmp3_ab12cd34"),
            Some(dir.path().join("ytmp3_ab12cd34.webm"))
        );

        remove_leftovers(dir.path(), "ytmp3_ab12cd34");
        assert!(temp_files(dir.path(), "ytmp3_ab12cd34").is_empty());
        assert!(dir.path().join("other.webm").exists());
    }

    #[test]
    fn test_failure_detail_prefers_fatal_warning() {
        let result = StageResult {
            stage: Stage::Download,
            success: false,
            exit_code: Some(1),
            artifact: None,
            diagnostics: "noise\nERROR: Video unavailable".to_string(),
            elapsed: Duration::ZERO,
        };
        assert_eq!(result.failure_detail(Some("unable to download")), "unable to download");
        assert_eq!(result.failure_detail(None), "exit code 1: ERROR: Video unavailable");
    }
}
