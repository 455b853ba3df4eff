//! Progress presentation strategies.
//!
//! A run uses exactly one [`Presenter`]: the [`StructuredPresenter`] renders
//! indicatif bars from parsed events, the [`RawSink`] passes every raw line
//! through untouched for debugging.

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::Write;

use super::{ProgressEvent, Stage};
use crate::utils::{format_duration, format_file_size};

/// Bar length; positions are tenths of a percent
const BAR_SCALE: u64 = 1000;

/// Receives the output of each stage as it happens
pub trait Presenter: Send {
    /// The exact command line about to be executed
    fn command(&mut self, _command_line: &str) {}

    /// A raw line that is not part of a progress stage (e.g. a title lookup)
    fn raw(&mut self, _line: &str) {}

    fn stage_started(&mut self, stage: Stage);

    /// One line of stage output together with its parsed meaning
    fn line(&mut self, stage: Stage, raw: &str, event: &ProgressEvent);

    fn stage_finished(&mut self, stage: Stage, success: bool);
}

/// Display model of one stage indicator
#[derive(Debug, Clone, PartialEq)]
pub struct Indicator {
    stage: Stage,
    percent: f64,
    last: Option<ProgressEvent>,
    finalized: bool,
}

impl Indicator {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            percent: 0.0,
            last: None,
            finalized: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Displayed percentage; never moves backwards
    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn last_event(&self) -> Option<&ProgressEvent> {
        self.last.as_ref()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Take in an event, returning whether the display must be redrawn.
    ///
    /// Only progress events of this indicator's own stage count.
    pub fn apply(&mut self, event: &ProgressEvent) -> bool {
        if self.finalized || event.stage() != Some(self.stage) {
            return false;
        }
        if let Some(percent) = event.percent() {
            self.percent = self.percent.max(percent.clamp(0.0, 100.0));
        }
        self.last = Some(event.clone());
        true
    }

    /// Mark the stage as complete; returns `false` if already finalized
    pub fn finalize(&mut self, success: bool) -> bool {
        if self.finalized {
            return false;
        }
        self.finalized = true;
        if success {
            self.percent = 100.0;
        }
        true
    }

    /// Status text shown next to the bar
    pub fn message(&self, detailed: bool) -> String {
        match &self.last {
            Some(ProgressEvent::Download(progress)) => {
                let mut text = format!("{:5.1}%", self.percent);
                if detailed {
                    if let Some(total) = progress.total_bytes {
                        text.push_str(&format!(" of {}", format_file_size(total)));
                    }
                    if let Some(speed) = progress.speed {
                        text.push_str(&format!(" at {}/s", format_file_size(speed as u64)));
                    }
                    if let Some(eta) = progress.eta {
                        text.push_str(&format!(" ETA {}", format_duration(eta as f64)));
                    }
                }
                text
            }
            Some(ProgressEvent::Transcode(progress)) => match progress.percent {
                Some(_) => format!("{:5.1}%", self.percent),
                None => format!("{} encoded", format_duration(progress.position)),
            },
            _ => "starting...".to_string(),
        }
    }
}

struct ActiveIndicator {
    model: Indicator,
    bar: ProgressBar,
}

/// Renders one indicatif indicator per stage from parsed events
pub struct StructuredPresenter {
    detailed: bool,
    visible: bool,
    active: Option<ActiveIndicator>,
}

impl StructuredPresenter {
    /// `detailed` adds the bar itself plus size, rate and ETA
    pub fn new(detailed: bool) -> Self {
        Self {
            detailed,
            visible: true,
            active: None,
        }
    }

    /// A presenter that tracks state but draws nothing
    pub fn hidden(detailed: bool) -> Self {
        Self {
            detailed,
            visible: false,
            active: None,
        }
    }

    /// Indicator of the stage currently on screen
    pub fn indicator(&self) -> Option<&Indicator> {
        self.active.as_ref().map(|active| &active.model)
    }

    fn make_bar(&self, stage: Stage) -> ProgressBar {
        let target = if self.visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let template = if self.detailed {
            "{prefix:>12.cyan.bold} [{bar:40.cyan/blue}] {msg}"
        } else {
            "{prefix:>12.cyan.bold} {msg}"
        };

        let bar = ProgressBar::with_draw_target(Some(BAR_SCALE), target);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(stage.label());
        bar.set_message("starting...");
        bar
    }

    fn print_above(&self, text: String) {
        match &self.active {
            Some(active) => active.bar.println(text),
            None if self.visible => println!("{}", text),
            None => {}
        }
    }
}

impl Presenter for StructuredPresenter {
    fn stage_started(&mut self, stage: Stage) {
        if let Some(previous) = self.active.take() {
            previous.bar.finish_and_clear();
        }
        self.active = Some(ActiveIndicator {
            model: Indicator::new(stage),
            bar: self.make_bar(stage),
        });
    }

    fn line(&mut self, _stage: Stage, _raw: &str, event: &ProgressEvent) {
        match event {
            ProgressEvent::Info(text) => self.print_above(text.clone()),
            ProgressEvent::Warning { message, .. } => {
                self.print_above(style(message).yellow().to_string())
            }
            _ => {
                if let Some(active) = self.active.as_mut() {
                    if active.model.apply(event) {
                        active
                            .bar
                            .set_position((active.model.percent() * 10.0).round() as u64);
                        active.bar.set_message(active.model.message(self.detailed));
                    }
                }
            }
        }
    }

    fn stage_finished(&mut self, stage: Stage, success: bool) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        if active.model.stage() != stage || !active.model.finalize(success) {
            active.bar.finish_and_clear();
            return;
        }

        if success {
            active.bar.set_position(BAR_SCALE);
            active
                .bar
                .finish_with_message(format!("{:5.1}% done", active.model.percent()));
        } else {
            active.bar.abandon_with_message(style("failed").red().to_string());
        }
    }
}

/// Verbose passthrough: forwards every raw line unmodified
pub struct RawSink<W: Write + Send> {
    out: W,
}

impl RawSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> RawSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line) {
            tracing::debug!("Raw output sink failed: {}", e);
        }
    }
}

impl<W: Write + Send> Presenter for RawSink<W> {
    fn command(&mut self, command_line: &str) {
        self.write_line(&format!("Executing command: {}", command_line));
    }

    fn raw(&mut self, line: &str) {
        self.write_line(line);
    }

    fn stage_started(&mut self, _stage: Stage) {}

    fn line(&mut self, _stage: Stage, raw: &str, _event: &ProgressEvent) {
        self.write_line(raw);
    }

    fn stage_finished(&mut self, _stage: Stage, _success: bool) {}
}
