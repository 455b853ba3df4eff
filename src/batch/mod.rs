use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::input::UrlArgument;
use crate::output;
use crate::pipeline::{FailureReason, Job, JobOutcome, JobPipeline, JobReport, Quality};
use crate::process::ProcessLaunchError;
use crate::ExtractorError;

/// State shared by all jobs of one batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchContext {
    /// The unquoted-URL help text has already been printed
    pub unquoted_hint_shown: bool,
}

/// Settings applied to every job of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefaults {
    pub destination: PathBuf,
    pub explicit_name: Option<String>,
    pub quality: Quality,
    pub overwrite: bool,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            destination: PathBuf::from("."),
            explicit_name: None,
            quality: Quality::default(),
            overwrite: false,
        }
    }
}

/// Build one job per URL argument, numbered from 1
pub fn plan_jobs(
    arguments: Vec<UrlArgument>,
    defaults: &JobDefaults,
) -> Result<Vec<Job>, ExtractorError> {
    if arguments.is_empty() {
        return Err(ExtractorError::NoUrls);
    }
    if defaults.explicit_name.is_some() && arguments.len() > 1 {
        return Err(ExtractorError::OutputWithMultipleUrls);
    }

    Ok(arguments
        .into_iter()
        .enumerate()
        .map(|(i, argument)| Job {
            url: argument.url.trim().to_string(),
            index: i + 1,
            destination: defaults.destination.clone(),
            explicit_name: defaults.explicit_name.clone(),
            quality: defaults.quality,
            overwrite: defaults.overwrite,
            stray_fragments: argument.stray_fragments,
        })
        .collect())
}

/// Outcome of every job in input order
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub entries: Vec<JobReport>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.is_done()).count()
    }

    pub fn skipped(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, JobOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.failure_reason().is_some())
            .count()
    }

    /// Number of jobs that failed for the given reason
    pub fn failures(&self, reason: FailureReason) -> usize {
        self.entries
            .iter()
            .filter(|e| e.failure_reason() == Some(reason))
            .count()
    }

    pub fn all_done(&self) -> bool {
        self.entries.iter().all(JobReport::is_done)
    }

    /// 0 when every job produced its MP3, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.all_done() {
            0
        } else {
            1
        }
    }
}

/// Runs jobs one after another, never stopping on a per-job failure
pub struct BatchOrchestrator<'a> {
    pipeline: JobPipeline<'a>,
    context: BatchContext,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(pipeline: JobPipeline<'a>) -> Self {
        Self {
            pipeline,
            context: BatchContext::default(),
        }
    }

    pub fn context(&self) -> &BatchContext {
        &self.context
    }

    /// Process every job; a tool that cannot be started aborts the batch
    pub async fn run(&mut self, jobs: &[Job]) -> Result<BatchReport, ProcessLaunchError> {
        let started = Instant::now();
        let total = jobs.len();
        let mut entries = Vec::with_capacity(total);

        output::print_found(total);

        for job in jobs {
            if total > 1 {
                output::print_job_banner(job.index, total, &job.url);
            }
            self.pipeline
                .log(&format!("--- Processing {}/{}: {} ---", job.index, total, job.url));

            let report = self.pipeline.run(job, &mut self.context).await?;
            entries.push(report);
        }

        let report = BatchReport {
            entries,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "Batch finished: {} done, {} skipped, {} failed",
            report.succeeded(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }
}
