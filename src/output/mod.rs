use console::style;
use std::path::Path;
use std::time::Duration;

use crate::batch::BatchReport;
use crate::input::TruncationHint;
use crate::pipeline::{FailureReason, JobOutcome};
use crate::progress::Stage;

pub mod transcript;

pub use transcript::TranscriptLog;

/// Announce how many URLs will be processed
pub fn print_found(count: usize) {
    println!("{}", style(format!("Found {} file(s) to process.", count)).magenta());
}

pub fn print_job_banner(index: usize, total: usize, url: &str) {
    println!();
    println!(
        "{}",
        style(format!("--- Processing file {}/{}: {} ---", index, total, url)).bold()
    );
}

/// Stage header, e.g. `Step 1: Downloading audio track...`
pub fn print_step(stage: Stage, output_name: &str) {
    let text = match stage {
        Stage::Download => "Step 1: Downloading audio track...".to_string(),
        Stage::Transcode => format!("Step 2: Converting to MP3 -> ({})...", output_name),
    };
    println!("{}", style(text).cyan());
}

pub fn print_unquoted_hint(hint: &TruncationHint) {
    println!(
        "{}",
        style(format!(
            "Error: an argument looks like part of a URL ({}).",
            hint.received
        ))
        .red()
    );
    println!(
        "{}",
        style("You probably forgot to enclose the whole link in double quotes.").yellow()
    );
    println!("{}", style("Example of correct usage:").cyan());
    println!("  ytmp3 \"{}\"", hint.reconstructed);
}

pub fn print_skipped(path: &Path) {
    println!(
        "{}",
        style(format!("Skipping file '{}'.", path.display())).cyan()
    );
}

pub fn print_job_failed(reason: FailureReason, detail: &str) {
    println!("{}", style(format!("Failed ({}): {}", reason, detail)).red());
}

pub fn print_job_done(path: &Path, download: Duration, transcode: Duration) {
    println!(
        "{}",
        style(format!("Successfully created: {}", path.display())).green()
    );
    println!("{}", style(format!("Download time:   {:.2}s", download.as_secs_f64())).green());
    println!("{}", style(format!("Conversion time: {:.2}s", transcode.as_secs_f64())).green());
    println!("{}", style("--------------------").green());
    println!(
        "{}",
        style(format!(
            "Total time:      {:.2}s",
            (download + transcode).as_secs_f64()
        ))
        .green()
        .bold()
    );
}

pub fn print_error(message: &str) {
    eprintln!("{}", style(format!("Error: {}", message)).red());
}

pub fn print_interrupted() {
    eprintln!(
        "{}",
        style("Interrupted. The running tool has been stopped.").yellow()
    );
}

/// Plain-text summary of a batch, one line per URL
pub fn format_summary(report: &BatchReport) -> String {
    let mut lines = vec![format!(
        "Summary: {} succeeded, {} skipped, {} failed",
        report.succeeded(),
        report.skipped(),
        report.failed()
    )];

    for entry in &report.entries {
        let line = match &entry.outcome {
            JobOutcome::Done { output } => {
                format!("  ✓ {} -> {}", entry.job.url, output.display())
            }
            JobOutcome::Skipped { path } => {
                format!("  - {} (skipped: {} already exists)", entry.job.url, path.display())
            }
            JobOutcome::Failed { reason, .. } => format!("  ✗ {} ({})", entry.job.url, reason),
        };
        lines.push(line);
    }

    if report.len() > 1 {
        lines.push(format!(
            "All tasks completed. Total script time: {:.2}s",
            report.elapsed.as_secs_f64()
        ));
    } else {
        lines.push("All tasks completed.".to_string());
    }

    lines.join("\n")
}

pub fn print_summary(report: &BatchReport) {
    println!();
    let summary = format_summary(report);
    let styled = if report.all_done() {
        style(summary).green().bold()
    } else {
        style(summary).yellow().bold()
    };
    println!("{}", styled);
}
