use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yt_audio_extractor::batch::plan_jobs;
use yt_audio_extractor::input::collect_arguments;
use yt_audio_extractor::output::{self, TranscriptLog};
use yt_audio_extractor::pipeline::ConsolePrompt;
use yt_audio_extractor::progress::{Presenter, RawSink, StructuredPresenter};
use yt_audio_extractor::{BatchOrchestrator, Cli, Config, JobPipeline, ProcessRunner, Toolchain};

/// Conventional exit status after SIGINT
const INTERRUPTED: u8 = 130;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "yt_audio_extractor=debug,ytmp3=debug"
    } else {
        "yt_audio_extractor=warn,ytmp3=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref())?;
    let settings = config.merge(&cli)?;

    console::set_colors_enabled(settings.config.app.color);
    console::set_colors_enabled_stderr(settings.config.app.color);

    if cli.show_config {
        settings.display();
        return Ok(ExitCode::SUCCESS);
    }

    let arguments = collect_arguments(&cli.urls, cli.list.as_deref())?;
    let jobs = plan_jobs(arguments, &settings.job_defaults())?;

    let transcript = match settings.log_file() {
        Some(path) => {
            let log = TranscriptLog::open(path)?;
            println!("Logging enabled. Output will be saved to '{}'", path.display());
            log.record("--- Script started ---");
            Some(log)
        }
        None => None,
    };

    let tools = Toolchain::locate(&settings.config.tools.yt_dlp, &settings.config.tools.ffmpeg)?;
    fs_err::create_dir_all(&settings.destination)
        .context("Failed to create destination directory")?;

    let launcher = ProcessRunner::new();
    let prompt = ConsolePrompt;
    let options = settings.download_options();
    let mut presenter: Box<dyn Presenter> = if settings.debug {
        Box::new(RawSink::stdout())
    } else {
        Box::new(StructuredPresenter::new(settings.config.app.progress_bar))
    };

    let pipeline = JobPipeline::new(&launcher, &tools, &options, &prompt, presenter.as_mut())
        .with_transcript(transcript.as_ref());
    let mut orchestrator = BatchOrchestrator::new(pipeline);

    // Losing the race drops the batch future, which kills the running child
    let finished = tokio::select! {
        result = orchestrator.run(&jobs) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(result) = finished else {
        output::print_interrupted();
        if let Some(log) = &transcript {
            log.record("--- Interrupted ---");
        }
        // An unanswered overwrite prompt leaves a terminal read behind that
        // would hold up runtime shutdown
        std::process::exit(i32::from(INTERRUPTED));
    };

    let report = result?;
    output::print_summary(&report);
    if let Some(log) = &transcript {
        log.record("--- Script finished ---");
    }

    Ok(ExitCode::from(report.exit_code()))
}
