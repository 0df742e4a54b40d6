use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vupload::broadcast::{JobProgressBroadcaster, JobStatus, JobStore};
use vupload::config::{load_config, Config};
use vupload::logging::{self, LogFormat};
use vupload::pipeline::{recover_jobs, BroadcastProgress, RunnerError, UploadRunner};
use vupload::{
    HttpTransport, JobOutcome, Privacy, StagingArea, UploadJob, VideoSettings, VuploadError,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a JSON config file. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Upload a video file and publish it.
    Upload(UploadArgs),
    /// Resume uploads interrupted by a previous run.
    Resume,
    /// List persisted in-flight jobs.
    Jobs,
}

#[derive(Args, Debug)]
struct UploadArgs {
    file: PathBuf,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, value_enum)]
    privacy: Option<PrivacyArg>,
    /// Upload the file itself instead of a staged copy. The file is deleted
    /// once the upload attempt ends.
    #[arg(long)]
    in_place: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PrivacyArg {
    Anybody,
    Nobody,
    Contacts,
    Password,
    Unlisted,
    Disable,
}

impl From<PrivacyArg> for Privacy {
    fn from(arg: PrivacyArg) -> Self {
        match arg {
            PrivacyArg::Anybody => Privacy::Anybody,
            PrivacyArg::Nobody => Privacy::Nobody,
            PrivacyArg::Contacts => Privacy::Contacts,
            PrivacyArg::Password => Privacy::Password,
            PrivacyArg::Unlisted => Privacy::Unlisted,
            PrivacyArg::Disable => Privacy::Disable,
        }
    }
}

impl UploadArgs {
    fn settings(&self) -> Option<VideoSettings> {
        let settings = VideoSettings {
            title: self.title.clone(),
            description: self.description.clone(),
            privacy: self.privacy.map(Privacy::from),
        };
        (!settings.is_empty()).then_some(settings)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    if let Err(e) = logging::init(logging::DEFAULT_FILTER, format) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every job succeeded.
async fn run(cli: Cli) -> Result<bool, VuploadError> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let database_path = config
        .storage
        .resolved_database_path()
        .ok_or_else(|| vupload::ConfigError::Validation {
            message: "No database path configured and no home directory found".to_string(),
        })?;
    let store = JobStore::open(&database_path)?;

    match cli.cmd {
        Cmd::Upload(args) => upload(&config, store, &database_path, args).await,
        Cmd::Resume => resume(&config, store, &database_path).await,
        Cmd::Jobs => {
            for job in store.list()? {
                println!(
                    "{}  {:<9} updated {}",
                    job.job_id,
                    job.phase,
                    job.updated_at.to_rfc3339()
                );
            }
            Ok(true)
        }
    }
}

async fn upload(
    config: &Config,
    store: JobStore,
    database_path: &Path,
    args: UploadArgs,
) -> Result<bool, VuploadError> {
    let staging = StagingArea::beside(database_path);
    let file = if args.in_place {
        args.file.clone()
    } else {
        staging.stage(&args.file)?
    };

    let transport = Arc::new(HttpTransport::new(&config.api)?);
    let mut completions = transport
        .take_completions()
        .ok_or(RunnerError::CompletionsClosed)?;
    let runner = runner(config, transport, store);
    let (progress, printer) = progress_printer(config);
    let cancel = cancel_on_ctrl_c();

    let mut job = UploadJob::new(file, args.settings());
    let result = runner
        .run(&mut job, &mut completions, &cancel, &progress)
        .await;
    drain_printer(progress, printer).await;
    staging.discard(&job);

    Ok(print_outcome(&job, &result?))
}

async fn resume(
    config: &Config,
    store: JobStore,
    database_path: &Path,
) -> Result<bool, VuploadError> {
    let staging = StagingArea::beside(database_path);
    let transport = Arc::new(HttpTransport::new(&config.api)?);
    let mut completions = transport
        .take_completions()
        .ok_or(RunnerError::CompletionsClosed)?;

    let mut report = recover_jobs(&store, &*transport)?;
    let mut all_ok = report.orphaned.is_empty() && report.corrupt.is_empty();

    for job in report.orphaned.iter().chain(&report.finished) {
        staging.discard(job);
    }
    for job in &report.orphaned {
        if let Some(JobOutcome::Failed(e)) = job.outcome() {
            println!("{}  {}", job.id(), e);
        }
    }
    for (id, e) in &report.corrupt {
        println!("{}  {}", id, e);
    }
    if report.resumed.is_empty() {
        println!("No uploads to resume");
        return Ok(all_ok);
    }

    let runner = runner(config, transport, store);
    let (progress, printer) = progress_printer(config);
    let cancel = cancel_on_ctrl_c();

    let result = runner
        .run_all(&mut report.resumed, &mut completions, &cancel, &progress)
        .await;
    drain_printer(progress, printer).await;
    for job in &report.resumed {
        staging.discard(job);
    }

    for (job, outcome) in report.resumed.iter().zip(&result?) {
        all_ok &= print_outcome(job, outcome);
    }
    Ok(all_ok)
}

fn runner(
    config: &Config,
    transport: Arc<HttpTransport>,
    store: JobStore,
) -> UploadRunner<HttpTransport> {
    UploadRunner::new(transport)
        .with_store(store)
        .with_progress_interval(Duration::from_millis(config.progress_interval_ms))
}

fn progress_printer(config: &Config) -> (BroadcastProgress, JoinHandle<()>) {
    let broadcaster = JobProgressBroadcaster::new(config.progress_capacity);
    let mut rx = broadcaster.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.status == JobStatus::Running => {
                    println!("[{}] {}", event.filename, event.message);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });
    (BroadcastProgress::new(broadcaster), printer)
}

/// Closes the progress channel and waits for queued lines to be printed.
async fn drain_printer(progress: BroadcastProgress, printer: JoinHandle<()>) {
    drop(progress);
    if let Err(e) = printer.await {
        log::warn!("Progress printer stopped: {}", e);
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, cancelling uploads");
            token.cancel();
        }
    });
    cancel
}

fn print_outcome(job: &UploadJob, outcome: &JobOutcome) -> bool {
    match outcome {
        JobOutcome::Succeeded { video_uri, video } => {
            let link = video.as_ref().and_then(|v| v.link.as_deref());
            match link {
                Some(link) => println!("{}  published {} ({})", job.filename(), video_uri, link),
                None => println!("{}  published {}", job.filename(), video_uri),
            }
            true
        }
        JobOutcome::Failed(e) => {
            println!("{}  {}", job.filename(), e);
            false
        }
        JobOutcome::Cancelled => {
            println!("{}  cancelled", job.filename());
            false
        }
    }
}
