use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{error, info};

use replay_fetch::config::AppConfig;
use replay_fetch::domain::{Job, Selection};
use replay_fetch::logging::init_logging;
use replay_fetch::pipeline::TracingSink;
use replay_fetch::tools::FfmpegTools;
use replay_fetch::utils::size::parse_byte_size;
use replay_fetch::JobRunner;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Job description file (JSON)
    #[arg(short, long)]
    job: PathBuf,

    /// Config file (TOML); defaults to the platform config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Segments to process: `all` or a comma-separated list such as `1,3,4`
    #[arg(short, long)]
    select: Option<Selection>,

    /// Number of segments processed at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Aggregate transfer limit per second, e.g. `2MiB` or `500k`
    #[arg(long, value_parser = parse_rate_limit)]
    rate_limit: Option<u64>,

    /// Write a playlist instead of merging into one file
    #[arg(long)]
    no_merge: bool,

    /// Override the job's output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// ffmpeg binary
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// ffprobe binary
    #[arg(long)]
    ffprobe: Option<PathBuf>,

    /// Log filter directives, e.g. `replay_fetch=debug`
    #[arg(long)]
    log_filter: Option<String>,

    /// Also write daily log files into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn parse_rate_limit(value: &str) -> Result<u64, String> {
    match parse_byte_size(value) {
        Ok(0) => Err("rate limit must be greater than zero".to_string()),
        Ok(bytes) => Ok(bytes),
        Err(e) => Err(e.to_string()),
    }
}

async fn load_config(args: &Args) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref()).await?;
    config.apply_env();
    if let Some(path) = &args.ffmpeg {
        config.ffmpeg.ffmpeg_path = path.clone();
    }
    if let Some(path) = &args.ffprobe {
        config.ffmpeg.ffprobe_path = path.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn load_job(args: &Args) -> anyhow::Result<Job> {
    let mut job = Job::load(&args.job)
        .await
        .with_context(|| format!("Failed to load job file {}", args.job.display()))?;
    if let Some(selection) = &args.select {
        job.selection = selection.clone();
    }
    if let Some(concurrency) = args.concurrency {
        anyhow::ensure!(concurrency > 0, "concurrency must be greater than zero");
        job.concurrency = concurrency;
    }
    if let Some(limit) = args.rate_limit {
        job.rate_limit = Some(limit);
    }
    if args.no_merge {
        job.merge_mode = false;
    }
    if let Some(dir) = &args.output_dir {
        job.output_dir = dir.clone();
    }
    Ok(job)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args).await?;
    let job = load_job(&args).await?;

    let tools = FfmpegTools::new(&config.ffmpeg);
    let version = tools.runner().version().await.with_context(|| {
        format!(
            "ffmpeg is not usable at {}",
            config.ffmpeg.ffmpeg_path.display()
        )
    })?;
    info!(%version, "Found ffmpeg");
    let version = tools.prober().version().await.with_context(|| {
        format!(
            "ffprobe is not usable at {}",
            config.ffmpeg.ffprobe_path.display()
        )
    })?;
    info!(%version, "Found ffprobe");

    let runner = JobRunner::for_job(config, &job, Arc::new(TracingSink))?;
    let report = runner.run(&job).await?;
    anyhow::ensure!(
        report.is_success(),
        "{} of {} segments failed",
        report.failed(),
        report.entries.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _guard = match init_logging(args.log_filter.as_deref(), args.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
