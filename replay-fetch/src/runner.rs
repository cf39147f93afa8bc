//! Runs one job end to end: segment pool, assembly, report.

use std::sync::Arc;

use tracing::{info, warn};

use crate::assembly::{AssemblyOutcome, AssemblyStage};
use crate::config::AppConfig;
use crate::domain::Job;
use crate::downloader::{HttpFetcher, RateLimiter, SegmentFetcher};
use crate::pipeline::{
    ProgressReporter, ProgressSink, SegmentTask, TaskContext, TaskSettings, WorkerPool,
    WorkerPoolConfig,
};
use crate::report::JobReport;
use crate::tools::{FfmpegTools, MediaTools};
use crate::utils::fs::ensure_dir_all;
use crate::{Error, Result};

pub struct JobRunner {
    config: AppConfig,
    fetcher: Arc<dyn SegmentFetcher>,
    tools: Arc<dyn MediaTools>,
    sink: Arc<dyn ProgressSink>,
}

impl JobRunner {
    pub fn new(
        config: AppConfig,
        fetcher: Arc<dyn SegmentFetcher>,
        tools: Arc<dyn MediaTools>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            fetcher,
            tools,
            sink,
        }
    }

    /// Runner backed by HTTP and the ffmpeg binaries.
    ///
    /// A rate limit on the job yields one token bucket shared by every
    /// transfer of the job.
    pub fn for_job(config: AppConfig, job: &Job, sink: Arc<dyn ProgressSink>) -> Result<Self> {
        let limiter = match job.rate_limit {
            Some(limit) => {
                info!(bytes_per_second = limit, "Transfer rate limit enabled");
                Some(Arc::new(RateLimiter::bytes_per_second(limit)?))
            }
            None => None,
        };
        let fetcher = HttpFetcher::new(&config.http, limiter)?;
        let tools = FfmpegTools::new(&config.ffmpeg);
        Ok(Self::new(config, Arc::new(fetcher), Arc::new(tools), sink))
    }

    fn task_settings(&self) -> TaskSettings {
        let pipeline = &self.config.pipeline;
        TaskSettings {
            progress_interval: pipeline.progress_interval(),
            segment_tolerance: pipeline.segment_tolerance(),
            intermediate_extension: pipeline.intermediate_extension().to_string(),
        }
    }

    /// Process the job's selected segments and assemble them when possible.
    ///
    /// Segment failures are part of the report. Selection, output directory
    /// and assembly errors end the job with an error.
    pub async fn run(&self, job: &Job) -> Result<JobReport> {
        let total = job.segments.len();
        let selected = job.selection.resolve(total);
        if selected.is_empty() {
            return Err(Error::selection(format!(
                "selection `{}` matches none of the {total} segments",
                job.selection
            )));
        }

        ensure_dir_all("creating output directory", &job.output_dir).await?;

        let assembly = AssemblyStage::new(
            self.tools.clone(),
            self.config.pipeline.manifest_name.clone(),
            self.sink.clone(),
        );

        if job.merge_mode {
            let tolerance = self.config.pipeline.recording_tolerance();
            if let Some(path) = assembly.existing_recording(job, tolerance).await {
                info!(path = %path.display(), "Recording already complete, nothing to do");
                let report = JobReport::already_complete(path);
                report.log_summary();
                return Ok(report);
            }
        }

        info!(
            record = %job.record.id,
            requested = ?job.selection.count(),
            selected = selected.len(),
            total,
            concurrency = job.concurrency,
            merge = job.merge_mode,
            "Starting job"
        );

        let tasks: Vec<SegmentTask> = selected
            .iter()
            .filter_map(|&index| job.segment(index))
            .map(|segment| {
                let progress =
                    ProgressReporter::new(Some(segment.index), segment.file_name(), self.sink.clone());
                SegmentTask::new(segment.clone(), &job.output_dir, progress)
            })
            .collect();

        let ctx = Arc::new(TaskContext {
            fetcher: self.fetcher.clone(),
            tools: self.tools.clone(),
            settings: self.task_settings(),
        });
        let pool = WorkerPool::new(WorkerPoolConfig {
            max_workers: job.concurrency,
            stagger_step: self.config.pipeline.stagger_step(),
            stagger_max: self.config.pipeline.stagger_max(),
        });
        let outcome = pool.run(tasks, ctx).await;
        info!(
            completed = outcome.results.len(),
            failed = outcome.failures.len(),
            stats = %outcome.stats,
            "All segments processed"
        );

        match assembly.assemble(job, &outcome.results).await {
            Ok(assembled) => {
                let report =
                    JobReport::build(&selected, &outcome.results, &outcome.failures, assembled);
                report.log_summary();
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Assembly failed, intermediate files were kept");
                let report = JobReport::build(
                    &selected,
                    &outcome.results,
                    &outcome.failures,
                    AssemblyOutcome::Failed(e.to_string()),
                );
                report.log_summary();
                Err(e)
            }
        }
    }
}
