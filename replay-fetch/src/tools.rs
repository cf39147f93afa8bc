//! Media tool seam: probing, remuxing and concatenation.
//!
//! The pipeline only talks to [`MediaTools`]; [`FfmpegTools`] is the
//! implementation backed by the `ffmpeg` / `ffprobe` binaries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use ffmpeg_runner::{DurationProber, FfmpegError, FfmpegRunner};

use crate::config::FfmpegSection;

/// Progress callback receiving `(current, total)`.
pub type DurationCallback<'a> = &'a (dyn Fn(Duration, Duration) + Send + Sync);

#[async_trait]
pub trait MediaTools: Send + Sync {
    async fn probe_duration(&self, path: &Path) -> Result<Duration, FfmpegError>;

    /// Summed duration of `paths`.
    async fn probe_total(&self, paths: &[PathBuf]) -> Result<Duration, FfmpegError>;

    /// Stream-copy `input` into an MPEG-TS file at `output`.
    async fn remux(
        &self,
        input: &Path,
        output: &Path,
        total: Duration,
        progress: DurationCallback<'_>,
    ) -> Result<(), FfmpegError>;

    /// Concatenate `inputs`, in order, into a faststart MP4 at `output`.
    async fn concat(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        total: Duration,
        progress: DurationCallback<'_>,
    ) -> Result<(), FfmpegError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegTools {
    runner: FfmpegRunner,
    prober: DurationProber,
    remux_timeout: Duration,
    concat_timeout: Duration,
}

impl FfmpegTools {
    pub fn new(section: &FfmpegSection) -> Self {
        let config = section.runner_config();
        Self {
            runner: FfmpegRunner::new(&config),
            prober: DurationProber::new(&config),
            remux_timeout: section.remux_timeout(),
            concat_timeout: section.concat_timeout(),
        }
    }

    pub fn runner(&self) -> &FfmpegRunner {
        &self.runner
    }

    pub fn prober(&self) -> &DurationProber {
        &self.prober
    }

    pub fn remux_args(input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            path_arg(input),
            "-c".to_string(),
            "copy".to_string(),
            "-bsf:v".to_string(),
            "h264_mp4toannexb".to_string(),
            "-f".to_string(),
            "mpegts".to_string(),
            path_arg(output),
        ]
    }

    pub fn concat_args(inputs: &[PathBuf], output: &Path) -> Vec<String> {
        let joined = inputs
            .iter()
            .map(|p| path_arg(p))
            .collect::<Vec<_>>()
            .join("|");
        vec![
            "-i".to_string(),
            format!("concat:{joined}"),
            "-c".to_string(),
            "copy".to_string(),
            "-bsf:a".to_string(),
            "aac_adtstoasc".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            path_arg(output),
        ]
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[async_trait]
impl MediaTools for FfmpegTools {
    async fn probe_duration(&self, path: &Path) -> Result<Duration, FfmpegError> {
        self.prober.probe(path).await
    }

    async fn probe_total(&self, paths: &[PathBuf]) -> Result<Duration, FfmpegError> {
        self.prober.probe_total(paths).await
    }

    async fn remux(
        &self,
        input: &Path,
        output: &Path,
        total: Duration,
        progress: DurationCallback<'_>,
    ) -> Result<(), FfmpegError> {
        let args = Self::remux_args(input, output);
        self.runner
            .run(args.as_slice(), total, self.remux_timeout, |current, total| {
                progress(current, total)
            })
            .await
    }

    async fn concat(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        total: Duration,
        progress: DurationCallback<'_>,
    ) -> Result<(), FfmpegError> {
        if inputs.is_empty() {
            return Err(FfmpegError::NoInputs);
        }
        let args = Self::concat_args(inputs, output);
        self.runner
            .run(args.as_slice(), total, self.concat_timeout, |current, total| {
                progress(current, total)
            })
            .await
    }
}
