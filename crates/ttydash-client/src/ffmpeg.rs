use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use ttydash_core::error::AppError;
use ttydash_core::traits::{FrameSpec, Transcoder};

use crate::tool;

/// [`Transcoder`] backed by the `ffmpeg` command-line tool.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    bin: OsString,
}

impl FfmpegTranscoder {
    pub fn new(bin: impl Into<OsString>) -> Self {
        Self { bin: bin.into() }
    }

    async fn invoke(&self, args: Vec<OsString>) -> Result<(), AppError> {
        tracing::debug!(bin = ?self.bin, ?args, "Running ffmpeg");
        tool::run(&self.bin, args)
            .await
            .map(|_| ())
            .map_err(|e| AppError::TranscodeFailed(format!("ffmpeg {e}")))
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

const COMMON_ARGS: [&str; 4] = ["-y", "-hide_banner", "-loglevel", "error"];

fn build_trim_args(input: &Path, output: &Path, window: Duration) -> Vec<OsString> {
    let mut args: Vec<OsString> = COMMON_ARGS.iter().map(OsString::from).collect();
    let tail: [OsString; 7] = [
        "-ss".into(),
        "0".into(),
        "-i".into(),
        input.into(),
        "-t".into(),
        format!("{}", window.as_secs_f64()).into(),
        output.into(),
    ];
    args.extend(tail);
    args
}

fn build_extract_args(input: &Path, out_dir: &Path, spec: FrameSpec) -> Vec<OsString> {
    let mut args: Vec<OsString> = COMMON_ARGS.iter().map(OsString::from).collect();
    let tail: [OsString; 5] = [
        "-i".into(),
        input.into(),
        "-vf".into(),
        format!("fps={},scale={}:{}", spec.fps, spec.width, spec.height).into(),
        out_dir.join("frame-%04d.png").into(),
    ];
    args.extend(tail);
    args
}

impl Transcoder for FfmpegTranscoder {
    async fn trim(&self, input: &Path, output: &Path, window: Duration) -> Result<(), AppError> {
        self.invoke(build_trim_args(input, output, window)).await
    }

    async fn extract_frames(
        &self,
        input: &Path,
        out_dir: &Path,
        spec: FrameSpec,
    ) -> Result<(), AppError> {
        self.invoke(build_extract_args(input, out_dir, spec)).await
    }
}
