//! Clip cache pipeline: acquire clip, extract stills, convert, clean up.
//!
//! Stages run strictly in order. A clip is only counted once it has been
//! renamed from its `.partial` name, and a scratch directory is only reused
//! when its `.complete` marker matches the stills on disk, so a run that
//! dies at any point leaves state the next run can resume from or discard.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, watch};

use crate::error::AppError;
use crate::media::ascii::grid_to_ascii;
use crate::media::cache::{CachedClip, ClipCache, next_free_index, pick_random};
use crate::media::playback::AsciiFrameSequence;
use crate::traits::{ClipSource, FrameDecoder, FrameSpec, Transcoder};

const COMPLETE_MARKER: &str = ".complete";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cache_dir: PathBuf,
    pub capacity: usize,
    /// Length kept from the start of each downloaded video.
    pub clip_window: Duration,
    pub frames: FrameSpec,
    /// Character grid each still is resized to.
    pub grid_width: u32,
    pub grid_height: u32,
    /// Bound on each fetch and transcoder call.
    pub step_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("videos"),
            capacity: 8,
            clip_window: Duration::from_secs(30),
            frames: FrameSpec::default(),
            grid_width: 24,
            grid_height: 14,
            step_timeout: Duration::from_secs(300),
        }
    }
}

/// Where the playing clip came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClipOrigin {
    Cached,
    Fresh { slot: usize, capacity: usize },
}

/// Progress of the media pipeline and player, shown as a status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MediaStatus {
    Starting,
    LoadingFromCache { cached: usize },
    Downloading { slot: usize, capacity: usize },
    Extracting,
    Converting { frame: usize, total: usize },
    Playing { frames: usize, origin: ClipOrigin },
    Failed { error: String },
}

impl MediaStatus {
    /// Coarse phase name.
    pub fn phase(&self) -> &'static str {
        match self {
            MediaStatus::Starting => "starting",
            MediaStatus::LoadingFromCache { .. } | MediaStatus::Downloading { .. } => "fetching",
            MediaStatus::Extracting => "extracting",
            MediaStatus::Converting { .. } => "converting",
            MediaStatus::Playing { .. } => "playing",
            MediaStatus::Failed { .. } => "error",
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, MediaStatus::Playing { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MediaStatus::Failed { .. })
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaStatus::Starting => write!(f, "Starting..."),
            MediaStatus::LoadingFromCache { cached } => {
                write!(f, "Loading from cache ({cached} videos)...")
            }
            MediaStatus::Downloading { slot, capacity } => {
                write!(f, "Downloading video ({slot}/{capacity})...")
            }
            MediaStatus::Extracting => write!(f, "Extracting frames..."),
            MediaStatus::Converting { frame, total } => {
                write!(f, "Converting frame {frame}/{total}...")
            }
            MediaStatus::Playing {
                frames,
                origin: ClipOrigin::Cached,
            } => write!(f, "Playing ({frames} frames) - from cache"),
            MediaStatus::Playing {
                frames,
                origin: ClipOrigin::Fresh { slot, capacity },
            } => write!(f, "Playing ({frames} frames) - {slot}/{capacity} cached"),
            MediaStatus::Failed { error } => write!(f, "error: {error}"),
        }
    }
}

pub struct MediaCachePipeline<S, T, D> {
    cache: ClipCache,
    config: PipelineConfig,
    source: S,
    transcoder: T,
    decoder: Arc<D>,
    run_lock: Mutex<()>,
}

impl<S, T, D> MediaCachePipeline<S, T, D>
where
    S: ClipSource,
    T: Transcoder,
    D: FrameDecoder,
{
    pub fn new(config: PipelineConfig, source: S, transcoder: T, decoder: D) -> Self {
        Self {
            cache: ClipCache::new(&config.cache_dir, config.capacity),
            config,
            source,
            transcoder,
            decoder: Arc::new(decoder),
            run_lock: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &ClipCache {
        &self.cache
    }

    /// Run every stage and return the converted frames. Progress is
    /// published on `status`; the final `Playing`/`Failed` status is left to
    /// the caller.
    pub async fn run(
        &self,
        status: &watch::Sender<MediaStatus>,
    ) -> Result<(AsciiFrameSequence, ClipOrigin), AppError> {
        let _appending = self.run_lock.lock().await;

        self.cache.ensure_dir().await?;
        let swept = self.cache.remove_incomplete().await?;
        if swept > 0 {
            tracing::info!(files = swept, "Removed incomplete clips from previous run");
        }

        let (clip, origin) = self.acquire_clip(status).await?;
        tracing::info!(clip = %clip.path.display(), ?origin, "Clip ready");

        let scratch = self.cache.scratch_dir(clip.index);
        let converted = async {
            status.send_replace(MediaStatus::Extracting);
            let stills = self.extract_frames(&clip, &scratch).await?;
            self.convert(&stills, status).await
        }
        .await;

        // Stills live only for the duration of one run.
        if let Err(e) = remove_dir_if_exists(&scratch).await {
            tracing::warn!(dir = %scratch.display(), error = %e, "Scratch cleanup failed");
        }

        let frames = converted?;
        let count = frames.len();
        let sequence = AsciiFrameSequence::new(frames).ok_or_else(|| {
            AppError::TranscodeFailed(format!("no frames from {}", clip.path.display()))
        })?;
        tracing::info!(frames = count, "Clip converted");
        Ok((sequence, origin))
    }

    async fn acquire_clip(
        &self,
        status: &watch::Sender<MediaStatus>,
    ) -> Result<(CachedClip, ClipOrigin), AppError> {
        let clips = self.cache.list().await?;

        if self.cache.is_full(&clips) {
            status.send_replace(MediaStatus::LoadingFromCache {
                cached: clips.len(),
            });
            let clip = pick_random(&clips)
                .cloned()
                .ok_or_else(|| AppError::CacheError("cache reported full but is empty".into()))?;
            return Ok((clip, ClipOrigin::Cached));
        }

        let index = next_free_index(&clips);
        let slot = clips.len() + 1;
        let capacity = self.cache.capacity();
        status.send_replace(MediaStatus::Downloading { slot, capacity });

        let downloaded = self
            .bounded(
                "fetch",
                self.source
                    .fetch(self.cache.dir(), &self.cache.download_stem(index)),
            )
            .await?;

        let partial = self.cache.partial_path(index);
        let trimmed = self
            .bounded(
                "trim",
                self.transcoder
                    .trim(&downloaded, &partial, self.config.clip_window),
            )
            .await;

        if let Err(e) = tokio::fs::remove_file(&downloaded).await {
            tracing::debug!(file = %downloaded.display(), error = %e, "Download cleanup failed");
        }
        if let Err(e) = trimmed {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        let path = self.cache.clip_path(index);
        tokio::fs::rename(&partial, &path).await?;
        Ok((CachedClip { index, path }, ClipOrigin::Fresh { slot, capacity }))
    }

    /// Produce the ordered stills for `clip`, reusing a completed scratch
    /// directory when one exists.
    async fn extract_frames(&self, clip: &CachedClip, scratch: &Path) -> Result<Vec<PathBuf>, AppError> {
        if let Some(stills) = reusable_stills(scratch).await? {
            tracing::info!(dir = %scratch.display(), stills = stills.len(), "Reusing extracted frames");
            return Ok(stills);
        }

        remove_dir_if_exists(scratch).await?;
        tokio::fs::create_dir_all(scratch).await?;

        self.bounded(
            "extract",
            self.transcoder
                .extract_frames(&clip.path, scratch, self.config.frames),
        )
        .await?;

        let stills = list_stills(scratch).await?;
        if stills.is_empty() {
            return Err(AppError::TranscodeFailed(format!(
                "no frames extracted from {}",
                clip.path.display()
            )));
        }
        tokio::fs::write(scratch.join(COMPLETE_MARKER), stills.len().to_string()).await?;
        Ok(stills)
    }

    async fn convert(
        &self,
        stills: &[PathBuf],
        status: &watch::Sender<MediaStatus>,
    ) -> Result<Vec<String>, AppError> {
        let (width, height) = (self.config.grid_width, self.config.grid_height);
        let total = stills.len();
        let mut frames = Vec::with_capacity(total);

        for (i, still) in stills.iter().enumerate() {
            status.send_replace(MediaStatus::Converting { frame: i + 1, total });

            let decoder = Arc::clone(&self.decoder);
            let path = still.clone();
            let grid = tokio::task::spawn_blocking(move || decoder.decode_resized(&path, width, height))
                .await
                .map_err(|e| AppError::DecodeFailed {
                    path: still.display().to_string(),
                    cause: e.to_string(),
                })??;
            frames.push(grid_to_ascii(&grid));
        }
        Ok(frames)
    }

    async fn bounded<O>(
        &self,
        stage: &str,
        fut: impl Future<Output = Result<O, AppError>>,
    ) -> Result<O, AppError> {
        let limit = self.config.step_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%stage, timeout_secs = limit.as_secs(), "Pipeline step timed out");
                Err(AppError::TranscodeFailed(format!(
                    "{stage} timed out after {}s",
                    limit.as_secs()
                )))
            }
        }
    }
}

/// Stills in `dir` if its marker matches their count.
async fn reusable_stills(dir: &Path) -> Result<Option<Vec<PathBuf>>, AppError> {
    let marker = match tokio::fs::read_to_string(dir.join(COMPLETE_MARKER)).await {
        Ok(marker) => marker,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let Ok(expected) = marker.trim().parse::<usize>() else {
        return Ok(None);
    };
    let stills = list_stills(dir).await?;
    Ok((expected > 0 && stills.len() == expected).then_some(stills))
}

/// `frame-*.png` files in `dir`, in name order.
async fn list_stills(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut stills = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if name
            .to_str()
            .is_some_and(|n| n.starts_with("frame-") && n.ends_with(".png"))
        {
            stills.push(entry.path());
        }
    }
    stills.sort();
    Ok(stills)
}

async fn remove_dir_if_exists(dir: &Path) -> Result<(), AppError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockClipSource, MockDecoder, MockTranscoder};

    type TestPipeline = MediaCachePipeline<MockClipSource, MockTranscoder, MockDecoder>;

    fn pipeline(
        dir: &Path,
        capacity: usize,
        source: &MockClipSource,
        transcoder: &MockTranscoder,
        decoder: MockDecoder,
    ) -> TestPipeline {
        let config = PipelineConfig {
            cache_dir: dir.to_path_buf(),
            capacity,
            grid_width: 4,
            grid_height: 2,
            ..Default::default()
        };
        MediaCachePipeline::new(config, source.clone(), transcoder.clone(), decoder)
    }

    fn status() -> (watch::Sender<MediaStatus>, watch::Receiver<MediaStatus>) {
        watch::channel(MediaStatus::Starting)
    }

    #[tokio::test]
    async fn test_fresh_run_downloads_trims_and_converts() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockClipSource::new();
        let transcoder = MockTranscoder::new(5);
        let pipeline = pipeline(dir.path(), 8, &source, &transcoder, MockDecoder::new());
        let (tx, _rx) = status();

        let (frames, origin) = pipeline.run(&tx).await.unwrap();

        assert_eq!(frames.len(), 5);
        assert_eq!(frames.frame(0), "@@@@\n@@@@\n");
        assert_eq!(origin, ClipOrigin::Fresh { slot: 1, capacity: 8 });
        assert_eq!(source.fetches(), 1);
        assert_eq!(transcoder.trims(), 1);
        assert_eq!(transcoder.last_trim_window(), Some(Duration::from_secs(30)));
        assert!(dir.path().join("clip-0.mp4").exists());
        assert!(!dir.path().join("clip-0.partial.mp4").exists());
        assert!(!dir.path().join("clip-0.download.mp4").exists());
        assert_eq!(*tx.borrow(), MediaStatus::Converting { frame: 5, total: 5 });
    }

    #[tokio::test]
    async fn test_scratch_directory_removed_after_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockClipSource::new();
        let transcoder = MockTranscoder::new(7);
        let pipeline = pipeline(dir.path(), 8, &source, &transcoder, MockDecoder::new());
        let (tx, _rx) = status();

        let (frames, _) = pipeline.run(&tx).await.unwrap();

        assert_eq!(frames.len(), 7);
        assert!(!dir.path().join("frames-0").exists());
    }

    #[tokio::test]
    async fn test_full_cache_reuses_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockClipSource::new();
        let transcoder = MockTranscoder::new(3);
        let pipeline = pipeline(dir.path(), 1, &source, &transcoder, MockDecoder::new());
        let (tx, _rx) = status();

        pipeline.run(&tx).await.unwrap();
        let (_, origin) = pipeline.run(&tx).await.unwrap();

        assert_eq!(origin, ClipOrigin::Cached);
        assert_eq!(source.fetches(), 1);
        assert_eq!(transcoder.extracted_from(), vec![
            dir.path().join("clip-0.mp4"),
            dir.path().join("clip-0.mp4"),
        ]);
        assert_eq!(pipeline.cache().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_clip_is_discarded_and_slot_reused() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("clip-0.partial.mp4"), b"half").await.unwrap();
        let source = MockClipSource::new();
        let transcoder = MockTranscoder::new(2);
        let pipeline = pipeline(dir.path(), 1, &source, &transcoder, MockDecoder::new());
        let (tx, _rx) = status();

        let (_, origin) = pipeline.run(&tx).await.unwrap();

        assert_eq!(origin, ClipOrigin::Fresh { slot: 1, capacity: 1 });
        assert_eq!(source.fetches(), 1);
        assert!(dir.path().join("clip-0.mp4").exists());
        assert!(!dir.path().join("clip-0.partial.mp4").exists());
    }

    #[tokio::test]
    async fn test_completed_scratch_directory_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("clip-0.mp4"), b"mp4").await.unwrap();
        let scratch = dir.path().join("frames-0");
        tokio::fs::create_dir_all(&scratch).await.unwrap();
        for i in 1..=4 {
            tokio::fs::write(scratch.join(format!("frame-{i:04}.png")), b"png").await.unwrap();
        }
        tokio::fs::write(scratch.join(".complete"), "4").await.unwrap();

        let source = MockClipSource::new();
        let transcoder = MockTranscoder::new(9);
        let pipeline = pipeline(dir.path(), 1, &source, &transcoder, MockDecoder::new());
        let (tx, _rx) = status();

        let (frames, _) = pipeline.run(&tx).await.unwrap();

        assert_eq!(frames.len(), 4);
        assert!(transcoder.extracted_from().is_empty());
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_incomplete_scratch_directory_is_re_extracted() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("clip-0.mp4"), b"mp4").await.unwrap();
        let scratch = dir.path().join("frames-0");
        tokio::fs::create_dir_all(&scratch).await.unwrap();
        tokio::fs::write(scratch.join("frame-0001.png"), b"png").await.unwrap();
        tokio::fs::write(scratch.join(".complete"), "40").await.unwrap();

        let source = MockClipSource::new();
        let transcoder = MockTranscoder::new(6);
        let pipeline = pipeline(dir.path(), 1, &source, &transcoder, MockDecoder::new());
        let (tx, _rx) = status();

        let (frames, _) = pipeline.run(&tx).await.unwrap();

        assert_eq!(frames.len(), 6);
        assert_eq!(transcoder.extracted_from().len(), 1);
    }

    #[tokio::test]
    async fn test_extract_failure_keeps_clip_and_removes_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockClipSource::new();
        let transcoder = MockTranscoder::new(3).with_failing_extract();
        let pipeline = pipeline(dir.path(), 8, &source, &transcoder, MockDecoder::new());
        let (tx, _rx) = status();

        let err = pipeline.run(&tx).await.unwrap_err();

        assert!(matches!(err, AppError::TranscodeFailed(_)));
        assert!(dir.path().join("clip-0.mp4").exists());
        assert!(!dir.path().join("frames-0").exists());
    }

    #[tokio::test]
    async fn test_trim_failure_leaves_no_clip() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockClipSource::new();
        let transcoder = MockTranscoder::new(3).with_failing_trim();
        let pipeline = pipeline(dir.path(), 8, &source, &transcoder, MockDecoder::new());
        let (tx, _rx) = status();

        assert!(pipeline.run(&tx).await.is_err());
        assert!(pipeline.cache().list().await.unwrap().is_empty());
        assert!(!dir.path().join("clip-0.partial.mp4").exists());
    }

    #[tokio::test]
    async fn test_decode_failure_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockClipSource::new();
        let transcoder = MockTranscoder::new(3);
        let decoder = MockDecoder::new().failing_on("frame-0002.png");
        let pipeline = pipeline(dir.path(), 8, &source, &transcoder, decoder);
        let (tx, _rx) = status();

        let err = pipeline.run(&tx).await.unwrap_err();

        assert!(matches!(err, AppError::DecodeFailed { ref path, .. } if path.ends_with("frame-0002.png")));
        assert!(dir.path().join("clip-0.mp4").exists());
        assert!(!dir.path().join("frames-0").exists());
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_cache_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockClipSource::failing();
        let transcoder = MockTranscoder::new(3);
        let pipeline = pipeline(dir.path(), 8, &source, &transcoder, MockDecoder::new());
        let (tx, _rx) = status();

        assert!(pipeline.run(&tx).await.is_err());
        assert_eq!(transcoder.trims(), 0);
        assert!(pipeline.cache().list().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timeout_names_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockClipSource::hanging();
        let transcoder = MockTranscoder::new(3);
        let pipeline = pipeline(dir.path(), 8, &source, &transcoder, MockDecoder::new());
        let (tx, _rx) = status();

        let err = pipeline.run(&tx).await.unwrap_err();

        assert!(err.is_pipeline_failure());
        assert_eq!(err.to_string(), "Transcode failed: fetch timed out after 300s");
        assert_eq!(transcoder.trims(), 0);
        assert!(pipeline.cache().list().await.unwrap().is_empty());
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(
            MediaStatus::Downloading { slot: 3, capacity: 8 }.to_string(),
            "Downloading video (3/8)..."
        );
        assert_eq!(
            MediaStatus::LoadingFromCache { cached: 8 }.to_string(),
            "Loading from cache (8 videos)..."
        );
        assert_eq!(
            MediaStatus::Converting { frame: 2, total: 300 }.to_string(),
            "Converting frame 2/300..."
        );
        assert_eq!(
            MediaStatus::Playing {
                frames: 300,
                origin: ClipOrigin::Cached
            }
            .to_string(),
            "Playing (300 frames) - from cache"
        );
        let failed = MediaStatus::Failed {
            error: "Transcode failed: exit status 1".into(),
        };
        assert_eq!(failed.to_string(), "error: Transcode failed: exit status 1");
        assert_eq!(failed.phase(), "error");
        assert_eq!(MediaStatus::Downloading { slot: 1, capacity: 1 }.phase(), "fetching");
    }
}
