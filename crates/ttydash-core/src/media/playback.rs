//! Looping playback of converted frames.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::media::pipeline::{MediaCachePipeline, MediaStatus};
use crate::traits::{ClipSource, FrameDecoder, Transcoder};

/// Non-empty, ordered ASCII frames of one clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiFrameSequence {
    frames: Vec<String>,
}

impl AsciiFrameSequence {
    /// Returns `None` for an empty frame list.
    pub fn new(frames: Vec<String>) -> Option<Self> {
        (!frames.is_empty()).then_some(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame at `index`, wrapping past the end.
    pub fn frame(&self, index: usize) -> &str {
        &self.frames[index % self.frames.len()]
    }
}

/// Cursor over a frame sequence.
#[derive(Debug, Clone)]
pub struct Playback {
    sequence: Arc<AsciiFrameSequence>,
    index: usize,
}

impl Playback {
    pub fn new(sequence: Arc<AsciiFrameSequence>) -> Self {
        Self { sequence, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> &str {
        self.sequence.frame(self.index)
    }

    /// Step to the next frame, wrapping to 0 after the last.
    pub fn advance(&mut self) -> usize {
        self.index = (self.index + 1) % self.sequence.len();
        self.index
    }
}

/// What the UI shows for the media pane.
#[derive(Debug, Clone, Serialize)]
pub struct MediaSnapshot {
    pub status: MediaStatus,
    pub frame: Option<String>,
    pub frame_index: usize,
    pub frame_count: usize,
}

#[derive(Debug, Clone, Default)]
struct FrameView {
    text: Option<String>,
    index: usize,
    count: usize,
}

/// Read side of a running [`MediaPlayer`].
#[derive(Clone)]
pub struct MediaHandle {
    status: watch::Receiver<MediaStatus>,
    frame: watch::Receiver<FrameView>,
}

impl MediaHandle {
    pub fn snapshot(&self) -> MediaSnapshot {
        let frame = self.frame.borrow().clone();
        MediaSnapshot {
            status: self.status.borrow().clone(),
            frame: frame.text,
            frame_index: frame.index,
            frame_count: frame.count,
        }
    }
}

/// Runs the pipeline once, then loops the frames on a fixed period.
pub struct MediaPlayer;

impl MediaPlayer {
    pub fn spawn<S, T, D>(
        pipeline: MediaCachePipeline<S, T, D>,
        frame_period: Duration,
        cancel: CancellationToken,
    ) -> (MediaHandle, JoinHandle<()>)
    where
        S: ClipSource + 'static,
        T: Transcoder + 'static,
        D: FrameDecoder,
    {
        let (status_tx, status_rx) = watch::channel(MediaStatus::Starting);
        let (frame_tx, frame_rx) = watch::channel(FrameView::default());
        let handle = MediaHandle {
            status: status_rx,
            frame: frame_rx,
        };
        let task = tokio::spawn(play(pipeline, frame_period, status_tx, frame_tx, cancel));
        (handle, task)
    }
}

async fn play<S, T, D>(
    pipeline: MediaCachePipeline<S, T, D>,
    frame_period: Duration,
    status: watch::Sender<MediaStatus>,
    frames: watch::Sender<FrameView>,
    cancel: CancellationToken,
) where
    S: ClipSource,
    T: Transcoder,
    D: FrameDecoder,
{
    let result = tokio::select! {
        () = cancel.cancelled() => return,
        result = pipeline.run(&status) => result,
    };

    let (sequence, origin) = match result {
        Ok(done) => done,
        Err(e) => {
            if e.is_pipeline_failure() {
                tracing::warn!(error = %e, "Media tool or frame decode failed");
            } else {
                tracing::error!(error = %e, "Media pipeline failed");
            }
            status.send_replace(MediaStatus::Failed {
                error: e.to_string(),
            });
            return;
        }
    };

    let count = sequence.len();
    let mut playback = Playback::new(Arc::new(sequence));
    publish(&frames, &playback, count);
    status.send_replace(MediaStatus::Playing {
        frames: count,
        origin,
    });

    let period = frame_period.max(Duration::from_millis(10));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                playback.advance();
                publish(&frames, &playback, count);
            }
        }
    }
}

fn publish(frames: &watch::Sender<FrameView>, playback: &Playback, count: usize) {
    frames.send_replace(FrameView {
        text: Some(playback.current().to_string()),
        index: playback.index(),
        count,
    });
}
