use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::AppError;
use crate::models::PanelRecord;

/// Launches the heavyweight browser process behind a
/// [`ResourceSession`](crate::session::ResourceSession).
pub trait BrowserDriver: Send + Sync + 'static {
    type Process: BrowserProcess;

    fn launch(&self) -> impl Future<Output = Result<Self::Process, AppError>> + Send;
}

/// A running browser process.
pub trait BrowserProcess: Send + Sync + 'static {
    type Page: Page;

    /// Open a blank page (tab).
    fn new_page(&self) -> impl Future<Output = Result<Self::Page, AppError>> + Send;

    /// Returns false once the process has exited or its connection dropped.
    fn is_alive(&self) -> bool;

    /// Terminate the process.
    fn close(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A navigable page handle.
pub trait Page: Send + Sync {
    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Resolve once `selector` matches an element. Callers bound this with a timeout.
    fn wait_for_selector(&self, selector: &str)
    -> impl Future<Output = Result<(), AppError>> + Send;

    /// The fully rendered DOM as HTML.
    fn content(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    fn close(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Where an [`ExtractionJob`] points the page before extracting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTarget {
    pub url: String,
    /// Selector that signals the content is interactive.
    pub ready_selector: Option<String>,
    /// Extra delay after the selector appears, for client-rendered pages.
    pub settle: Duration,
}

impl PageTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ready_selector: None,
            settle: Duration::ZERO,
        }
    }

    pub fn wait_for(mut self, selector: impl Into<String>) -> Self {
        self.ready_selector = Some(selector.into());
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

/// Site-specific extraction logic.
///
/// Implementations read the page and return records; they must not retry
/// internally and must not touch engine state.
pub trait ExtractionJob: Send + Sync + 'static {
    type Record: PanelRecord + Clone + Serialize + Send + Sync + 'static;

    /// Short identifier used in logs.
    fn name(&self) -> &str;

    fn target(&self) -> PageTarget;

    fn run<P: Page>(
        &self,
        page: &P,
    ) -> impl Future<Output = Result<Vec<Self::Record>, AppError>> + Send;

    /// Deterministic records returned instead of live data in test-data mode.
    fn fixture(&self) -> Vec<Self::Record> {
        Vec::new()
    }
}

/// Downloads a source video for the clip cache.
pub trait ClipSource: Send + Sync {
    /// Download into `dest_dir` using `stem` as the file stem; returns the written path.
    fn fetch(
        &self,
        dest_dir: &Path,
        stem: &str,
    ) -> impl Future<Output = Result<PathBuf, AppError>> + Send;
}

/// Frame sampling parameters for [`Transcoder::extract_frames`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self {
            fps: 10,
            width: 320,
            height: 240,
        }
    }
}

/// External one-shot transcoder process.
pub trait Transcoder: Send + Sync {
    /// Copy the first `window` of `input` into `output`.
    fn trim(
        &self,
        input: &Path,
        output: &Path,
        window: Duration,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Write `frame-%04d.png` stills sampled from `input` into `out_dir`.
    fn extract_frames(
        &self,
        input: &Path,
        out_dir: &Path,
        spec: FrameSpec,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Decoded RGB pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 3]>,
}

impl PixelGrid {
    /// Returns `None` if `pixels` does not hold exactly `width * height` entries.
    pub fn new(width: u32, height: u32, pixels: Vec<[u8; 3]>) -> Option<Self> {
        (pixels.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_at(&self, x: u32, y: u32) -> [u8; 3] {
        self.pixels[(y * self.width + x) as usize]
    }
}

/// Pixel-decoding library: decode a still and resize it to the character grid.
pub trait FrameDecoder: Send + Sync + 'static {
    fn decode_resized(&self, path: &Path, width: u32, height: u32)
    -> Result<PixelGrid, AppError>;
}
