//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::AppError;
use crate::models::{Records, TubeLineStatus};
use crate::panel::{PanelEvent, PanelReporter};
use crate::session::ManagedResource;
use crate::source::PanelSource;
use crate::traits::{
    BrowserDriver, BrowserProcess, ClipSource, ExtractionJob, FrameDecoder, FrameSpec, Page,
    PageTarget, PixelGrid, Transcoder,
};

/// `n` tube line records named `Line 0..n`.
pub fn tube_line_records(n: usize) -> Vec<TubeLineStatus> {
    (0..n)
        .map(|i| TubeLineStatus {
            line_name: format!("Line {i}"),
            status_severity: "Good service".into(),
            affected_routes: vec![],
            description: String::new(),
        })
        .collect()
}

pub fn tube_lines(n: usize) -> Records {
    Records::TubeLines(tube_line_records(n))
}

// ---------------------------------------------------------------------------
// MockDriver / MockProcess / MockPage
// ---------------------------------------------------------------------------

#[derive(Default, Debug)]
struct BrowserLog {
    launches: usize,
    failing_launches: usize,
    /// Generation of the process currently alive, if any.
    alive: Option<usize>,
    processes_closed: usize,
    pages_opened: usize,
    pages_closed: usize,
    open_pages: usize,
    max_open_pages: usize,
    visited: Vec<String>,
    navigate_delay: Duration,
    fail_navigation: bool,
    hanging_launches: usize,
    hanging_new_pages: usize,
    fatal_new_pages: usize,
    hang_close: bool,
}

/// Mock browser driver recording launches, pages and closes.
#[derive(Clone, Default)]
pub struct MockDriver {
    log: Arc<Mutex<BrowserLog>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` launches fail.
    pub fn with_failing_launches(self, n: usize) -> Self {
        self.log.lock().unwrap().failing_launches = n;
        self
    }

    pub fn with_navigate_delay(self, delay: Duration) -> Self {
        self.log.lock().unwrap().navigate_delay = delay;
        self
    }

    pub fn with_failing_navigation(self) -> Self {
        self.log.lock().unwrap().fail_navigation = true;
        self
    }

    /// The next `n` launches never complete.
    pub fn with_hanging_launches(self, n: usize) -> Self {
        self.log.lock().unwrap().hanging_launches = n;
        self
    }

    /// The next `n` page opens never complete.
    pub fn with_hanging_new_pages(self, n: usize) -> Self {
        self.log.lock().unwrap().hanging_new_pages = n;
        self
    }

    /// The next `n` page opens report the process as gone while it still
    /// looks alive.
    pub fn with_fatal_new_pages(self, n: usize) -> Self {
        self.log.lock().unwrap().fatal_new_pages = n;
        self
    }

    /// Closing a process never completes.
    pub fn with_hanging_close(self) -> Self {
        self.log.lock().unwrap().hang_close = true;
        self
    }

    /// Simulate the live process dying.
    pub fn crash(&self) {
        self.log.lock().unwrap().alive = None;
    }

    pub fn launches(&self) -> usize {
        self.log.lock().unwrap().launches
    }

    pub fn processes_closed(&self) -> usize {
        self.log.lock().unwrap().processes_closed
    }

    pub fn pages_opened(&self) -> usize {
        self.log.lock().unwrap().pages_opened
    }

    pub fn pages_closed(&self) -> usize {
        self.log.lock().unwrap().pages_closed
    }

    pub fn max_concurrent_pages(&self) -> usize {
        self.log.lock().unwrap().max_open_pages
    }

    pub fn visited(&self) -> Vec<String> {
        self.log.lock().unwrap().visited.clone()
    }
}

impl BrowserDriver for MockDriver {
    type Process = MockProcess;

    async fn launch(&self) -> Result<MockProcess, AppError> {
        let hang = {
            let mut log = self.log.lock().unwrap();
            log.launches += 1;
            if log.failing_launches > 0 {
                log.failing_launches -= 1;
                return Err(AppError::LaunchFailed("mock browser refused to start".into()));
            }
            if log.hanging_launches > 0 {
                log.hanging_launches -= 1;
                true
            } else {
                false
            }
        };
        if hang {
            std::future::pending::<()>().await;
        }
        let mut log = self.log.lock().unwrap();
        let generation = log.launches;
        log.alive = Some(generation);
        Ok(MockProcess {
            log: Arc::clone(&self.log),
            generation,
        })
    }
}

#[derive(Debug)]
pub struct MockProcess {
    log: Arc<Mutex<BrowserLog>>,
    generation: usize,
}

impl BrowserProcess for MockProcess {
    type Page = MockPage;

    async fn new_page(&self) -> Result<MockPage, AppError> {
        let hang = {
            let mut log = self.log.lock().unwrap();
            if log.alive != Some(self.generation) {
                return Err(AppError::SessionClosed);
            }
            if log.fatal_new_pages > 0 {
                log.fatal_new_pages -= 1;
                return Err(AppError::SessionClosed);
            }
            if log.hanging_new_pages > 0 {
                log.hanging_new_pages -= 1;
                true
            } else {
                log.pages_opened += 1;
                log.open_pages += 1;
                log.max_open_pages = log.max_open_pages.max(log.open_pages);
                false
            }
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(MockPage {
            log: Arc::clone(&self.log),
        })
    }

    fn is_alive(&self) -> bool {
        self.log.lock().unwrap().alive == Some(self.generation)
    }

    async fn close(&self) -> Result<(), AppError> {
        let hang = {
            let mut log = self.log.lock().unwrap();
            if log.alive == Some(self.generation) {
                log.alive = None;
                log.processes_closed += 1;
            }
            log.hang_close
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

pub struct MockPage {
    log: Arc<Mutex<BrowserLog>>,
}

impl Page for MockPage {
    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        let (delay, fail) = {
            let mut log = self.log.lock().unwrap();
            log.visited.push(url.to_string());
            (log.navigate_delay, log.fail_navigation)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(AppError::extraction(url, "net::ERR_NAME_NOT_RESOLVED"));
        }
        Ok(())
    }

    async fn wait_for_selector(&self, _selector: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn content(&self) -> Result<String, AppError> {
        Ok("<html><body><ul class=\"status\"></ul></body></html>".to_string())
    }

    async fn close(&self) -> Result<(), AppError> {
        let mut log = self.log.lock().unwrap();
        log.pages_closed += 1;
        log.open_pages = log.open_pages.saturating_sub(1);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockJob
// ---------------------------------------------------------------------------

/// Extraction job returning canned tube line records.
#[derive(Clone)]
pub struct MockJob {
    records: Vec<TubeLineStatus>,
    error: Option<String>,
}

impl MockJob {
    pub fn lines(n: usize) -> Self {
        Self {
            records: tube_line_records(n),
            error: None,
        }
    }

    pub fn failing(cause: &str) -> Self {
        Self {
            records: vec![],
            error: Some(cause.to_string()),
        }
    }
}

impl ExtractionJob for MockJob {
    type Record = TubeLineStatus;

    fn name(&self) -> &str {
        "mock"
    }

    fn target(&self) -> PageTarget {
        PageTarget::new("https://example.com/status").wait_for("ul.status")
    }

    async fn run<P: Page>(&self, page: &P) -> Result<Vec<TubeLineStatus>, AppError> {
        page.content().await?;
        match &self.error {
            Some(cause) => Err(AppError::extraction("https://example.com/status", cause)),
            None => Ok(self.records.clone()),
        }
    }

    fn fixture(&self) -> Vec<TubeLineStatus> {
        self.records.clone()
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

struct SourceLog {
    results: VecDeque<Result<Records, AppError>>,
    fallback: Records,
    delay: Duration,
    polls: usize,
    max_concurrent: usize,
}

/// Panel source that counts polls and concurrent polls.
#[derive(Clone)]
pub struct MockSource {
    log: Arc<Mutex<SourceLog>>,
    in_flight: Arc<AtomicUsize>,
}

impl MockSource {
    /// Always succeeds with `records`.
    pub fn new(records: Records) -> Self {
        Self::build(VecDeque::new(), records)
    }

    /// Pops one result per poll; succeeds with no records once exhausted.
    pub fn with_results(results: Vec<Result<Records, AppError>>) -> Self {
        Self::build(results.into(), tube_lines(0))
    }

    fn build(results: VecDeque<Result<Records, AppError>>, fallback: Records) -> Self {
        Self {
            log: Arc::new(Mutex::new(SourceLog {
                results,
                fallback,
                delay: Duration::ZERO,
                polls: 0,
                max_concurrent: 0,
            })),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.log.lock().unwrap().delay = delay;
        self
    }

    pub fn polls(&self) -> usize {
        self.log.lock().unwrap().polls
    }

    pub fn max_concurrent(&self) -> usize {
        self.log.lock().unwrap().max_concurrent
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PanelSource for MockSource {
    fn poll(&self) -> BoxFuture<'_, Result<Records, AppError>> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlight(Arc::clone(&self.in_flight));

            let (delay, result) = {
                let mut log = self.log.lock().unwrap();
                log.polls += 1;
                log.max_concurrent = log.max_concurrent.max(now);
                let result = log
                    .results
                    .pop_front()
                    .unwrap_or_else(|| Ok(log.fallback.clone()));
                (log.delay, result)
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

// ---------------------------------------------------------------------------
// MockResource / MockReporter
// ---------------------------------------------------------------------------

/// Managed resource counting reap and release calls.
#[derive(Clone)]
pub struct MockResource {
    name: String,
    reaps: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl MockResource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reaps: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn reaps(&self) -> usize {
        self.reaps.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl ManagedResource for MockResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn reap_idle(&self) -> BoxFuture<'_, bool> {
        self.reaps.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { false })
    }

    fn release(&self) -> BoxFuture<'_, ()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    }
}

/// Reporter recording event names.
#[derive(Clone, Default)]
pub struct MockReporter {
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == name)
            .count()
    }
}

impl PanelReporter for MockReporter {
    fn report(&self, event: PanelEvent<'_>) {
        let name = match event {
            PanelEvent::Started { .. } => "started",
            PanelEvent::PollStarted { .. } => "poll_started",
            PanelEvent::PollSucceeded { .. } => "poll_succeeded",
            PanelEvent::PollFailed { .. } => "poll_failed",
            PanelEvent::RefreshIgnored { .. } => "refresh_ignored",
            PanelEvent::Stopped { .. } => "stopped",
        };
        self.events.lock().unwrap().push(name);
    }
}

// ---------------------------------------------------------------------------
// Media mocks
// ---------------------------------------------------------------------------

/// Clip source that writes a small placeholder video.
#[derive(Clone, Default)]
pub struct MockClipSource {
    fetches: Arc<AtomicUsize>,
    fail: bool,
    hang: bool,
}

impl MockClipSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every fetch stays pending forever.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ClipSource for MockClipSource {
    async fn fetch(&self, dest_dir: &Path, stem: &str) -> Result<PathBuf, AppError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::TranscodeFailed("yt-dlp exited with status 1".into()));
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        let path = dest_dir.join(format!("{stem}.mp4"));
        tokio::fs::write(&path, b"source video").await?;
        Ok(path)
    }
}

#[derive(Default)]
struct TranscodeLog {
    trims: usize,
    last_trim_window: Option<Duration>,
    extracted_from: Vec<PathBuf>,
}

/// Transcoder that copies clips and writes `frame_count` placeholder stills.
#[derive(Clone)]
pub struct MockTranscoder {
    frame_count: usize,
    fail_trim: bool,
    fail_extract: bool,
    log: Arc<Mutex<TranscodeLog>>,
}

impl MockTranscoder {
    pub fn new(frame_count: usize) -> Self {
        Self {
            frame_count,
            fail_trim: false,
            fail_extract: false,
            log: Arc::new(Mutex::new(TranscodeLog::default())),
        }
    }

    pub fn with_failing_trim(mut self) -> Self {
        self.fail_trim = true;
        self
    }

    pub fn with_failing_extract(mut self) -> Self {
        self.fail_extract = true;
        self
    }

    pub fn trims(&self) -> usize {
        self.log.lock().unwrap().trims
    }

    pub fn last_trim_window(&self) -> Option<Duration> {
        self.log.lock().unwrap().last_trim_window
    }

    pub fn extracted_from(&self) -> Vec<PathBuf> {
        self.log.lock().unwrap().extracted_from.clone()
    }
}

impl Transcoder for MockTranscoder {
    async fn trim(&self, input: &Path, output: &Path, window: Duration) -> Result<(), AppError> {
        {
            let mut log = self.log.lock().unwrap();
            log.trims += 1;
            log.last_trim_window = Some(window);
        }
        if self.fail_trim {
            return Err(AppError::TranscodeFailed("ffmpeg exited with status 1".into()));
        }
        tokio::fs::copy(input, output).await?;
        Ok(())
    }

    async fn extract_frames(
        &self,
        input: &Path,
        out_dir: &Path,
        _spec: FrameSpec,
    ) -> Result<(), AppError> {
        self.log
            .lock()
            .unwrap()
            .extracted_from
            .push(input.to_path_buf());
        if self.fail_extract {
            return Err(AppError::TranscodeFailed("ffmpeg exited with status 1".into()));
        }
        for i in 1..=self.frame_count {
            tokio::fs::write(out_dir.join(format!("frame-{i:04}.png")), b"png").await?;
        }
        Ok(())
    }
}

/// Decoder returning an all-white grid, optionally failing on one file name.
#[derive(Clone, Default)]
pub struct MockDecoder {
    fail_on: Option<String>,
}

impl MockDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.fail_on = Some(file_name.to_string());
        self
    }
}

impl FrameDecoder for MockDecoder {
    fn decode_resized(&self, path: &Path, width: u32, height: u32) -> Result<PixelGrid, AppError> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if self.fail_on.as_deref() == Some(name) {
            return Err(AppError::DecodeFailed {
                path: path.display().to_string(),
                cause: "truncated PNG".into(),
            });
        }
        PixelGrid::new(
            width,
            height,
            vec![[255, 255, 255]; width as usize * height as usize],
        )
        .ok_or_else(|| AppError::DecodeFailed {
            path: path.display().to_string(),
            cause: "bad dimensions".into(),
        })
    }
}
