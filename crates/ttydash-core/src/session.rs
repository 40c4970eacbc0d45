//! Lifecycle of the single shared browser process.
//!
//! A [`ResourceSession`] launches the browser lazily, hands out page-scoped
//! access through [`ResourceSession::with_page`], relaunches after a crash,
//! and closes the process when released or idle.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use crate::backoff::{BackoffConfig, LaunchBackoff};
use crate::error::AppError;
use crate::traits::{BrowserDriver, BrowserProcess, ExtractionJob, Page, PageTarget};

/// Upper bound on closing a page after extraction.
const PAGE_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on terminating the browser process.
const PROCESS_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on opening a page, and separately on navigation, readiness
    /// wait, settle delay and extraction.
    pub page_timeout: Duration,
    /// Bound on starting the browser process.
    pub launch_timeout: Duration,
    /// Close the process after this long without an open page. `None` disables.
    pub idle_timeout: Option<Duration>,
    /// Concurrent pages allowed on the process.
    pub max_pages: usize,
    pub backoff: BackoffConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(30),
            launch_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_pages: 1,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Shared reference to a live browser process.
pub type SessionHandle<P> = Arc<P>;

enum SessionState<P> {
    Idle,
    Live {
        process: Arc<P>,
        last_used: Instant,
    },
    Closed,
}

/// Decrements the open-page counter when a page scope ends, including when
/// the enclosing future is dropped mid-extraction.
struct OpenPage<'a>(&'a AtomicUsize);

impl<'a> OpenPage<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for OpenPage<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ResourceSession<D: BrowserDriver> {
    id: String,
    driver: D,
    config: SessionConfig,
    state: Mutex<SessionState<D::Process>>,
    backoff: LaunchBackoff,
    page_gate: Semaphore,
    open_pages: AtomicUsize,
}

impl<D: BrowserDriver> ResourceSession<D> {
    pub fn new(driver: D, config: SessionConfig) -> Self {
        let id = format!("browser-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        Self {
            backoff: LaunchBackoff::new(id.clone(), config.backoff.clone()),
            page_gate: Semaphore::new(config.max_pages.max(1)),
            id,
            driver,
            config,
            state: Mutex::new(SessionState::Idle),
            open_pages: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns true if a process is running and responsive.
    pub async fn is_live(&self) -> bool {
        matches!(&*self.state.lock().await, SessionState::Live { process, .. } if process.is_alive())
    }

    pub async fn is_closed(&self) -> bool {
        matches!(&*self.state.lock().await, SessionState::Closed)
    }

    /// Return the live process, launching one if none is running or the
    /// previous one died.
    pub async fn acquire(&self) -> Result<SessionHandle<D::Process>, AppError> {
        let mut state = self.state.lock().await;

        match &mut *state {
            SessionState::Closed => return Err(AppError::SessionClosed),
            SessionState::Live { process, last_used } if process.is_alive() => {
                *last_used = Instant::now();
                return Ok(Arc::clone(process));
            }
            SessionState::Live { process, .. } => {
                tracing::warn!(session = %self.id, "Browser process is gone, relaunching");
                self.close_process(process).await;
                *state = SessionState::Idle;
            }
            SessionState::Idle => {}
        }

        self.backoff.check()?;

        tracing::info!(session = %self.id, "Launching browser");
        let limit = self.config.launch_timeout;
        let launched = tokio::time::timeout(limit, self.driver.launch())
            .await
            .unwrap_or(Err(AppError::Timeout(limit.as_secs())));
        match launched {
            Ok(process) => {
                self.backoff.record_success();
                let process = Arc::new(process);
                *state = SessionState::Live {
                    process: Arc::clone(&process),
                    last_used: Instant::now(),
                };
                Ok(process)
            }
            Err(e) => {
                self.backoff.record_failure(&e);
                Err(match e {
                    AppError::LaunchFailed(_) => e,
                    other => AppError::LaunchFailed(other.to_string()),
                })
            }
        }
    }

    /// Run `job` against a fresh page.
    ///
    /// The page is closed on every exit path. Page open, navigation,
    /// readiness, extractor and timeout failures are all reported as
    /// [`AppError::ExtractionFailed`]; launch failures pass through as
    /// [`AppError::LaunchFailed`]. A process that cannot open a page is
    /// discarded so the next call relaunches.
    pub async fn with_page<J: ExtractionJob>(&self, job: &J) -> Result<Vec<J::Record>, AppError> {
        let target = job.target();

        let _permit = self
            .page_gate
            .acquire()
            .await
            .map_err(|_| AppError::SessionClosed)?;
        let _open = OpenPage::enter(&self.open_pages);

        let process = self.acquire().await?;
        let timeout = self.config.page_timeout;
        let page = match tokio::time::timeout(timeout, process.new_page()).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                if e.is_session_fatal() {
                    self.discard(&process).await;
                }
                return Err(into_extraction(&target.url, e));
            }
            Err(_) => {
                self.discard(&process).await;
                return Err(AppError::extraction(
                    &target.url,
                    format!("opening a page timed out after {}s", timeout.as_secs()),
                ));
            }
        };

        tracing::debug!(session = %self.id, job = job.name(), url = %target.url, "Page opened");

        let result = match tokio::time::timeout(timeout, drive_page(&page, job, &target)).await {
            Ok(Ok(records)) => Ok(records),
            Ok(Err(e)) => Err(into_extraction(&target.url, e)),
            Err(_) => Err(AppError::extraction(
                &target.url,
                format!("timed out after {}s", timeout.as_secs()),
            )),
        };

        match tokio::time::timeout(PAGE_CLOSE_TIMEOUT, page.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(session = %self.id, error = %e, "Page close failed"),
            Err(_) => tracing::debug!(session = %self.id, "Page close timed out"),
        }

        self.touch().await;
        result
    }

    async fn touch(&self) {
        if let SessionState::Live { last_used, .. } = &mut *self.state.lock().await {
            *last_used = Instant::now();
        }
    }

    /// Drop `process` if it is still the live one, so the next call relaunches.
    async fn discard(&self, process: &Arc<D::Process>) {
        {
            let mut state = self.state.lock().await;
            let current = matches!(
                &*state,
                SessionState::Live { process: live, .. } if Arc::ptr_eq(live, process)
            );
            if !current {
                return;
            }
            *state = SessionState::Idle;
        }
        tracing::warn!(session = %self.id, "Browser cannot open pages, discarding it");
        self.close_process(process).await;
    }

    /// Close `process` within [`PROCESS_CLOSE_TIMEOUT`]. Returns true on a
    /// clean close.
    async fn close_process(&self, process: &D::Process) -> bool {
        match tokio::time::timeout(PROCESS_CLOSE_TIMEOUT, process.close()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(session = %self.id, error = %e, "Browser close failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    session = %self.id,
                    timeout_secs = PROCESS_CLOSE_TIMEOUT.as_secs(),
                    "Browser close timed out"
                );
                false
            }
        }
    }

    /// Terminate the process and mark the session closed. Idempotent.
    pub async fn release(&self) {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, SessionState::Closed)
        };
        self.page_gate.close();

        if let SessionState::Live { process, .. } = previous
            && self.close_process(&process).await
        {
            tracing::info!(session = %self.id, "Browser closed");
        }
    }

    /// Close a live process that has had no open page for longer than the
    /// idle timeout. Returns true if a process was closed.
    pub async fn reap_idle(&self) -> bool {
        let Some(idle_timeout) = self.config.idle_timeout else {
            return false;
        };

        let process = {
            let mut state = self.state.lock().await;
            let idle = matches!(
                &*state,
                SessionState::Live { last_used, .. } if last_used.elapsed() >= idle_timeout
            );
            if !idle || self.open_pages.load(Ordering::SeqCst) > 0 {
                return false;
            }
            match std::mem::replace(&mut *state, SessionState::Idle) {
                SessionState::Live { process, .. } => process,
                _ => return false,
            }
        };

        tracing::info!(
            session = %self.id,
            idle_secs = idle_timeout.as_secs(),
            "Closing idle browser"
        );
        self.close_process(&process).await;
        true
    }
}

async fn drive_page<P: Page, J: ExtractionJob>(
    page: &P,
    job: &J,
    target: &PageTarget,
) -> Result<Vec<J::Record>, AppError> {
    page.navigate(&target.url).await?;
    if let Some(selector) = &target.ready_selector {
        page.wait_for_selector(selector).await?;
    }
    if !target.settle.is_zero() {
        tokio::time::sleep(target.settle).await;
    }
    job.run(page).await
}

fn into_extraction(url: &str, error: AppError) -> AppError {
    match error {
        AppError::ExtractionFailed { .. } => error,
        other => AppError::extraction(url, other),
    }
}

/// Object-safe view of a long-lived resource owned by the coordinator.
pub trait ManagedResource: Send + Sync {
    fn name(&self) -> &str;

    /// Close the underlying process if it has been idle too long.
    fn reap_idle(&self) -> BoxFuture<'_, bool>;

    fn release(&self) -> BoxFuture<'_, ()>;
}

impl<D: BrowserDriver> ManagedResource for ResourceSession<D> {
    fn name(&self) -> &str {
        self.id()
    }

    fn reap_idle(&self) -> BoxFuture<'_, bool> {
        Box::pin(ResourceSession::reap_idle(self))
    }

    fn release(&self) -> BoxFuture<'_, ()> {
        Box::pin(ResourceSession::release(self))
    }
}
