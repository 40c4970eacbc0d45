use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use ttydash_core::error::AppError;
use ttydash_core::traits::{BrowserDriver, BrowserProcess, Page};

/// Interval between selector probes while waiting for a page to render.
const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Launches headless Chromium over the Chrome DevTools Protocol.
///
/// Each [`BrowserDriver::launch`] starts one Chromium process; the
/// [`ResourceSession`](ttydash_core::session::ResourceSession) owning the
/// driver decides when to launch, reuse and close it.
///
/// # Example
///
/// ```rust,no_run
/// use ttydash_client::{ChromiumDriver, TubeStatusJob};
/// use ttydash_core::session::{ResourceSession, SessionConfig};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let session = ResourceSession::new(ChromiumDriver::new(None), SessionConfig::default());
/// let lines = session.with_page(&TubeStatusJob).await?;
/// println!("{} disrupted lines", lines.len());
/// session.release().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChromiumDriver {
    chrome_bin: Option<PathBuf>,
}

impl ChromiumDriver {
    /// `chrome_bin` overrides binary discovery.
    pub fn new(chrome_bin: Option<PathBuf>) -> Self {
        Self { chrome_bin }
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// On systems where Chromium is installed via **snap**, the wrapper at
    /// `/snap/bin/chromium` strips unknown CLI flags, breaking headless mode.
    /// We look for the real binary inside the snap first, then fall back to
    /// well-known system paths. If nothing is found we return `None` and let
    /// `chromiumoxide` do its own lookup.
    fn find_chrome_binary(preferred: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = preferred {
            if path.exists() {
                return Some(path.to_path_buf());
            }
            tracing::warn!(path = %path.display(), "CHROME_BIN does not exist, searching defaults");
        }

        let candidates: &[&str] = &[
            // Snap (Ubuntu default)
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            // Flatpak
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            // Common apt / manual installs
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];

        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }

    fn config(&self) -> Result<BrowserConfig, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        if let Some(bin) = Self::find_chrome_binary(self.chrome_bin.as_deref()) {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run")
            .arg("--mute-audio")
            .build()
            .map_err(|e| AppError::LaunchFailed(format!("browser config error: {e}")))
    }
}

impl BrowserDriver for ChromiumDriver {
    type Process = ChromiumProcess;

    async fn launch(&self) -> Result<ChromiumProcess, AppError> {
        let config = self.config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::LaunchFailed(e.to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));

        // The CDP handler must be polled continuously for the connection to
        // work. The stream ends when the websocket drops.
        let handler_task = {
            let alive = Arc::clone(&alive);
            tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        tracing::debug!(error = %e, "Browser CDP handler error");
                    }
                }
                tracing::info!("Browser connection closed");
                alive.store(false, Ordering::SeqCst);
            })
        };

        Ok(ChromiumProcess {
            browser: Mutex::new(browser),
            alive,
            handler_task,
        })
    }
}

/// A running Chromium process and its CDP connection.
pub struct ChromiumProcess {
    browser: Mutex<Browser>,
    alive: Arc<AtomicBool>,
    handler_task: JoinHandle<()>,
}

impl BrowserProcess for ChromiumProcess {
    type Page = ChromiumPage;

    async fn new_page(&self) -> Result<ChromiumPage, AppError> {
        if !self.is_alive() {
            return Err(AppError::SessionClosed);
        }
        let browser = self.browser.lock().await;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::extraction("about:blank", format!("failed to open tab: {e}")))?;
        Ok(ChromiumPage {
            page,
            url: std::sync::Mutex::new("about:blank".to_string()),
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.handler_task.is_finished()
    }

    async fn close(&self) -> Result<(), AppError> {
        self.alive.store(false, Ordering::SeqCst);
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await;
        if let Err(e) = browser.wait().await {
            tracing::debug!(error = %e, "Waiting for browser exit failed");
        }
        self.handler_task.abort();
        closed
            .map(|_| ())
            .map_err(|e| AppError::LaunchFailed(format!("browser close failed: {e}")))
    }
}

impl Drop for ChromiumProcess {
    // A close abandoned on timeout never reaches the abort in `close`.
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// One Chromium tab.
pub struct ChromiumPage {
    page: chromiumoxide::Page,
    /// Last navigation target, for error messages.
    url: std::sync::Mutex<String>,
}

impl ChromiumPage {
    fn url(&self) -> String {
        self.url
            .lock()
            .map(|u| u.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl Page for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        if let Ok(mut current) = self.url.lock() {
            *current = url.to_string();
        }
        self.page
            .goto(url)
            .await
            .map_err(|e| AppError::extraction(url, format!("navigation failed: {e}")))?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<(), AppError> {
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn content(&self) -> Result<String, AppError> {
        self.page
            .content()
            .await
            .map_err(|e| AppError::extraction(self.url(), format!("failed to read page content: {e}")))
    }

    async fn close(&self) -> Result<(), AppError> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| AppError::extraction(self.url(), format!("failed to close tab: {e}")))
    }
}
