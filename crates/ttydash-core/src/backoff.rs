//! Launch backoff for the browser process.
//!
//! After a failed launch, further launch attempts are rejected until a
//! cooldown elapses. Each consecutive failure multiplies the cooldown,
//! capped at a maximum; a successful launch resets it.
//!
//! ```text
//! READY --[launch fails]--> COOLING (base) --[elapsed]--> READY
//!                               |                           |
//!                               +-- next failure: base * m  |
//! READY <--------------------[launch succeeds]--------------+
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Cooldown after the first failure.
    pub base_cooldown: Duration,

    /// Factor applied to the cooldown for each further consecutive failure.
    pub multiplier: f32,

    pub max_cooldown: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_cooldown: Duration::from_secs(5),
            multiplier: 2.0,
            max_cooldown: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Default)]
struct BackoffInner {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    last_error: Option<String>,
    cooldown: Duration,
}

/// Point-in-time view for logs and status lines.
#[derive(Debug, Clone)]
pub struct BackoffStats {
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub retry_after: Option<Duration>,
}

/// Thread-safe launch backoff shared by clones.
#[derive(Clone)]
pub struct LaunchBackoff {
    name: String,
    config: BackoffConfig,
    inner: Arc<Mutex<BackoffInner>>,
}

impl LaunchBackoff {
    pub fn new(name: impl Into<String>, config: BackoffConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(BackoffInner::default())),
        }
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, BackoffInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(backoff = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    fn remaining(inner: &BackoffInner) -> Option<Duration> {
        let last = inner.last_failure?;
        let elapsed = last.elapsed();
        (elapsed < inner.cooldown).then(|| inner.cooldown - elapsed)
    }

    /// Returns `Err(LaunchFailed)` while a cooldown is running.
    pub fn check(&self) -> Result<(), AppError> {
        let stats = self.stats();
        let Some(retry_after) = stats.retry_after else {
            return Ok(());
        };
        tracing::debug!(
            backoff = %self.name,
            failures = stats.consecutive_failures,
            retry_after_secs = retry_after.as_secs(),
            "Launch suppressed"
        );
        Err(AppError::LaunchFailed(format!(
            "{} relaunch suppressed for {}s after {} failure(s): {}",
            self.name,
            retry_after.as_secs().max(1),
            stats.consecutive_failures,
            stats.last_error.as_deref().unwrap_or("unknown error")
        )))
    }

    pub fn record_success(&self) {
        let mut inner = self.lock_inner();
        if inner.consecutive_failures > 0 {
            tracing::info!(
                backoff = %self.name,
                failures = inner.consecutive_failures,
                "Launch recovered, clearing backoff"
            );
        }
        *inner = BackoffInner::default();
    }

    pub fn record_failure(&self, error: &AppError) {
        if !error.should_back_off() {
            return;
        }
        let mut inner = self.lock_inner();
        inner.consecutive_failures += 1;
        inner.cooldown = if inner.consecutive_failures == 1 {
            self.config.base_cooldown
        } else {
            std::cmp::min(
                Duration::from_secs_f32(inner.cooldown.as_secs_f32() * self.config.multiplier),
                self.config.max_cooldown,
            )
        };
        inner.last_failure = Some(Instant::now());
        inner.last_error = Some(error.to_string());
        tracing::warn!(
            backoff = %self.name,
            failures = inner.consecutive_failures,
            cooldown_secs = inner.cooldown.as_secs(),
            error = %error,
            "Launch failed, backing off"
        );
    }

    pub fn stats(&self) -> BackoffStats {
        let inner = self.lock_inner();
        BackoffStats {
            consecutive_failures: inner.consecutive_failures,
            last_error: inner.last_error.clone(),
            retry_after: Self::remaining(&inner),
        }
    }
}
