//! Panel data sources.
//!
//! A [`PanelSource`] is what a panel scheduler polls. Live sources run an
//! [`ExtractionJob`] through the shared [`ResourceSession`]; fixture sources
//! return the job's deterministic test data without touching a browser.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::AppError;
use crate::models::{PanelRecord, Records};
use crate::session::ResourceSession;
use crate::traits::{BrowserDriver, ExtractionJob};

/// Something a panel can poll for fresh records.
pub trait PanelSource: Send + Sync + 'static {
    fn poll(&self) -> BoxFuture<'_, Result<Records, AppError>>;
}

/// Polls a job against the shared browser session.
pub struct LiveSource<D: BrowserDriver, J: ExtractionJob> {
    session: Arc<ResourceSession<D>>,
    job: J,
}

impl<D: BrowserDriver, J: ExtractionJob> LiveSource<D, J> {
    pub fn new(session: Arc<ResourceSession<D>>, job: J) -> Self {
        Self { session, job }
    }

    pub fn job(&self) -> &J {
        &self.job
    }
}

impl<D: BrowserDriver, J: ExtractionJob> PanelSource for LiveSource<D, J> {
    fn poll(&self) -> BoxFuture<'_, Result<Records, AppError>> {
        Box::pin(async move {
            let records = self.session.with_page(&self.job).await?;
            tracing::debug!(job = self.job.name(), count = records.len(), "Extracted records");
            Ok(J::Record::into_records(records))
        })
    }
}

/// Returns the same records on every poll.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    records: Records,
}

impl FixtureSource {
    pub fn new(records: Records) -> Self {
        Self { records }
    }

    /// Build from a job's fixture data.
    pub fn from_job<J: ExtractionJob>(job: &J) -> Self {
        Self::new(J::Record::into_records(job.fixture()))
    }
}

impl PanelSource for FixtureSource {
    fn poll(&self) -> BoxFuture<'_, Result<Records, AppError>> {
        Box::pin(async move { Ok(self.records.clone()) })
    }
}
