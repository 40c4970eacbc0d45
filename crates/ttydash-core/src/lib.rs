pub mod backoff;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod media;
pub mod models;
pub mod panel;
pub mod session;
pub mod source;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use config::DashboardConfig;
pub use dashboard::{CoordinatorConfig, DashboardCoordinator, PanelSpec};
pub use error::AppError;
pub use models::{
    Payload, Records, SpoonsPub, StationStatus, TrainDeparture, TubeLineStatus, compute_hash,
};
pub use panel::{PanelConfig, PanelSnapshot, TracingPanelReporter};
pub use session::{ManagedResource, ResourceSession, SessionConfig};
pub use source::{FixtureSource, LiveSource, PanelSource};
pub use traits::{
    BrowserDriver, BrowserProcess, ClipSource, ExtractionJob, FrameDecoder, FrameSpec, Page,
    PageTarget, PixelGrid, Transcoder,
};
