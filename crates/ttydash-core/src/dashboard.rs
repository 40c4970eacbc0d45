//! Owns every panel scheduler and the shared resources behind them.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::panel::{PanelConfig, PanelHandle, PanelReporter, PanelScheduler, PanelSnapshot};
use crate::session::ManagedResource;
use crate::source::PanelSource;

/// A panel to register with the coordinator.
pub struct PanelSpec {
    pub config: PanelConfig,
    pub source: Arc<dyn PanelSource>,
}

impl PanelSpec {
    pub fn new(config: PanelConfig, source: Arc<dyn PanelSource>) -> Self {
        Self { config, source }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How often shared resources are asked to close idle processes.
    pub reap_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            reap_interval: Duration::from_secs(60),
        }
    }
}

pub struct DashboardCoordinator {
    panels: Vec<PanelHandle>,
    resources: Vec<Arc<dyn ManagedResource>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DashboardCoordinator {
    /// Spawn one scheduler per panel plus the idle reaper.
    pub fn start(
        panels: Vec<PanelSpec>,
        resources: Vec<Arc<dyn ManagedResource>>,
        reporter: Arc<dyn PanelReporter>,
        config: CoordinatorConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(panels.len());
        let mut tasks = Vec::with_capacity(panels.len() + 1);

        for spec in panels {
            let scheduler = PanelScheduler::new(spec.config, spec.source, Arc::clone(&reporter));
            let (handle, task) = scheduler.spawn(cancel.child_token());
            handles.push(handle);
            tasks.push(task);
        }

        if !resources.is_empty() {
            tasks.push(tokio::spawn(reap_idle_resources(
                resources.clone(),
                config.reap_interval,
                cancel.child_token(),
            )));
        }

        tracing::info!(panels = handles.len(), resources = resources.len(), "Dashboard started");

        Self {
            panels: handles,
            resources,
            cancel,
            tasks,
        }
    }

    /// Every panel's current state, in registration order.
    pub fn snapshot(&self) -> Vec<PanelSnapshot> {
        self.panels.iter().map(PanelHandle::snapshot).collect()
    }

    pub fn panel(&self, id: &str) -> Option<&PanelHandle> {
        self.panels.iter().find(|p| p.id() == id)
    }

    /// Request an immediate poll of one panel. Returns false for an unknown id.
    pub fn refresh(&self, id: &str) -> bool {
        match self.panel(id) {
            Some(panel) => {
                panel.refresh();
                true
            }
            None => false,
        }
    }

    pub fn refresh_all(&self) {
        for panel in &self.panels {
            panel.refresh();
        }
    }

    /// Cancel all schedulers, abort outstanding polls and release resources.
    /// Safe to call more than once.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Dashboard task ended abnormally");
            }
        }
        for resource in &self.resources {
            resource.release().await;
        }
        tracing::info!("Dashboard stopped");
    }
}

async fn reap_idle_resources(
    resources: Vec<Arc<dyn ManagedResource>>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for resource in &resources {
                    if resource.reap_idle().await {
                        tracing::debug!(resource = resource.name(), "Reaped idle resource");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::source::FixtureSource;
    use crate::testutil::{MockReporter, MockResource, MockSource, tube_lines};

    fn spec(id: &str, source: Arc<dyn PanelSource>) -> PanelSpec {
        PanelSpec::new(
            PanelConfig::new(id, id.to_uppercase(), Duration::from_secs(60))
                .with_tick(Duration::from_secs(1)),
            source,
        )
    }

    fn start(panels: Vec<PanelSpec>, resources: Vec<Arc<dyn ManagedResource>>) -> DashboardCoordinator {
        DashboardCoordinator::start(
            panels,
            resources,
            Arc::new(MockReporter::new()),
            CoordinatorConfig {
                reap_interval: Duration::from_secs(30),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_in_registration_order() {
        let mut dashboard = start(
            vec![
                spec("tfl", Arc::new(FixtureSource::new(tube_lines(2)))),
                spec("rail", Arc::new(FixtureSource::new(tube_lines(1)))),
                spec("pubs", Arc::new(FixtureSource::new(tube_lines(3)))),
            ],
            vec![],
        );

        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = dashboard.snapshot();
        let ids: Vec<_> = snapshot.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["tfl", "rail", "pubs"]);
        assert_eq!(snapshot[0].records(), Some(&tube_lines(2)));
        assert_eq!(snapshot[2].records(), Some(&tube_lines(3)));

        dashboard.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_does_not_wait_for_slow_poll() {
        let slow = MockSource::new(tube_lines(1)).with_delay(Duration::from_secs(120));
        let mut dashboard = start(vec![spec("tfl", Arc::new(slow))], vec![]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = dashboard.snapshot();
        assert!(snapshot[0].is_loading);
        assert!(snapshot[0].payload.is_none());

        dashboard.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_routes_by_id() {
        let tfl = MockSource::new(tube_lines(1));
        let rail = MockSource::new(tube_lines(1));
        let mut dashboard = start(
            vec![spec("tfl", Arc::new(tfl.clone())), spec("rail", Arc::new(rail.clone()))],
            vec![],
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(dashboard.refresh("rail"));
        assert!(!dashboard.refresh("weather"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(tfl.polls(), 1);
        assert_eq!(rail.polls(), 2);

        dashboard.refresh_all();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(tfl.polls(), 2);
        assert_eq!(rail.polls(), 3);

        dashboard.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_stay_inside_panel() {
        let failing = MockSource::with_results(vec![Err(AppError::LaunchFailed("no chrome".into()))]);
        let mut dashboard = start(
            vec![
                spec("tfl", Arc::new(failing)),
                spec("rail", Arc::new(FixtureSource::new(tube_lines(1)))),
            ],
            vec![],
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = dashboard.snapshot();
        assert!(snapshot[0].last_error.as_deref().unwrap().contains("no chrome"));
        assert!(snapshot[1].last_error.is_none());
        assert!(snapshot[1].payload.is_some());

        dashboard.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_polls_and_releases_resources() {
        let slow = MockSource::new(tube_lines(1)).with_delay(Duration::from_secs(600));
        let resource = MockResource::new("browser");
        let mut dashboard = start(
            vec![spec("tfl", Arc::new(slow.clone()))],
            vec![Arc::new(resource.clone())],
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(slow.in_flight(), 1);

        dashboard.stop().await;
        dashboard.stop().await;

        assert_eq!(slow.in_flight(), 0);
        assert!(resource.releases() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_asks_resources_periodically() {
        let resource = MockResource::new("browser");
        let mut dashboard = start(vec![], vec![Arc::new(resource.clone())]);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(resource.reaps(), 3);

        dashboard.stop().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(resource.reaps(), 3);
        assert_eq!(resource.releases(), 1);
    }
}
