//! TfL tube, DLR and Overground status page.

use std::time::Duration;

use scraper::{ElementRef, Html};
use ttydash_core::error::AppError;
use ttydash_core::models::{StationStatus, TubeLineStatus};
use ttydash_core::traits::{ExtractionJob, Page, PageTarget};

use super::{first_text, selector, text_of};

pub const TFL_STATUS_URL: &str = "https://tfl.gov.uk/tube-dlr-overground/status";

const LINES_CONTAINER: &str = ".disruptions-list";
const STATIONS_CONTAINER: &str = ".station-disruptions-list";
const ENTRY: &str = r#"[data-testid="headles-accordion-root-testid"]"#;

/// The status page is a client-rendered app that keeps filling in after the
/// container appears.
const SETTLE: Duration = Duration::from_secs(2);

/// One accordion entry, shared by the line and station lists.
struct AccordionEntry {
    name: String,
    severity: String,
    routes: Vec<String>,
    description: String,
}

fn parse_accordions(html: &str, container: &str) -> Result<Vec<AccordionEntry>, AppError> {
    let entries = selector(TFL_STATUS_URL, &format!("{container} {ENTRY}"))?;
    let name = selector(TFL_STATUS_URL, r#"[data-testid="accordion-name"]"#)?;
    let severity = selector(TFL_STATUS_URL, r#"[data-testid="line-status"]"#)?;
    let route = selector(TFL_STATUS_URL, r#"[data-testid="line-affected-route"]"#)?;
    let direction = selector(TFL_STATUS_URL, r#"[data-test-id="directionInfo"]"#)?;
    let panel = selector(TFL_STATUS_URL, r#"[data-testid="accordion-panel"]"#)?;

    let document = Html::parse_document(html);
    let parsed = document
        .select(&entries)
        .map(|entry| AccordionEntry {
            name: first_text(entry, &name).unwrap_or_default(),
            severity: first_text(entry, &severity).unwrap_or_default(),
            routes: entry
                .select(&route)
                .map(|r| match r.select(&direction).next() {
                    Some(info) => direction_endpoints(info),
                    None => text_of(r),
                })
                .collect(),
            description: first_text(entry, &panel).unwrap_or_default(),
        })
        .collect();
    Ok(parsed)
}

/// Joins the direct text nodes of a direction paragraph, skipping the
/// decorative arrow span between them.
fn direction_endpoints(info: ElementRef<'_>) -> String {
    info.children()
        .filter_map(|node| node.value().as_text())
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ↔ ")
}

pub fn parse_tube_lines(html: &str) -> Result<Vec<TubeLineStatus>, AppError> {
    Ok(parse_accordions(html, LINES_CONTAINER)?
        .into_iter()
        .map(|e| TubeLineStatus {
            line_name: e.name,
            status_severity: e.severity,
            affected_routes: e.routes,
            description: e.description,
        })
        .collect())
}

pub fn parse_station_statuses(html: &str) -> Result<Vec<StationStatus>, AppError> {
    Ok(parse_accordions(html, STATIONS_CONTAINER)?
        .into_iter()
        .map(|e| StationStatus {
            station_name: e.name,
            status_severity: e.severity,
            affected_routes: e.routes,
            description: e.description,
        })
        .collect())
}

/// Disrupted tube lines. Lines with a good service are not listed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TubeStatusJob;

impl ExtractionJob for TubeStatusJob {
    type Record = TubeLineStatus;

    fn name(&self) -> &str {
        "tfl"
    }

    fn target(&self) -> PageTarget {
        PageTarget::new(TFL_STATUS_URL)
            .wait_for(LINES_CONTAINER)
            .with_settle(SETTLE)
    }

    async fn run<P: Page>(&self, page: &P) -> Result<Vec<TubeLineStatus>, AppError> {
        let html = page.content().await?;
        parse_tube_lines(&html)
    }

    fn fixture(&self) -> Vec<TubeLineStatus> {
        vec![
            TubeLineStatus {
                line_name: "DLR".into(),
                status_severity: "Minor delays".into(),
                affected_routes: vec![
                    "Poplar ↔ Tower Gateway".into(),
                    "Canary Wharf ↔ Bank".into(),
                    "West India Quay ↔ Canary Wharf".into(),
                ],
                description: "DLR: Minor delays due to an earlier signal failure.".into(),
            },
            TubeLineStatus {
                line_name: "Victoria".into(),
                status_severity: "Severe delays".into(),
                affected_routes: vec!["Entire line".into()],
                description: "Victoria Line: Severe delays due to an earlier points failure at \
                    Walthamstow Central. London Buses, London Overground, Great Northern, \
                    Thameslink, Greater Anglia, South Western Railway and Southeastern are \
                    accepting tickets via any reasonable route."
                    .into(),
            },
        ]
    }
}

/// Stations with closures or access issues, from the same page.
#[derive(Debug, Clone, Copy, Default)]
pub struct StationStatusJob;

impl ExtractionJob for StationStatusJob {
    type Record = StationStatus;

    fn name(&self) -> &str {
        "stations"
    }

    fn target(&self) -> PageTarget {
        PageTarget::new(TFL_STATUS_URL)
            .wait_for(STATIONS_CONTAINER)
            .with_settle(SETTLE)
    }

    async fn run<P: Page>(&self, page: &P) -> Result<Vec<StationStatus>, AppError> {
        let html = page.content().await?;
        parse_station_statuses(&html)
    }

    fn fixture(&self) -> Vec<StationStatus> {
        vec![StationStatus {
            station_name: "Bank".into(),
            status_severity: "Part closure".into(),
            affected_routes: vec!["Bank ↔ Monument".into()],
            description: "Bank Station: The interchange between the Central line and the \
                Northern line is closed. Please use Monument station instead."
                .into(),
        }]
    }
}
