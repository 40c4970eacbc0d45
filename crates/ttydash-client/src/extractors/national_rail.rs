//! National Rail live departure board.

use std::time::Duration;

use scraper::Html;
use ttydash_core::error::AppError;
use ttydash_core::models::TrainDeparture;
use ttydash_core::traits::{ExtractionJob, Page, PageTarget};

use super::{first_text, selector, text_of};

const DEPARTURES_BASE_URL: &str = "https://www.nationalrail.co.uk/live-trains/departures";

// The board is a styled-components app; these generated class names are the
// only stable hooks it exposes.
const BOARD: &str = "ul.sc-f6950b8f-0";
const ROW: &str = "ul.sc-f6950b8f-0 > li";
const SCHEDULED: &str = ".sc-68d26c6b-1.hobgaI";
const STATUS: &str = ".sc-68d26c6b-2.hRMAvd, .sc-68d26c6b-2.fSGVGZ";
const DELAYED_CLASS: &str = "hRMAvd";
const DESTINATION: &str = "h3.sc-e490da6-0 .sc-e490da6-4";
const CALLING_AT: &str = "h4.sc-68d26c6b-7";
const PLATFORM: &str = ".sc-68d26c6b-5.MAkdk";
const META: &str = ".sc-dccf2f8a-1.hAgctT";
const DELAY_REASON: &str = ".sc-68d26c6b-17.lnzdlv";

const SETTLE: Duration = Duration::from_secs(2);

/// Departures from one station, identified by its URL slug (e.g. `putney`).
#[derive(Debug, Clone)]
pub struct DeparturesJob {
    station: String,
}

impl DeparturesJob {
    pub fn new(station: impl Into<String>) -> Self {
        Self {
            station: station.into(),
        }
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn url(&self) -> String {
        format!("{DEPARTURES_BASE_URL}/{}", self.station)
    }
}

impl ExtractionJob for DeparturesJob {
    type Record = TrainDeparture;

    fn name(&self) -> &str {
        "rail"
    }

    fn target(&self) -> PageTarget {
        PageTarget::new(self.url()).wait_for(BOARD).with_settle(SETTLE)
    }

    async fn run<P: Page>(&self, page: &P) -> Result<Vec<TrainDeparture>, AppError> {
        let html = page.content().await?;
        parse_departures(&self.url(), &html)
    }

    fn fixture(&self) -> Vec<TrainDeparture> {
        const LATE: &str = "This service is running late";
        vec![
            fixture_row("09:59", "10:00", "London Waterloo", "WAT", "1", "17m", "5 stops", Some(LATE)),
            fixture_row("10:04", "10:04", "London Waterloo", "WAT", "2", "17m", "3 stops", None),
            fixture_row("10:08", "10:09", "London Waterloo", "WAT", "1", "21m", "5 stops", Some(LATE)),
            fixture_row("10:08", "10:08", "Weybridge", "WYB", "3", "1h", "16 stops", None),
            fixture_row("10:14", "10:14", "London Waterloo", "WAT", "1", "16m", "4 stops", None),
            fixture_row("10:16", "10:16", "Kingston", "KNG", "3", "1h 3m", "18 stops", None),
            fixture_row("10:17", "10:17", "Windsor & Eton Riverside", "WNR", "4", "42m", "10 stops", None),
            fixture_row("10:22", "10:22", "London Waterloo", "WAT", "1", "17m", "4 stops", None),
            fixture_row(
                "10:29",
                "10:35",
                "London Waterloo",
                "WAT",
                "1",
                "17m",
                "5 stops",
                Some("This train has been delayed by the communication alarm being activated on a train"),
            ),
            fixture_row("10:34", "10:34", "London Waterloo", "WAT", "2", "15m", "3 stops", None),
        ]
    }
}

#[allow(clippy::too_many_arguments)]
fn fixture_row(
    scheduled: &str,
    expected: &str,
    destination: &str,
    code: &str,
    platform: &str,
    duration: &str,
    stops: &str,
    delay_reason: Option<&str>,
) -> TrainDeparture {
    let is_delayed = scheduled != expected;
    TrainDeparture {
        scheduled_time: scheduled.into(),
        expected_time: expected.into(),
        status: if is_delayed { "Delayed" } else { "On time" }.into(),
        destination: destination.into(),
        destination_code: code.into(),
        calling_at: "Putney".into(),
        platform: platform.into(),
        duration: duration.into(),
        stops: stops.into(),
        operator: "South Western Railway".into(),
        delay_reason: delay_reason.map(str::to_string),
        is_delayed,
    }
}

pub fn parse_departures(url: &str, html: &str) -> Result<Vec<TrainDeparture>, AppError> {
    let row = selector(url, ROW)?;
    let scheduled = selector(url, SCHEDULED)?;
    let status_sel = selector(url, STATUS)?;
    let destination_sel = selector(url, DESTINATION)?;
    let calling_at_sel = selector(url, CALLING_AT)?;
    let platform = selector(url, PLATFORM)?;
    let meta = selector(url, META)?;
    let delay_reason = selector(url, DELAY_REASON)?;

    let document = Html::parse_document(html);
    let departures = document
        .select(&row)
        .map(|li| {
            let scheduled_time = first_text(li, &scheduled).unwrap_or_default();

            let status_el = li.select(&status_sel).next();
            let status_text = status_el.map(text_of).unwrap_or_default();
            let is_delayed =
                status_el.is_some_and(|el| el.value().classes().any(|c| c == DELAYED_CLASS));
            let (expected_time, status) = match status_text.strip_prefix("Expected ") {
                Some(expected) => (expected.to_string(), "Delayed".to_string()),
                None => (scheduled_time.clone(), status_text),
            };

            let (destination, destination_code) =
                split_destination(&first_text(li, &destination_sel).unwrap_or_default());

            let calling_at = first_text(li, &calling_at_sel)
                .map(|t| t.replacen("Calling at ", "", 1))
                .unwrap_or_default();

            let (duration, stops, operator) = split_meta(li.select(&meta).map(text_of));

            TrainDeparture {
                scheduled_time,
                expected_time,
                status,
                destination,
                destination_code,
                calling_at,
                platform: first_text(li, &platform).unwrap_or_default(),
                duration,
                stops,
                operator,
                delay_reason: first_text(li, &delay_reason),
                is_delayed,
            }
        })
        .collect();
    Ok(departures)
}

/// `"London Waterloo (WAT)"` into name and three-letter code. Anything else
/// is returned whole with an empty code.
fn split_destination(full: &str) -> (String, String) {
    let split = full
        .strip_suffix(')')
        .and_then(|rest| rest.rsplit_once('('))
        .filter(|(name, code)| {
            !name.trim().is_empty() && code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
        });
    match split {
        Some((name, code)) => (name.trim().to_string(), code.to_string()),
        None => (full.to_string(), String::new()),
    }
}

/// The first meta entry is the journey duration; later entries mentioning
/// "stop" are the stop count and the rest is the operator.
fn split_meta(entries: impl Iterator<Item = String>) -> (String, String, String) {
    let (mut duration, mut stops, mut operator) = (String::new(), String::new(), String::new());
    for (i, text) in entries.enumerate() {
        if i == 0 {
            duration = text;
        } else if text.contains("stop") {
            stops = text;
        } else {
            operator = text;
        }
    }
    (duration, stops, operator)
}
