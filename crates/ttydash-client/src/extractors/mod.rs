//! Site-specific [`ExtractionJob`](ttydash_core::ExtractionJob) implementations.
//!
//! Each job reads the rendered DOM with `Page::content` and hands the HTML to a
//! pure `parse_*` function, so the selectors are testable without a browser.

pub mod national_rail;
pub mod spoons;
pub mod tfl;

use scraper::{ElementRef, Selector};
use ttydash_core::error::AppError;

pub use national_rail::{DeparturesJob, parse_departures};
pub use spoons::{SpoonsJob, parse_pubs};
pub use tfl::{StationStatusJob, TubeStatusJob, parse_station_statuses, parse_tube_lines};

/// Compile a CSS selector, reporting a bad one against `url`.
pub(crate) fn selector(url: &str, css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::extraction(url, format!("invalid selector {css:?}: {e}")))
}

/// Concatenated text of `element` with whitespace runs collapsed.
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Text of the first descendant matching `sel`, if any.
pub(crate) fn first_text(element: ElementRef<'_>, sel: &Selector) -> Option<String> {
    element.select(sel).next().map(text_of)
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
