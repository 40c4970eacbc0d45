//! Styled text for panel and media snapshots.
//!
//! Pure functions turn snapshots into ratatui [`Line`]s; laying them out on
//! screen is the job of [`crate::ui`].

use chrono::{DateTime, Local, Utc};
use ratatui::style::{Color, Stylize};
use ratatui::text::{Line, Span};

use ttydash_core::media::MediaSnapshot;
use ttydash_core::{
    PanelSnapshot, Records, SpoonsPub, StationStatus, TrainDeparture, TubeLineStatus,
};

const DESTINATION_WIDTH: usize = 27;
const DELAY_REASON_WIDTH: usize = 60;
const MAX_DELAY_NOTES: usize = 3;
const MAX_FACILITIES: usize = 3;

/// Display switches taken from the dashboard configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// ASCII glyphs and named colors for Linux consoles.
    pub tty: bool,
    pub show_description: bool,
    pub max_departures: usize,
}

impl RenderOptions {
    fn glyph<'a>(&self, fancy: &'a str, plain: &'a str) -> &'a str {
        if self.tty { plain } else { fancy }
    }

    fn spinner(&self) -> &'static str {
        self.glyph("⠋", "*")
    }
}

struct LineColor {
    name: &'static str,
    rgb: (u8, u8, u8),
    named: Color,
}

const LINE_COLORS: &[LineColor] = &[
    LineColor { name: "Bakerloo", rgb: (0xB3, 0x63, 0x05), named: Color::Yellow },
    LineColor { name: "Central", rgb: (0xE3, 0x20, 0x17), named: Color::LightRed },
    LineColor { name: "Circle", rgb: (0xFF, 0xD3, 0x00), named: Color::LightYellow },
    LineColor { name: "District", rgb: (0x00, 0x78, 0x2A), named: Color::Green },
    LineColor { name: "Elizabeth", rgb: (0x69, 0x50, 0xA1), named: Color::Magenta },
    LineColor { name: "Hammersmith & City", rgb: (0xF3, 0xA9, 0xBB), named: Color::LightMagenta },
    LineColor { name: "Jubilee", rgb: (0xA0, 0xA5, 0xA9), named: Color::Gray },
    LineColor { name: "Metropolitan", rgb: (0x9B, 0x00, 0x56), named: Color::Magenta },
    LineColor { name: "Northern", rgb: (0x00, 0x00, 0x00), named: Color::DarkGray },
    LineColor { name: "Piccadilly", rgb: (0x00, 0x36, 0x88), named: Color::Blue },
    LineColor { name: "Victoria", rgb: (0x00, 0x98, 0xD4), named: Color::LightCyan },
    LineColor { name: "Waterloo & City", rgb: (0x95, 0xCD, 0xBA), named: Color::Cyan },
    LineColor { name: "DLR", rgb: (0x00, 0xA4, 0xA7), named: Color::Cyan },
    LineColor { name: "London Overground", rgb: (0xEE, 0x7C, 0x0E), named: Color::Yellow },
    LineColor { name: "London Trams", rgb: (0x84, 0xB8, 0x17), named: Color::LightGreen },
    LineColor { name: "Emirates Cable Car", rgb: (0xE2, 0x18, 0x36), named: Color::LightRed },
];

pub fn line_color(line_name: &str, tty: bool) -> Color {
    match LINE_COLORS.iter().find(|c| c.name == line_name) {
        Some(c) if tty => c.named,
        Some(LineColor { rgb: (r, g, b), .. }) => Color::Rgb(*r, *g, *b),
        None => Color::White,
    }
}

pub fn status_color(severity: &str) -> Color {
    let severity = severity.to_lowercase();
    if severity.contains("good service") {
        Color::Green
    } else if severity.contains("minor delays") {
        Color::Yellow
    } else if ["severe delays", "part closure", "part suspended", "closed", "suspended"]
        .iter()
        .any(|s| severity.contains(s))
    {
        Color::Red
    } else {
        Color::White
    }
}

/// Cut `text` to `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

fn span(text: impl Into<String>) -> Span<'static> {
    Span::raw(text.into())
}

fn padded(text: &str, width: usize) -> String {
    format!("{text:<width$}")
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// `putney` to `Putney`, `clapham-junction` to `Clapham Junction`.
pub fn station_title(slug: &str) -> String {
    slug.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Header, loading and error states shared by every panel.
fn panel_frame(
    snapshot: &PanelSnapshot,
    title: Span<'static>,
    updated_label: &str,
    loading: [&str; 2],
    opts: &RenderOptions,
    body: impl FnOnce(&Records) -> Vec<Line<'static>>,
) -> Vec<Line<'static>> {
    let mut header = vec![title];
    if let Some(at) = snapshot.last_updated {
        header.push(span("  "));
        header.push(
            span(format!(
                "{updated_label}: {} - {}s",
                local_time(at),
                snapshot.seconds_until_next_refresh
            ))
            .dim(),
        );
    }
    let mut lines = vec![Line::from(header), Line::default()];

    if snapshot.awaiting_first_data() {
        lines.push(span(loading[0]).fg(Color::Cyan).into());
        lines.push(span(format!("{} {}", opts.spinner(), loading[1])).dim().into());
        return lines;
    }

    if let Some(records) = snapshot.records() {
        lines.extend(body(records));
    }
    if let Some(error) = &snapshot.last_error {
        lines.push(span(format!("Error: {error}")).fg(Color::Red).into());
    }
    lines
}

pub fn tfl_panel(snapshot: &PanelSnapshot, opts: &RenderOptions) -> Vec<Line<'static>> {
    let title = format!("{}TFL Tube Status", opts.glyph("🚇 ", ""));
    panel_frame(
        snapshot,
        span(title).fg(Color::Cyan).bold(),
        "Last updated",
        ["Loading tube status...", "Fetching data from TFL..."],
        opts,
        |records| records_body(records, opts),
    )
}

pub fn departures_panel(snapshot: &PanelSnapshot, station: &str, opts: &RenderOptions) -> Vec<Line<'static>> {
    let title = format!("{}{} Departures", opts.glyph("🚉 ", ""), station_title(station));
    panel_frame(
        snapshot,
        span(title).fg(Color::Magenta).bold(),
        "Updated",
        ["Loading departures...", "Fetching data from National Rail..."],
        opts,
        |records| records_body(records, opts),
    )
}

pub fn pubs_panel(snapshot: &PanelSnapshot, opts: &RenderOptions) -> Vec<Line<'static>> {
    let title = format!("{}Wetherspoons Near me", opts.glyph("🍺 ", ""));
    panel_frame(
        snapshot,
        span(title).fg(Color::Cyan).bold(),
        "Updated",
        ["Finding pubs...", "Searching Wetherspoons..."],
        opts,
        |records| records_body(records, opts),
    )
}

/// Render any panel by its id.
pub fn panel(snapshot: &PanelSnapshot, station: &str, opts: &RenderOptions) -> Vec<Line<'static>> {
    match snapshot.id.as_str() {
        "rail" => departures_panel(snapshot, station, opts),
        "pubs" => pubs_panel(snapshot, opts),
        _ => tfl_panel(snapshot, opts),
    }
}

/// The records without any panel chrome; also used by `scrape`.
pub fn records_body(records: &Records, opts: &RenderOptions) -> Vec<Line<'static>> {
    match records {
        Records::TubeLines(lines) => tube_lines(lines, opts),
        Records::Stations(stations) => station_statuses(stations, opts),
        Records::Departures(departures) => departures_table(departures, opts),
        Records::Pubs(pubs) => pub_list(pubs),
    }
}

fn status_entry(
    name: &str,
    marker: Color,
    severity: &str,
    routes: &[String],
    description: &str,
    opts: &RenderOptions,
) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
        span(opts.glyph("▬▬ ", "== ")).fg(marker),
        span(format!("{name}: ")).bold(),
        span(severity).fg(status_color(severity)),
    ])];
    for route in routes {
        lines.push(span(format!("  {route}")).dim().into());
    }
    if opts.show_description && !description.is_empty() {
        lines.push(span(format!("  {description}")).dim().into());
    }
    lines.push(Line::default());
    lines
}

fn tube_lines(lines: &[TubeLineStatus], opts: &RenderOptions) -> Vec<Line<'static>> {
    if lines.is_empty() {
        let check = opts.glyph(" ✓", "");
        return vec![span(format!("All lines running normally{check}")).fg(Color::Green).into()];
    }
    let mut out: Vec<Line<'static>> = lines
        .iter()
        .flat_map(|l| {
            status_entry(
                &l.line_name,
                line_color(&l.line_name, opts.tty),
                &l.status_severity,
                &l.affected_routes,
                &l.description,
                opts,
            )
        })
        .collect();
    out.push(span("Good service on all other lines").fg(Color::Green).into());
    out
}

fn station_statuses(stations: &[StationStatus], opts: &RenderOptions) -> Vec<Line<'static>> {
    if stations.is_empty() {
        return vec![span("No station disruptions").fg(Color::Green).into()];
    }
    stations
        .iter()
        .flat_map(|s| {
            status_entry(
                &s.station_name,
                Color::White,
                &s.status_severity,
                &s.affected_routes,
                &s.description,
                opts,
            )
        })
        .collect()
}

fn departures_table(departures: &[TrainDeparture], opts: &RenderOptions) -> Vec<Line<'static>> {
    if departures.is_empty() {
        return vec![span("No departures found").dim().into()];
    }

    let mut lines = vec![Line::from(vec![
        span(padded("Time", 7)).bold().dim(),
        span(padded("Destination", 30)).bold().dim(),
        span(padded("Status", 12)).bold().dim(),
        span(padded("Plat.", 6)).bold().dim(),
        span(padded("Dur.", 8)).bold().dim(),
    ])];

    for d in departures.iter().take(opts.max_departures) {
        let timing = if d.is_delayed { Color::Red } else { Color::Green };
        let status = if d.status == "On time" {
            "On time".to_string()
        } else {
            format!("{} {}", opts.glyph("→", "->"), d.expected_time)
        };
        lines.push(Line::from(vec![
            span(padded(&d.scheduled_time, 7)).fg(timing).bold(),
            span(padded(&truncate(&d.destination, DESTINATION_WIDTH), 30)),
            span(padded(&status, 12)).fg(timing),
            span(padded(&d.platform, 6)).fg(Color::Cyan),
            span(padded(&d.duration, 8)).dim(),
        ]));
    }

    let delayed: Vec<_> = departures
        .iter()
        .filter_map(|d| d.delay_reason.as_deref().map(|reason| (d, reason)))
        .take(MAX_DELAY_NOTES)
        .collect();
    if !delayed.is_empty() {
        lines.push(Line::default());
        lines.push(
            span(format!("{}Delay Information:", opts.glyph("⚠️ ", "! ")))
                .fg(Color::Yellow)
                .bold()
                .into(),
        );
        for (d, reason) in delayed {
            lines.push(span(format!("{} to {}: ", d.scheduled_time, d.destination)).fg(Color::Yellow).into());
            lines.push(span(format!("  {}", truncate(reason, DELAY_REASON_WIDTH))).dim().into());
        }
    }
    lines
}

fn pub_list(pubs: &[SpoonsPub]) -> Vec<Line<'static>> {
    if pubs.is_empty() {
        return vec![span("No Wetherspoons found in this area").fg(Color::Yellow).into()];
    }

    let mut lines = Vec::new();
    for p in pubs {
        lines.push(Line::from(vec![
            span(p.name.as_str()).fg(Color::Green).bold(),
            span(format!(" - {}", p.distance)).dim(),
        ]));
        lines.push(span(format!("  {}", p.address)).dim().into());

        let open = if p.open_status == "Open" { Color::Green } else { Color::Red };
        let mut status = vec![span(format!("  {}", p.open_status)).fg(open)];
        if !p.closing_time.is_empty() {
            status.push(span(" • "));
            status.push(span(p.closing_time.as_str()).dim());
        }
        lines.push(Line::from(status));

        if !p.facilities.is_empty() {
            let more = if p.facilities.len() > MAX_FACILITIES { "..." } else { "" };
            let shown: Vec<_> = p.facilities.iter().take(MAX_FACILITIES).map(String::as_str).collect();
            lines.push(span(format!("  Facilities: {}{more}", shown.join(", "))).dim().into());
        }
        lines.push(Line::default());
    }
    let plural = if pubs.len() == 1 { "" } else { "s" };
    lines.push(span(format!("Found {} pub{plural}", pubs.len())).dim().into());
    lines
}

pub fn media_pane(snapshot: &MediaSnapshot) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = vec![
        span("ASCII Player").fg(Color::Cyan).bold().into(),
        span(format!("Status: {}", snapshot.status)).dim().into(),
    ];
    match &snapshot.frame {
        Some(frame) => {
            lines.extend(frame.lines().map(|row| Line::raw(row.to_string())));
            lines.push(span(format!("Frame {} / {}", snapshot.frame_index + 1, snapshot.frame_count)).dim().into());
        }
        None if !snapshot.status.is_error() => lines.push(span("Loading...").dim().into()),
        None => {}
    }
    lines
}

/// The "Time now" line above the panels.
pub fn clock(now: DateTime<Local>) -> Line<'static> {
    span(format!("Time now: {}", now.format("%H:%M:%S"))).bold().into()
}

pub fn debug_footer(columns: u16, rows: u16) -> Line<'static> {
    Line::from(vec![
        span("Press 'q' or ESC to quit").dim(),
        span(format!("    Screen: {columns}x{rows}")).dim(),
    ])
}

/// Unstyled text of one line.
pub fn text(line: &Line<'_>) -> String {
    line.spans.iter().map(|s| s.content.as_ref()).collect()
}

/// Plain text of rendered lines, one string per line.
#[cfg(test)]
pub fn plain(lines: &[Line<'_>]) -> Vec<String> {
    lines.iter().map(text).collect()
}
