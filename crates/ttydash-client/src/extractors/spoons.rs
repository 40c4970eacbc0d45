//! Wetherspoon pub finder.

use std::time::Duration;

use scraper::Html;
use ttydash_core::config::PubsLocation;
use ttydash_core::error::AppError;
use ttydash_core::models::SpoonsPub;
use ttydash_core::traits::{ExtractionJob, Page, PageTarget};
use url::Url;

use super::{first_text, selector};

const PUB_SEARCH_URL: &str = "https://www.jdwetherspoon.com/pub-search/";

const LISTING: &str = ".filter-search-listings__list";
const ITEM: &str = ".filter-search-listings__item";

const SETTLE: Duration = Duration::from_secs(2);

/// Pubs near a location, optionally pinned by coordinates.
#[derive(Debug, Clone)]
pub struct SpoonsJob {
    location: PubsLocation,
    url: String,
}

impl SpoonsJob {
    pub fn new(location: PubsLocation) -> Result<Self, AppError> {
        let url = search_url(&location)?;
        Ok(Self { location, url })
    }

    pub fn location(&self) -> &PubsLocation {
        &self.location
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn search_url(location: &PubsLocation) -> Result<String, AppError> {
    let mut url = Url::parse(PUB_SEARCH_URL)
        .map_err(|e| AppError::ConfigError(format!("invalid pub search URL: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("location", &location.location);
        if let Some((lat, lng)) = location.coordinates {
            query
                .append_pair("lat", &lat.to_string())
                .append_pair("lng", &lng.to_string());
        }
    }
    Ok(url.into())
}

impl ExtractionJob for SpoonsJob {
    type Record = SpoonsPub;

    fn name(&self) -> &str {
        "pubs"
    }

    fn target(&self) -> PageTarget {
        PageTarget::new(self.url.clone())
            .wait_for(LISTING)
            .with_settle(SETTLE)
    }

    async fn run<P: Page>(&self, page: &P) -> Result<Vec<SpoonsPub>, AppError> {
        let html = page.content().await?;
        parse_pubs(&self.url, &html)
    }

    fn fixture(&self) -> Vec<SpoonsPub> {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        vec![
            SpoonsPub {
                name: "The Rocket".into(),
                distance: "Less than a mile away".into(),
                address: "Putney Wharf Tower, Brewhouse Lane, Putney, Wandsworth, SW15 2JQ.".into(),
                open_status: "Open".into(),
                closing_time: "Closes at 11:00 pm".into(),
                facilities: strings(&[
                    "Wifi",
                    "TV Screens",
                    "Licensed Outside Area",
                    "Baby Change",
                    "Meeting Facilities",
                    "Step Free Access",
                ]),
                pub_url: "https://www.jdwetherspoon.com/pubs/the-rocket-putney/".into(),
                menu_url: "https://www.jdwetherspoon.com/pub-menus/the-rocket-putney/".into(),
            },
            SpoonsPub {
                name: "Walham Green".into(),
                distance: "2.1 miles away".into(),
                address: "472 Fulham Road, Fulham, Hammersmith & Fulham, SW6 1BY.".into(),
                open_status: "Open".into(),
                closing_time: "Closes at 11:30 pm".into(),
                facilities: strings(&[
                    "Train Station",
                    "Wifi",
                    "TV Screens",
                    "Licensed Outside Area",
                    "Baby Change",
                    "broadcasts Live News",
                    "children Welcome",
                ]),
                pub_url: "https://www.jdwetherspoon.com/pubs/walham-green-fulham/".into(),
                menu_url: "https://www.jdwetherspoon.com/pub-menus/walham-green-fulham/".into(),
            },
        ]
    }
}

pub fn parse_pubs(url: &str, html: &str) -> Result<Vec<SpoonsPub>, AppError> {
    let item = selector(url, ITEM)?;
    let name = selector(url, "h3")?;
    let distance = selector(url, ".filter-search-listings__distance")?;
    let address = selector(url, ".filter-search-listings__address")?;
    let open_status = selector(url, ".open-status")?;
    let closing_time = selector(url, ".opening-closing-time:not(.open-status)")?;
    let facility = selector(url, ".filter-search-listings__facilities li")?;
    let pub_link = selector(url, ".filter-search-listings__buttons .is-style-fill a")?;
    let menu_link = selector(url, ".filter-search-listings__buttons .is-style-outline a")?;

    let document = Html::parse_document(html);
    let href = |article: scraper::ElementRef<'_>, sel: &scraper::Selector| {
        article
            .select(sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default()
            .to_string()
    };

    let pubs = document
        .select(&item)
        .map(|article| SpoonsPub {
            name: first_text(article, &name).unwrap_or_else(|| "Unknown".into()),
            distance: first_text(article, &distance).unwrap_or_default(),
            address: first_text(article, &address)
                .map(|a| strip_directions(&a))
                .unwrap_or_default(),
            open_status: first_text(article, &open_status).unwrap_or_else(|| "Unknown".into()),
            closing_time: first_text(article, &closing_time).unwrap_or_default(),
            facilities: article.select(&facility).map(super::text_of).collect(),
            pub_url: href(article, &pub_link),
            menu_url: href(article, &menu_link),
        })
        .collect();
    Ok(pubs)
}

/// The address block ends with a "Get directions" link.
fn strip_directions(address: &str) -> String {
    match address.find("Get directions") {
        Some(i) => address[..i].trim().to_string(),
        None => address.to_string(),
    }
}
