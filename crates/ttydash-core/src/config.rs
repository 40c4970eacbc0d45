//! Environment-driven dashboard configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::media::PipelineConfig;
use crate::session::SessionConfig;
use crate::traits::FrameSpec;

pub const DEFAULT_MEDIA_SOURCE_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Location query for the pub finder.
#[derive(Debug, Clone, PartialEq)]
pub struct PubsLocation {
    pub location: String,
    pub coordinates: Option<(f64, f64)>,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub pipeline: PipelineConfig,
    pub frame_period: Duration,
    pub source_url: String,
    pub ffmpeg_bin: String,
    pub yt_dlp_bin: String,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub tfl_refresh_interval: Duration,
    pub rail_refresh_interval: Duration,
    pub pubs_refresh_interval: Duration,
    /// UI redraw and countdown tick granularity.
    pub screen_refresh_interval: Duration,
    pub max_rail_departures: usize,
    pub use_test_data: bool,
    pub show_tfl_description: bool,
    pub show_debug_info: bool,
    /// ASCII-safe glyphs and named colours for Linux consoles.
    pub tty_mode: bool,
    pub rail_station: String,
    /// `None` disables the pub panel.
    pub pubs: Option<PubsLocation>,
    pub chrome_bin: Option<PathBuf>,
    pub session: SessionConfig,
    pub media: MediaConfig,
}

impl DashboardConfig {
    /// Read configuration from environment variables.
    ///
    /// Every variable is optional; see the README table for defaults.
    /// Unparseable numbers and booleans are rejected, not defaulted.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let env = Env(&lookup);

        let refresh = env.secs("REFRESH_INTERVAL", 120)?;
        let screen_refresh = env.secs("SCREEN_REFRESH_INTERVAL", 10)?;

        let tty_mode = match env.get("TTY_MODE") {
            Some(_) => env.flag("TTY_MODE", false)?,
            None => env.get("TERM").is_some_and(|term| is_tty_term(&term)),
        };

        let idle_secs: u64 = env.parse("BROWSER_IDLE_TIMEOUT_SECS", 600)?;
        let session = SessionConfig {
            page_timeout: env.secs("PAGE_TIMEOUT_SECS", 30)?,
            launch_timeout: env.secs("BROWSER_LAUNCH_TIMEOUT_SECS", 30)?,
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            max_pages: env.positive("BROWSER_MAX_PAGES", 1)?,
            ..Default::default()
        };

        let media = MediaConfig {
            pipeline: PipelineConfig {
                cache_dir: PathBuf::from(env.string("MEDIA_CACHE_DIR", "videos")),
                capacity: env.positive("MEDIA_MAX_CACHE_SIZE", 8)?,
                clip_window: env.secs("MEDIA_CLIP_SECONDS", 30)?,
                frames: FrameSpec {
                    fps: env.positive("MEDIA_FPS", 10)?,
                    ..FrameSpec::default()
                },
                grid_width: env.positive("MEDIA_WIDTH", 24)?,
                grid_height: env.positive("MEDIA_HEIGHT", 14)?,
                step_timeout: env.secs("TRANSCODE_TIMEOUT_SECS", 300)?,
            },
            frame_period: Duration::from_millis(env.positive("MEDIA_FRAME_MS", 500)?),
            source_url: env.string("MEDIA_SOURCE_URL", DEFAULT_MEDIA_SOURCE_URL),
            ffmpeg_bin: env.string("FFMPEG_BIN", "ffmpeg"),
            yt_dlp_bin: env.string("YT_DLP_BIN", "yt-dlp"),
        };

        Ok(Self {
            tfl_refresh_interval: env.secs_or("TFL_REFRESH_INTERVAL", refresh)?,
            rail_refresh_interval: env.secs_or("RAIL_REFRESH_INTERVAL", refresh)?,
            pubs_refresh_interval: env.secs_or("PUBS_REFRESH_INTERVAL", refresh)?,
            screen_refresh_interval: screen_refresh,
            max_rail_departures: env.parse("MAX_RAIL_DEPARTURES", 4)?,
            use_test_data: env.flag("USE_TEST_DATA", false)?,
            show_tfl_description: env.flag("SHOW_TFL_DESCRIPTION", false)?,
            show_debug_info: env.flag("SHOW_DEBUG_INFO", false)?,
            tty_mode,
            rail_station: env.string("RAIL_STATION", "putney"),
            pubs: env.pubs_location()?,
            chrome_bin: env.get("CHROME_BIN").map(PathBuf::from),
            session,
            media,
        })
    }
}

/// Linux virtual consoles and vt* terminals lack emoji and truecolor.
pub fn is_tty_term(term: &str) -> bool {
    term == "linux" || term.starts_with("vt")
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, AppError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                AppError::ConfigError(format!("Invalid {key} '{raw}': must be a non-negative integer"))
            }),
        }
    }

    fn positive<T: FromStr + PartialOrd + Default>(&self, key: &str, default: T) -> Result<T, AppError> {
        let value = self.parse(key, default)?;
        if value <= T::default() {
            return Err(AppError::ConfigError(format!("{key} must be at least 1")));
        }
        Ok(value)
    }

    fn secs(&self, key: &str, default: u64) -> Result<Duration, AppError> {
        self.positive(key, default).map(Duration::from_secs)
    }

    fn secs_or(&self, key: &str, default: Duration) -> Result<Duration, AppError> {
        self.secs(key, default.as_secs())
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, AppError> {
        match self.get(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(AppError::ConfigError(format!(
                    "Invalid {key} '{v}': must be true or false"
                ))),
            },
        }
    }

    fn coordinate(&self, key: &str) -> Result<Option<f64>, AppError> {
        self.get(key)
            .map(|raw| {
                raw.parse::<f64>()
                    .map_err(|_| AppError::ConfigError(format!("Invalid {key} '{raw}': must be a number")))
            })
            .transpose()
    }

    fn pubs_location(&self) -> Result<Option<PubsLocation>, AppError> {
        let lat = self.coordinate("PUBS_LAT")?;
        let lng = self.coordinate("PUBS_LNG")?;
        let coordinates = match (lat, lng) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            (None, None) => None,
            _ => {
                return Err(AppError::ConfigError(
                    "PUBS_LAT and PUBS_LNG must be set together".into(),
                ));
            }
        };

        Ok(self.get("PUBS_LOCATION").map(|location| PubsLocation {
            location,
            coordinates,
        }))
    }
}
