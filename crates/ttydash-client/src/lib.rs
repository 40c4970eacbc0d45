//! Concrete collaborators for the ttydash engine: a Chromium browser driver,
//! the site extractors, and the external media tools.

pub mod browser;
pub mod decoder;
pub mod extractors;
pub mod ffmpeg;
mod tool;
pub mod yt_dlp;

pub use browser::{ChromiumDriver, ChromiumPage, ChromiumProcess};
pub use decoder::ImageDecoder;
pub use extractors::{DeparturesJob, SpoonsJob, StationStatusJob, TubeStatusJob};
pub use ffmpeg::FfmpegTranscoder;
pub use yt_dlp::YtDlpSource;
