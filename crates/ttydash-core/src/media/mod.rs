//! Cached video clips rendered as looping ASCII animation.

pub mod ascii;
pub mod cache;
pub mod pipeline;
pub mod playback;

pub use ascii::{ASCII_RAMP, grid_to_ascii, luminance_char};
pub use cache::{CachedClip, ClipCache};
pub use pipeline::{ClipOrigin, MediaCachePipeline, MediaStatus, PipelineConfig};
pub use playback::{AsciiFrameSequence, MediaHandle, MediaPlayer, MediaSnapshot, Playback};
