//! On-disk clip cache.
//!
//! Finished clips are `clip-<index>.mp4` and immutable. In-progress files
//! carry a `.partial.` or `.download.` infix and never count as cached; they
//! are swept at the start of every run.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;

use crate::error::AppError;

const CLIP_PREFIX: &str = "clip-";
const CLIP_EXT: &str = ".mp4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedClip {
    pub index: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ClipCache {
    dir: PathBuf,
    capacity: usize,
}

impl ClipCache {
    pub fn new(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            capacity: capacity.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create the cache directory. Failure here is fatal for the pipeline.
    pub async fn ensure_dir(&self) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            AppError::CacheError(format!("cannot create {}: {e}", self.dir.display()))
        })
    }

    /// Finished clips, ordered by index.
    pub async fn list(&self) -> Result<Vec<CachedClip>, AppError> {
        let mut clips = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(parse_clip_index) {
                clips.push(CachedClip {
                    index,
                    path: entry.path(),
                });
            }
        }
        clips.sort_by_key(|c| c.index);
        Ok(clips)
    }

    /// Delete leftovers of interrupted downloads and trims. Returns how many
    /// files were removed.
    pub async fn remove_incomplete(&self) -> Result<usize, AppError> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_incomplete(name) && entry.file_type().await?.is_file() {
                tracing::debug!(file = %name, "Removing incomplete clip");
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn is_full(&self, clips: &[CachedClip]) -> bool {
        clips.len() >= self.capacity
    }

    pub fn clip_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{CLIP_PREFIX}{index}{CLIP_EXT}"))
    }

    /// Trim target; renamed to [`ClipCache::clip_path`] once complete.
    pub fn partial_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{CLIP_PREFIX}{index}.partial{CLIP_EXT}"))
    }

    /// File stem handed to the clip source for the raw download.
    pub fn download_stem(&self, index: usize) -> String {
        format!("{CLIP_PREFIX}{index}.download")
    }

    /// Scratch directory for extracted stills.
    pub fn scratch_dir(&self, index: usize) -> PathBuf {
        self.dir.join(format!("frames-{index}"))
    }
}

/// Lowest index not used by any cached clip.
pub fn next_free_index(clips: &[CachedClip]) -> usize {
    (0..)
        .find(|i| !clips.iter().any(|c| c.index == *i))
        .unwrap_or(clips.len())
}

/// Uniformly random clip, `None` if the cache is empty.
pub fn pick_random(clips: &[CachedClip]) -> Option<&CachedClip> {
    clips.choose(&mut rand::thread_rng())
}

fn parse_clip_index(name: &str) -> Option<usize> {
    name.strip_prefix(CLIP_PREFIX)?
        .strip_suffix(CLIP_EXT)?
        .parse()
        .ok()
}

fn is_incomplete(name: &str) -> bool {
    name.starts_with(CLIP_PREFIX) && (name.contains(".partial.") || name.contains(".download."))
}
