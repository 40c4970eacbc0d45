use std::ffi::OsString;
use std::path::{Path, PathBuf};

use ttydash_core::error::AppError;
use ttydash_core::traits::ClipSource;

use crate::tool;

/// [`ClipSource`] that downloads one video with `yt-dlp`.
///
/// The smallest available format is requested; the clip is downscaled to a
/// character grid anyway.
#[derive(Debug, Clone)]
pub struct YtDlpSource {
    bin: OsString,
    url: String,
}

impl YtDlpSource {
    pub fn new(bin: impl Into<OsString>, url: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_args(&self, dest_dir: &Path, stem: &str) -> Vec<OsString> {
        let template = dest_dir.join(format!("{stem}.%(ext)s"));
        vec![
            "--no-progress".into(),
            "--no-playlist".into(),
            "-f".into(),
            "worst[ext=mp4]/worst".into(),
            "-o".into(),
            template.into(),
            self.url.clone().into(),
        ]
    }
}

impl ClipSource for YtDlpSource {
    async fn fetch(&self, dest_dir: &Path, stem: &str) -> Result<PathBuf, AppError> {
        tracing::info!(url = %self.url, dir = %dest_dir.display(), "Downloading clip");
        tool::run(&self.bin, self.build_args(dest_dir, stem))
            .await
            .map_err(|e| AppError::TranscodeFailed(format!("yt-dlp {e}")))?;

        find_downloaded(dest_dir, stem).await?.ok_or_else(|| {
            AppError::TranscodeFailed(format!("yt-dlp wrote no file for {stem} from {}", self.url))
        })
    }
}

/// The extension is chosen by yt-dlp, so match on the file stem.
async fn find_downloaded(dir: &Path, stem: &str) -> Result<Option<PathBuf>, AppError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_request_smallest_format() {
        let source = YtDlpSource::new("yt-dlp", "https://www.youtube.com/watch?v=abc");
        let args: Vec<String> = source
            .build_args(Path::new("videos"), "clip-3.download")
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[2..4], ["-f", "worst[ext=mp4]/worst"]);
        assert_eq!(args[4..6], ["-o", "videos/clip-3.download.%(ext)s"]);
        assert_eq!(args.last().map(String::as_str), Some("https://www.youtube.com/watch?v=abc"));
    }

    #[tokio::test]
    async fn test_find_downloaded_ignores_part_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip-0.download.mp4.part"), b"").unwrap();
        assert_eq!(find_downloaded(dir.path(), "clip-0.download").await.unwrap(), None);

        std::fs::write(dir.path().join("clip-0.download.webm"), b"").unwrap();
        assert_eq!(
            find_downloaded(dir.path(), "clip-0.download").await.unwrap(),
            Some(dir.path().join("clip-0.download.webm"))
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_pipeline_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = YtDlpSource::new("/nonexistent/yt-dlp", "https://example.com/v");
        let err = source.fetch(dir.path(), "clip-0.download").await.unwrap_err();
        assert!(matches!(err, AppError::TranscodeFailed(ref msg) if msg.starts_with("yt-dlp failed to spawn")));
        assert!(err.is_pipeline_failure());
    }
}
