//! On-disk naming of source videos, reports and thumbnails.
//!
//! ```text
//! {root}/{video_id}.mp4
//! {root}/{video_id}_report.json
//! {root}/{video_id}_best.jpg
//! {root}/thumbs/{video_id}_f{frame_index}.jpg
//! ```

use std::path::{Path, PathBuf};

pub const THUMBS_DIR: &str = "thumbs";
pub const REPORT_SUFFIX: &str = "_report.json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaLayout {
    root: PathBuf,
}

impl MediaLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn thumbs_dir(&self) -> PathBuf {
        self.root.join(THUMBS_DIR)
    }

    pub fn video_path(&self, video_id: &str) -> PathBuf {
        self.root.join(format!("{}.mp4", video_id))
    }

    pub fn report_path(&self, video_id: &str) -> PathBuf {
        self.root.join(format!("{}{}", video_id, REPORT_SUFFIX))
    }

    /// Best thumbnail name, relative to the root.
    pub fn best_thumbnail_name(&self, video_id: &str) -> String {
        format!("{}_best.jpg", video_id)
    }

    /// Per-frame thumbnail path relative to the root, always `/`-separated.
    pub fn frame_thumbnail_name(&self, video_id: &str, frame_index: u64) -> String {
        format!("{}/{}_f{}.jpg", THUMBS_DIR, video_id, frame_index)
    }

    /// Prefix shared by every per-frame thumbnail of a video.
    pub fn frame_thumbnail_prefix(&self, video_id: &str) -> String {
        format!("{}_f", video_id)
    }

    /// Resolve a relative path as stored in a report, whatever separator it
    /// was written with.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        relative
            .split(['/', '\\'])
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    pub fn video_id_of_report(file_name: &str) -> Option<&str> {
        file_name
            .strip_suffix(REPORT_SUFFIX)
            .filter(|id| !id.is_empty())
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.thumbs_dir()).await
    }
}
