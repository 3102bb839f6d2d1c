use crate::domain::layout::MediaLayout;
use crate::domain::report::Report;
use crate::error::RepositoryError;
use crate::ports::repository::{DeletionReport, ReportRepository};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Reports stored as pretty JSON files next to the uploaded videos.
#[derive(Clone, Debug)]
pub struct FsReportStore {
    layout: MediaLayout,
}

impl FsReportStore {
    pub fn new(layout: MediaLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &MediaLayout {
        &self.layout
    }
}

#[async_trait]
impl ReportRepository for FsReportStore {
    async fn save(&self, report: &Report) -> Result<(), RepositoryError> {
        let path = self.layout.report_path(&report.video_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(report)?;

        // rename over the old record so readers never see half a file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, video_id: &str) -> Result<Report, RepositoryError> {
        let path = self.layout.report_path(video_id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RepositoryError::NotFound(video_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    async fn list_ids(&self) -> Result<Vec<String>, RepositoryError> {
        let mut entries = match tokio::fs::read_dir(self.layout.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(MediaLayout::video_id_of_report) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, video_id: &str) -> DeletionReport {
        let mut targets = vec![
            self.layout.video_path(video_id),
            self.layout.report_path(video_id),
            self.layout.resolve(&self.layout.best_thumbnail_name(video_id)),
        ];
        match frame_thumbnails(&self.layout, video_id).await {
            Ok(mut thumbs) => targets.append(&mut thumbs),
            Err(e) => tracing::warn!("could not list thumbnails of {}: {}", video_id, e),
        }

        let mut outcome = DeletionReport::default();
        for path in targets {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => outcome.removed.push(display_name(&self.layout, &path)),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("could not remove {:?}: {}", path, e);
                    outcome
                        .errors
                        .push(format!("{}: {}", display_name(&self.layout, &path), e));
                }
            }
        }
        tracing::info!(
            "deleted {}: {} file(s) removed, {} error(s)",
            video_id,
            outcome.removed.len(),
            outcome.errors.len()
        );
        outcome
    }
}

async fn frame_thumbnails(layout: &MediaLayout, video_id: &str) -> std::io::Result<Vec<PathBuf>> {
    let prefix = layout.frame_thumbnail_prefix(video_id);
    let mut entries = match tokio::fs::read_dir(layout.thumbs_dir()).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(&prefix) && name.ends_with(".jpg") {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

fn display_name(layout: &MediaLayout, path: &Path) -> String {
    path.strip_prefix(layout.root())
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::detection::{BodyType, Detection};
    use crate::domain::segments::SegmentAggregator;
    use tempfile::tempdir;

    fn sample_report(id: &str) -> Report {
        let detections = vec![Detection {
            timestamp: 1.5,
            frame_index: 45,
            class: "EXPOSED".to_string(),
            score: 0.82,
            bbox: [10.0, 20.0, 30.0, 40.0],
            body_type: BodyType::UpperBody,
            thumbnail: format!("thumbs/{}_f45.jpg", id),
        }];
        Report {
            video: "holiday.mp4".to_string(),
            video_id: id.to_string(),
            duration: 12.0,
            fps: 30.0,
            segments: SegmentAggregator::default().aggregate(&detections),
            detections,
            best_thumbnail: format!("{}_best.jpg", id),
            scan_time: 3.25,
        }
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = FsReportStore::new(MediaLayout::new(dir.path()));
        let report = sample_report("abc");

        store.save(&report).await.unwrap();
        let loaded = store.load("abc").await.unwrap();
        assert_eq!(loaded, report);

        // saving what was loaded leaves the record byte-identical
        let before = std::fs::read(dir.path().join("abc_report.json")).unwrap();
        store.save(&loaded).await.unwrap();
        let after = std::fs::read(dir.path().join("abc_report.json")).unwrap();
        assert_eq!(before, after);
        assert!(!dir.path().join("abc_report.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_resave_keeps_inexact_floats() {
        let dir = tempdir().unwrap();
        let store = FsReportStore::new(MediaLayout::new(dir.path()));
        let mut report = sample_report("ntsc");
        report.fps = 30000.0 / 1001.0;
        report.duration = 7193.0 / report.fps;
        report.scan_time = 12.345678901234567;
        for (i, det) in report.detections.iter_mut().enumerate() {
            det.timestamp = 45.0 / 29.97 + i as f64 * 0.1;
            det.score = 0.8734000325202942;
        }
        report.detections.push(Detection {
            timestamp: 30.389202422587342,
            ..report.detections[0].clone()
        });
        report.segments = SegmentAggregator::default().aggregate(&report.detections);

        store.save(&report).await.unwrap();
        let first = std::fs::read(dir.path().join("ntsc_report.json")).unwrap();
        let loaded = store.load("ntsc").await.unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.detections[1].timestamp.to_bits(), 30.389202422587342f64.to_bits());

        store.save(&loaded).await.unwrap();
        let second = std::fs::read(dir.path().join("ntsc_report.json")).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsReportStore::new(MediaLayout::new(dir.path()));
        assert!(matches!(
            store.load("nope").await,
            Err(RepositoryError::NotFound(id)) if id == "nope"
        ));
    }

    #[tokio::test]
    async fn test_list_skips_unreadable_records() {
        let dir = tempdir().unwrap();
        let store = FsReportStore::new(MediaLayout::new(dir.path()));
        store.save(&sample_report("b")).await.unwrap();
        store.save(&sample_report("a")).await.unwrap();
        std::fs::write(dir.path().join("broken_report.json"), b"{not json").unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"video").unwrap();

        assert_eq!(store.list_ids().await.unwrap(), vec!["a", "b", "broken"]);
        let all = store.list_all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.video_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_list_on_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let store = FsReportStore::new(MediaLayout::new(dir.path().join("absent")));
        assert!(store.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_every_artifact_of_one_video() {
        let dir = tempdir().unwrap();
        let layout = MediaLayout::new(dir.path());
        layout.ensure_dirs().await.unwrap();
        let store = FsReportStore::new(layout);
        store.save(&sample_report("v1")).await.unwrap();
        for name in ["v1.mp4", "v1_best.jpg", "thumbs/v1_f0.jpg", "thumbs/v1_f45.jpg", "thumbs/v10_f3.jpg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let outcome = store.delete("v1").await;
        assert!(outcome.errors.is_empty());
        assert_eq!(
            outcome.removed,
            vec![
                "v1.mp4",
                "v1_report.json",
                "v1_best.jpg",
                "thumbs/v1_f0.jpg",
                "thumbs/v1_f45.jpg"
            ]
        );
        // another video sharing a textual prefix is untouched
        assert!(dir.path().join("thumbs/v10_f3.jpg").exists());
    }

    #[tokio::test]
    async fn test_delete_of_unknown_video_is_empty() {
        let dir = tempdir().unwrap();
        let store = FsReportStore::new(MediaLayout::new(dir.path()));
        assert_eq!(store.delete("ghost").await, DeletionReport::default());
    }
}
