//! Offline repairs over stored reports.
//!
//! Every operation writes a record only when it changed something, so running
//! it again right away reports everything as unchanged.

use crate::domain::av::thumbnails::write_sfw_thumbnail;
use crate::domain::detection::Detection;
use crate::domain::layout::MediaLayout;
use crate::domain::report::{normalize_thumbnail_path, Report};
use crate::domain::segments::SegmentAggregator;
use crate::ports::repository::ReportRepository;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Start times closer than this to the representative detection are left alone.
pub const START_EPSILON: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RecordOutcome {
    Updated,
    Unchanged,
    Failed(String),
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordOutcome::Updated => write!(f, "updated"),
            RecordOutcome::Unchanged => write!(f, "unchanged"),
            RecordOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordResult {
    pub video_id: String,
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} updated, {} unchanged, {} failed",
            self.updated, self.unchanged, self.failed
        )
    }
}

/// Per-record results of one batch operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub operation: &'static str,
    pub records: Vec<RecordResult>,
}

impl BatchReport {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            records: Vec::new(),
        }
    }

    fn push(&mut self, video_id: &str, outcome: RecordOutcome) {
        match &outcome {
            RecordOutcome::Failed(reason) => {
                tracing::warn!("{} {}: {}", self.operation, video_id, reason)
            }
            other => tracing::debug!("{} {}: {}", self.operation, video_id, other),
        }
        self.records.push(RecordResult {
            video_id: video_id.to_string(),
            outcome,
        });
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for record in &self.records {
            match record.outcome {
                RecordOutcome::Updated => summary.updated += 1,
                RecordOutcome::Unchanged => summary.unchanged += 1,
                RecordOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }
}

/// Whether segment regeneration may replace segments that already exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegenerateMode {
    /// Only fill in reports that have detections but no segments.
    #[default]
    MissingOnly,
    /// Also replace segments that no longer match their detections.
    ReplaceStale,
}

/// Derive segments for a report. Returns whether the report changed.
pub fn regenerate_segments(
    report: &mut Report,
    aggregator: &SegmentAggregator,
    mode: RegenerateMode,
) -> bool {
    if report.detections.is_empty() {
        return false;
    }
    if !report.segments.is_empty() && mode == RegenerateMode::MissingOnly {
        return false;
    }
    let segments = aggregator.aggregate(&report.detections);
    if segments == report.segments {
        return false;
    }
    report.segments = segments;
    true
}

/// Whether stored segments diverge from what the detections yield.
pub fn has_stale_segments(report: &Report, aggregator: &SegmentAggregator) -> bool {
    aggregator.aggregate(&report.detections) != report.segments
}

/// Forward-slash every stored thumbnail path and drop accumulator leftovers
/// from segments. Returns whether the report changed.
pub fn normalize_paths(report: &mut Report) -> bool {
    let mut changed = false;
    for segment in &mut report.segments {
        changed |= normalize_in_place(&mut segment.thumbnail);
        if segment.stray_best.take().is_some() {
            changed = true;
        }
    }
    for detection in &mut report.detections {
        changed |= normalize_in_place(&mut detection.thumbnail);
    }
    changed |= normalize_in_place(&mut report.best_thumbnail);
    changed
}

fn normalize_in_place(path: &mut String) -> bool {
    let normalized = normalize_thumbnail_path(path);
    if normalized == *path {
        return false;
    }
    *path = normalized;
    true
}

/// Move each segment's start to the timestamp of the best-scoring detection
/// that shares its thumbnail. Returns whether the report changed.
pub fn realign_segment_starts(report: &mut Report) -> bool {
    let mut by_thumbnail: HashMap<String, &Detection> = HashMap::new();
    for det in &report.detections {
        let key = normalize_thumbnail_path(&det.thumbnail);
        if key.is_empty() {
            continue;
        }
        by_thumbnail
            .entry(key)
            .and_modify(|best| {
                if det.score > best.score {
                    *best = det;
                }
            })
            .or_insert(det);
    }

    let mut changed = false;
    for segment in &mut report.segments {
        let key = normalize_thumbnail_path(&segment.thumbnail);
        let Some(best) = by_thumbnail.get(&key) else {
            continue;
        };
        if (best.timestamp - segment.start).abs() > START_EPSILON {
            segment.start = best.timestamp;
            changed = true;
        }
    }
    changed
}

/// Reports that qualify for a synthetic SFW thumbnail.
pub fn needs_sfw_thumbnail(report: &Report) -> bool {
    report.detections.is_empty() && report.best_thumbnail.is_empty()
}

pub struct MaintenanceOps<R> {
    repo: Arc<R>,
    layout: MediaLayout,
    aggregator: SegmentAggregator,
}

impl<R> MaintenanceOps<R>
where
    R: ReportRepository,
{
    pub fn new(repo: Arc<R>, layout: MediaLayout, aggregator: SegmentAggregator) -> Self {
        Self {
            repo,
            layout,
            aggregator,
        }
    }

    pub async fn regenerate_segments(&self, mode: RegenerateMode) -> BatchReport {
        let aggregator = self.aggregator;
        self.for_each("regenerate-segments", |report| {
            regenerate_segments(report, &aggregator, mode)
        })
        .await
    }

    pub async fn normalize_paths(&self) -> BatchReport {
        self.for_each("normalize-paths", normalize_paths).await
    }

    pub async fn realign_segment_starts(&self) -> BatchReport {
        self.for_each("realign-starts", realign_segment_starts).await
    }

    pub async fn backfill_sfw_thumbnails(&self) -> BatchReport {
        let mut batch = BatchReport::new("backfill-sfw");
        for (id, loaded) in self.load_all().await {
            let mut report = match loaded {
                Ok(report) => report,
                Err(reason) => {
                    batch.push(&id, RecordOutcome::Failed(reason));
                    continue;
                }
            };
            if !needs_sfw_thumbnail(&report) {
                batch.push(&id, RecordOutcome::Unchanged);
                continue;
            }

            let layout = self.layout.clone();
            let video_id = report.video_id.clone();
            let written =
                tokio::task::spawn_blocking(move || write_sfw_thumbnail(&layout, &video_id)).await;
            let outcome = match written {
                Ok(Ok(best)) => {
                    report.best_thumbnail = best;
                    self.store(&report).await
                }
                Ok(Err(e)) => RecordOutcome::Failed(e.to_string()),
                Err(e) => RecordOutcome::Failed(e.to_string()),
            };
            batch.push(&id, outcome);
        }
        batch
    }

    /// Ids of reports whose segments no longer match their detections.
    pub async fn audit(&self) -> Vec<String> {
        let mut stale = Vec::new();
        for (id, loaded) in self.load_all().await {
            match loaded {
                Ok(report) if has_stale_segments(&report, &self.aggregator) => stale.push(id),
                Ok(_) => {}
                Err(reason) => tracing::warn!("audit {}: {}", id, reason),
            }
        }
        stale
    }

    /// All repairs in dependency order: segments first, so that the path and
    /// start fixes see them.
    pub async fn run_all(&self, mode: RegenerateMode) -> Vec<BatchReport> {
        vec![
            self.regenerate_segments(mode).await,
            self.normalize_paths().await,
            self.realign_segment_starts().await,
            self.backfill_sfw_thumbnails().await,
        ]
    }

    async fn for_each<F>(&self, operation: &'static str, mut repair: F) -> BatchReport
    where
        F: FnMut(&mut Report) -> bool,
    {
        let mut batch = BatchReport::new(operation);
        for (id, loaded) in self.load_all().await {
            let outcome = match loaded {
                Ok(mut report) => {
                    if repair(&mut report) {
                        self.store(&report).await
                    } else {
                        RecordOutcome::Unchanged
                    }
                }
                Err(reason) => RecordOutcome::Failed(reason),
            };
            batch.push(&id, outcome);
        }
        batch
    }

    async fn load_all(&self) -> Vec<(String, Result<Report, String>)> {
        let ids = match self.repo.list_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("cannot list reports: {}", e);
                return Vec::new();
            }
        };
        let mut loaded = Vec::with_capacity(ids.len());
        for id in ids {
            // a repair is saved under the embedded id, which must name this record
            let report = match self.repo.load(&id).await {
                Ok(report) if report.video_id != id => Err(format!(
                    "record is stored as {} but names video {}",
                    id, report.video_id
                )),
                Ok(report) => Ok(report),
                Err(e) => Err(e.to_string()),
            };
            loaded.push((id, report));
        }
        loaded
    }

    async fn store(&self, report: &Report) -> RecordOutcome {
        match self.repo.save(report).await {
            Ok(()) => RecordOutcome::Updated,
            Err(e) => RecordOutcome::Failed(format!("write failed: {}", e)),
        }
    }
}
