use super::jobs::{Completion, JobManager};
use crate::config::ScanSettings;
use crate::domain::av::sampler::{FrameSampler, SampledFrame, VideoProbe};
use crate::domain::av::thumbnails::{select_best_thumbnail, write_thumbnail};
use crate::domain::detection::{BodyType, Detection, RawDetection};
use crate::domain::jobs::{estimate_total_samples, Job, JobUpdate};
use crate::domain::layout::MediaLayout;
use crate::domain::report::Report;
use crate::domain::segments::SegmentAggregator;
use crate::error::ScanError;
use crate::ports::detector::{ClassifierChain, Detector, Outcome};
use crate::ports::repository::ReportRepository;
use std::sync::Arc;
use std::time::Instant;

/// Per-frame work: detect, threshold, thumbnail, grade framing.
pub struct DetectionPipeline {
    detector: Box<dyn Detector>,
    bodies: ClassifierChain,
    layout: MediaLayout,
    score_threshold: f64,
}

impl DetectionPipeline {
    pub fn new(
        detector: Box<dyn Detector>,
        bodies: ClassifierChain,
        layout: MediaLayout,
        score_threshold: f64,
    ) -> Self {
        Self {
            detector,
            bodies,
            layout,
            score_threshold,
        }
    }

    /// Detections of one sampled frame. Never fails: an unavailable detector
    /// means no hits, an unavailable body classifier means `unknown`.
    pub fn process_frame(&self, video_id: &str, frame: &SampledFrame) -> Vec<Detection> {
        let raw = match Outcome::from(self.detector.detect(&frame.detect)) {
            Outcome::Available(raw) => raw,
            Outcome::Unavailable(reason) => {
                tracing::warn!(
                    "{} failed on frame {}: {}",
                    self.detector.name(),
                    frame.index,
                    reason
                );
                return Vec::new();
            }
        };

        let hits: Vec<RawDetection> = raw
            .into_iter()
            .filter(|d| d.score >= self.score_threshold)
            .collect();
        if hits.is_empty() {
            return Vec::new();
        }

        let thumbnail = self.layout.frame_thumbnail_name(video_id, frame.index);
        let thumbnail = match write_thumbnail(&frame.full, &self.layout.resolve(&thumbnail)) {
            Ok(()) => thumbnail,
            Err(e) => {
                tracing::warn!("thumbnail for frame {} not written: {}", frame.index, e);
                String::new()
            }
        };

        let body_type = match self.bodies.classify(&frame.detect) {
            Outcome::Available(boxes) => boxes.body_type(frame.detect.height()),
            Outcome::Unavailable(reason) => {
                tracing::debug!("body type unknown for frame {}: {}", frame.index, reason);
                BodyType::Unknown
            }
        };

        hits.into_iter()
            .map(|hit| Detection {
                timestamp: frame.timestamp,
                frame_index: frame.index,
                class: hit.class,
                score: hit.score,
                bbox: hit.bbox,
                body_type,
                thumbnail: thumbnail.clone(),
            })
            .collect()
    }
}

/// Runs scan jobs end to end: sample, detect, aggregate, persist.
pub struct ScanService<R> {
    jobs: Arc<JobManager>,
    pipeline: Arc<DetectionPipeline>,
    repo: Arc<R>,
    layout: MediaLayout,
    settings: ScanSettings,
}

impl<R> ScanService<R>
where
    R: ReportRepository + 'static,
{
    pub fn new(
        jobs: Arc<JobManager>,
        pipeline: DetectionPipeline,
        repo: Arc<R>,
        layout: MediaLayout,
        settings: ScanSettings,
    ) -> Self {
        Self {
            jobs,
            pipeline: Arc::new(pipeline),
            repo,
            layout,
            settings,
        }
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    /// Queue a scan of `{video_id}.mp4` and return at once.
    pub fn submit(self: &Arc<Self>, video_id: &str, original_name: &str) -> Job {
        let job = self.jobs.create(video_id);
        let service = Arc::clone(self);
        let id = video_id.to_string();
        let name = original_name.to_string();
        self.jobs
            .spawn(video_id.to_string(), async move { service.scan(&id, &name).await });
        job
    }

    /// The job body. Writes the report and returns where to view it.
    pub async fn scan(&self, video_id: &str, original_name: &str) -> Result<Completion, ScanError> {
        let started = Instant::now();

        let (probe, detections) = {
            let jobs = Arc::clone(&self.jobs);
            let pipeline = Arc::clone(&self.pipeline);
            let path = self.layout.video_path(video_id);
            let id = video_id.to_string();
            let settings = self.settings;
            tokio::task::spawn_blocking(move || {
                sample_video(&jobs, &pipeline, &path, &id, settings)
            })
            .await??
        };
        tracing::info!(
            "{}: {} detection(s) over {:.1}s of video",
            video_id,
            detections.len(),
            probe.duration
        );

        self.jobs.update(video_id, JobUpdate::stage("aggregating"));
        let segments = SegmentAggregator::new(self.settings.merge_gap).aggregate(&detections);

        self.jobs.update(video_id, JobUpdate::stage("thumbnails"));
        let (best_thumbnail, detections) = {
            let layout = self.layout.clone();
            let id = video_id.to_string();
            tokio::task::spawn_blocking(move || {
                let best = select_best_thumbnail(&layout, &id, &detections);
                (best, detections)
            })
            .await?
        };

        let report = Report {
            video: original_name.to_string(),
            video_id: video_id.to_string(),
            duration: probe.duration,
            fps: probe.fps,
            detections,
            best_thumbnail,
            segments,
            scan_time: started.elapsed().as_secs_f64(),
        };
        if let Err(e) = self.repo.save(&report).await {
            tracing::warn!("report for {} not saved: {}", video_id, e);
        }

        Ok(Completion {
            view: report.view_path(),
            scan_time: report.scan_time,
        })
    }
}

fn sample_video(
    jobs: &JobManager,
    pipeline: &DetectionPipeline,
    path: &std::path::Path,
    video_id: &str,
    settings: ScanSettings,
) -> Result<(VideoProbe, Vec<Detection>), ScanError> {
    jobs.update(video_id, JobUpdate::stage("opening"));
    let sampler = FrameSampler::open(path)?;
    let probe = sampler.probe();
    let total = estimate_total_samples(probe.duration, settings.sample_rate);
    jobs.update(
        video_id,
        JobUpdate {
            total: Some(total),
            fps: Some(probe.fps),
            total_frames: Some(probe.total_frames),
            duration: Some(probe.duration),
            ..JobUpdate::stage("sampling")
        },
    );

    let started = Instant::now();
    let mut detections = Vec::new();
    let mut processed = 0u64;
    sampler.run(settings.sample_rate, settings.detect_max_width, |frame| {
        detections.extend(pipeline.process_frame(video_id, &frame));
        processed += 1;
        jobs.record_progress(video_id, processed, started.elapsed());
        tracing::debug!("{}: sampled frame {} ({}/{})", video_id, frame.index, processed, total);
    })?;

    Ok((probe, detections))
}
