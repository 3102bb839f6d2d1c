use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }
}

/// Live status of one video scan. Job ids and video ids are the same token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub state: JobState,
    pub stage: String,
    pub percent: f64,
    pub processed: u64,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Unix seconds at job creation
    pub start_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_time: Option<f64>,
}

impl Job {
    pub fn queued(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: JobState::Queued,
            stage: "queued".to_string(),
            percent: 0.0,
            processed: 0,
            total: 0,
            fps: None,
            total_frames: None,
            duration: None,
            start_time: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            elapsed: None,
            eta: None,
            error: None,
            view: None,
            scan_time: None,
        }
    }

    /// Merge a partial update, last write wins per field.
    pub fn apply(&mut self, update: JobUpdate) {
        if let Some(state) = update.state {
            self.state = state;
        }
        if let Some(stage) = update.stage {
            self.stage = stage;
        }
        if let Some(percent) = update.percent {
            self.percent = percent;
        }
        if let Some(processed) = update.processed {
            self.processed = processed;
        }
        if let Some(total) = update.total {
            self.total = total;
        }
        if update.fps.is_some() {
            self.fps = update.fps;
        }
        if update.total_frames.is_some() {
            self.total_frames = update.total_frames;
        }
        if update.duration.is_some() {
            self.duration = update.duration;
        }
        if update.elapsed.is_some() {
            self.elapsed = update.elapsed;
        }
        if update.eta.is_some() {
            self.eta = update.eta;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        if update.view.is_some() {
            self.view = update.view;
        }
        if update.scan_time.is_some() {
            self.scan_time = update.scan_time;
        }
    }

    /// Record sampling progress. `total` is the up-front estimate and is never
    /// corrected here, so `percent` saturates at 100 when the decode yields
    /// more samples than estimated.
    pub fn record_progress(&mut self, processed: u64, elapsed: Duration) {
        let progress = Progress::compute(processed, self.total, elapsed);
        self.processed = processed;
        self.percent = self.percent.max(progress.percent);
        self.elapsed = Some(elapsed.as_secs_f64());
        self.eta = progress.eta;
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            eta_readable: self.eta.map(format_eta),
            job: self.clone(),
        }
    }
}

/// Partial job fields for [`Job::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub state: Option<JobState>,
    pub stage: Option<String>,
    pub percent: Option<f64>,
    pub processed: Option<u64>,
    pub total: Option<u64>,
    pub fps: Option<f64>,
    pub total_frames: Option<u64>,
    pub duration: Option<f64>,
    pub elapsed: Option<f64>,
    pub eta: Option<f64>,
    pub error: Option<String>,
    pub view: Option<String>,
    pub scan_time: Option<f64>,
}

impl JobUpdate {
    pub fn stage(stage: impl Into<String>) -> Self {
        Self {
            stage: Some(stage.into()),
            ..Self::default()
        }
    }
}

/// What the polling client sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    #[serde(flatten)]
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_readable: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub percent: f64,
    pub eta: Option<f64>,
}

impl Progress {
    pub fn compute(processed: u64, total: u64, elapsed: Duration) -> Self {
        let fraction = (processed as f64 / total.max(1) as f64).min(1.0);
        let percent = (fraction * 1000.0).round() / 10.0;
        let elapsed = elapsed.as_secs_f64();
        let eta = if fraction > 0.0 {
            Some((elapsed / fraction - elapsed).max(0.0))
        } else {
            None
        };
        Self { percent, eta }
    }
}

/// Expected number of samples for a video, computed once before sampling.
pub fn estimate_total_samples(duration: f64, sample_rate: f64) -> u64 {
    if duration > 0.0 && sample_rate > 0.0 {
        ((duration * sample_rate).ceil() as u64).max(1)
    } else {
        1
    }
}

pub fn format_eta(eta: f64) -> String {
    let eta = eta.max(0.0);
    let minutes = (eta / 60.0).floor() as u64;
    let seconds = (eta % 60.0).floor() as u64;
    format!("{}m {}s", minutes, seconds)
}
