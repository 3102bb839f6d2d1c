use crate::domain::report::Report;
use crate::error::RepositoryError;
use async_trait::async_trait;
use serde::Serialize;

/// Files removed when a video is deleted, and the ones that could not be.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeletionReport {
    pub removed: Vec<String>,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Persist a report, replacing any previous one for the same video.
    async fn save(&self, report: &Report) -> Result<(), RepositoryError>;

    async fn load(&self, video_id: &str) -> Result<Report, RepositoryError>;

    /// Ids of every stored report.
    async fn list_ids(&self) -> Result<Vec<String>, RepositoryError>;

    /// Every readable report; unreadable records are skipped.
    async fn list_all(&self) -> Result<Vec<Report>, RepositoryError> {
        let mut reports = Vec::new();
        for id in self.list_ids().await? {
            match self.load(&id).await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::warn!("skipping report {}: {}", id, e),
            }
        }
        Ok(reports)
    }

    /// Remove the report together with the source video and thumbnails.
    /// Individual failures are collected, not raised.
    async fn delete(&self, video_id: &str) -> DeletionReport;
}
