//! Local adapters for single-machine deployment.

pub mod classifiers;
pub mod fs;
pub mod http;

pub use classifiers::{HttpBodyClassifier, HttpDetector, NoOpDetector};
pub use fs::FsReportStore;
