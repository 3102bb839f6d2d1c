//! Moderator - Video Content Scanning Library
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (jobs, detections, segments, reports, av)
//! - ports/: Trait definitions (classifier capabilities, report repository)
//! - adapters/: Concrete implementations (filesystem, HTTP classifiers, axum API)
//! - application/: Services (job registry, scanner, maintenance)
//! - config: Environment configuration
//! - error: Error types

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use config::{LocalConfig, ScanSettings};
pub use domain::av;
