//! Domain layer - Pure business logic.

pub mod av;
pub mod detection;
pub mod jobs;
pub mod layout;
pub mod report;
pub mod segments;
