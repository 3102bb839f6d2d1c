//! Ports - Trait definitions implemented by adapters.

pub mod detector;
pub mod repository;
