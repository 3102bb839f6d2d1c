//! Application services - Use cases over the domain and the ports.

pub mod jobs;
pub mod maintenance;
pub mod scanner;
