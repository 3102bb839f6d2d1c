//! Configuration for the local single-machine deployment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_SAMPLE_FPS: f64 = 2.0;
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_DETECT_MAX_WIDTH: u32 = 640;
pub const DEFAULT_MERGE_GAP: f64 = 10.0;

/// Tunables of the scan pipeline and the segment aggregator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanSettings {
    /// Target samples per second of source video
    pub sample_rate: f64,
    /// Minimum detector score kept
    pub score_threshold: f64,
    /// Frames wider than this are downscaled before detection
    pub detect_max_width: u32,
    /// Maximum gap in seconds between detections of one segment
    pub merge_gap: f64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_FPS,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            detect_max_width: DEFAULT_DETECT_MAX_WIDTH,
            merge_gap: DEFAULT_MERGE_GAP,
        }
    }
}

impl ScanSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Values that do not parse
    /// keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            sample_rate: parse_or(&lookup, "SAMPLE_FPS", defaults.sample_rate),
            score_threshold: parse_or(&lookup, "SCORE_THRESHOLD", defaults.score_threshold),
            detect_max_width: parse_or(&lookup, "DETECT_MAX_WIDTH", defaults.detect_max_width),
            merge_gap: parse_or(&lookup, "MERGE_GAP", defaults.merge_gap),
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("{} has unparseable value {:?}, using {:?}", key, raw, default);
            default
        }),
        None => default,
    }
}

/// Configuration for local/monolith deployment.
#[derive(Clone, Debug)]
pub struct LocalConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Directory for uploaded videos, reports and thumbnails
    pub upload_dir: PathBuf,
    /// Content classifier endpoint
    pub detector_url: Option<String>,
    /// Primary person classifier endpoint
    pub person_detector_url: Option<String>,
    /// Secondary person classifier endpoint
    pub person_fallback_url: Option<String>,
    pub scan: ScanSettings,
}

impl LocalConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("5000")),
            upload_dir: PathBuf::from(
                env::var("UPLOAD_DIR").unwrap_or_else(|_| String::from("./uploads")),
            ),
            detector_url: non_empty_var("DETECTOR_URL"),
            person_detector_url: non_empty_var("PERSON_DETECTOR_URL"),
            person_fallback_url: non_empty_var("PERSON_FALLBACK_URL"),
            scan: ScanSettings::from_env(),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let settings = ScanSettings::from_lookup(|_| None);
        assert_eq!(settings, ScanSettings::default());
        assert_eq!(settings.sample_rate, 2.0);
        assert_eq!(settings.detect_max_width, 640);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let vars: HashMap<&str, &str> = [
            ("SAMPLE_FPS", "4"),
            ("SCORE_THRESHOLD", " 0.75 "),
            ("DETECT_MAX_WIDTH", "320"),
            ("MERGE_GAP", "2.5"),
        ]
        .into_iter()
        .collect();
        let settings = ScanSettings::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(settings.sample_rate, 4.0);
        assert_eq!(settings.score_threshold, 0.75);
        assert_eq!(settings.detect_max_width, 320);
        assert_eq!(settings.merge_gap, 2.5);
    }

    #[test]
    fn test_garbage_falls_back_to_default() {
        let settings = ScanSettings::from_lookup(|k| match k {
            "DETECT_MAX_WIDTH" => Some("wide".to_string()),
            "MERGE_GAP" => Some("-".to_string()),
            _ => None,
        });
        assert_eq!(settings.detect_max_width, DEFAULT_DETECT_MAX_WIDTH);
        assert_eq!(settings.merge_gap, DEFAULT_MERGE_GAP);
    }
}
