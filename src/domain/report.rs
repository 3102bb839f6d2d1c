//! The durable per-video scan record and the read-side helpers used by the
//! listing and viewer surfaces.

use super::detection::Detection;
use super::segments::Segment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Original upload filename
    pub video: String,
    pub video_id: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub fps: f64,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub best_thumbnail: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub scan_time: f64,
}

impl Report {
    /// Highest scoring detection; the earliest one wins a tie.
    pub fn best_detection(&self) -> Option<&Detection> {
        best_detection(&self.detections)
    }

    /// Where the viewer should seek first.
    pub fn first_timestamp(&self) -> f64 {
        self.segments
            .first()
            .map(|s| s.start)
            .or_else(|| self.detections.first().map(|d| d.timestamp))
            .unwrap_or(0.0)
    }

    pub fn is_safe(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn view_path(&self) -> String {
        if self.is_safe() {
            format!("/view/{}?safe=1", self.video_id)
        } else {
            format!("/view/{}?t={}", self.video_id, self.first_timestamp())
        }
    }

    /// Classes ordered by how often they were detected, or `SAFE`.
    pub fn tags(&self) -> Vec<String> {
        if self.detections.is_empty() {
            return vec!["SAFE".to_string()];
        }
        let mut order: Vec<(&str, usize)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for det in &self.detections {
            match index.get(det.class.as_str()) {
                Some(&i) => order[i].1 += 1,
                None => {
                    index.insert(det.class.as_str(), order.len());
                    order.push((det.class.as_str(), 1));
                }
            }
        }
        // stable: equal counts keep first-seen order
        order.sort_by(|a, b| b.1.cmp(&a.1));
        order.into_iter().map(|(c, _)| c.to_string()).collect()
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            video_id: self.video_id.clone(),
            video_name: self.video.clone(),
            first_ts: self.first_timestamp(),
            thumb: normalize_thumbnail_path(&self.best_thumbnail),
            tags: self.tags(),
            scan_time: self.scan_time,
            scan_time_readable: format_time(self.scan_time),
        }
    }

    /// Copy with every thumbnail normalized for serving; entries without a
    /// thumbnail fall back to the best thumbnail.
    pub fn for_display(&self) -> Report {
        let mut report = self.clone();
        let best = normalize_thumbnail_path(&report.best_thumbnail);
        let best = best.rsplit('/').next().unwrap_or_default().to_string();
        for det in &mut report.detections {
            det.thumbnail = display_thumbnail(&det.thumbnail, &best);
        }
        for seg in &mut report.segments {
            seg.thumbnail = display_thumbnail(&seg.thumbnail, &best);
        }
        report
    }
}

fn display_thumbnail(path: &str, best: &str) -> String {
    if path.is_empty() {
        best.to_string()
    } else {
        normalize_thumbnail_path(path)
    }
}

pub fn best_detection(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().fold(None, |best: Option<&Detection>, det| match best {
        Some(b) if det.score <= b.score => Some(b),
        _ => Some(det),
    })
}

/// A listing card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub video_id: String,
    pub video_name: String,
    pub first_ts: f64,
    pub thumb: String,
    pub tags: Vec<String>,
    pub scan_time: f64,
    pub scan_time_readable: String,
}

/// Forward slashes, no leading slash.
pub fn normalize_thumbnail_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

/// `X.Ys` below a minute, `Mm X.Ys` from a minute on.
pub fn format_time(secs: f64) -> String {
    let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    if secs >= 60.0 {
        let minutes = (secs / 60.0).floor();
        let rem = secs - minutes * 60.0;
        format!("{}m {:.1}s", minutes as u64, rem)
    } else {
        format!("{:.1}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::detection::BodyType;

    fn det(ts: f64, class: &str, score: f64, thumb: &str) -> Detection {
        Detection {
            timestamp: ts,
            frame_index: (ts * 30.0) as u64,
            class: class.to_string(),
            score,
            bbox: [0.0; 4],
            body_type: BodyType::Unknown,
            thumbnail: thumb.to_string(),
        }
    }

    fn report(detections: Vec<Detection>) -> Report {
        Report {
            video: "clip.mp4".to_string(),
            video_id: "abc".to_string(),
            duration: 30.0,
            fps: 30.0,
            detections,
            best_thumbnail: String::new(),
            segments: vec![],
            scan_time: 4.2,
        }
    }

    #[test]
    fn test_normalize_thumbnail_path() {
        assert_eq!(normalize_thumbnail_path("thumbs\\a_f1.jpg"), "thumbs/a_f1.jpg");
        assert_eq!(normalize_thumbnail_path("/thumbs/a_f1.jpg"), "thumbs/a_f1.jpg");
        assert_eq!(normalize_thumbnail_path("\\\\thumbs\\a.jpg"), "thumbs/a.jpg");
        assert_eq!(normalize_thumbnail_path(""), "");
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(-3.0), "0.0s");
        assert_eq!(format_time(12.34), "12.3s");
        assert_eq!(format_time(60.0), "1m 0.0s");
        assert_eq!(format_time(125.5), "2m 5.5s");
        assert_eq!(format_time(f64::NAN), "0.0s");
    }

    #[test]
    fn test_best_detection_prefers_first_on_tie() {
        let dets = vec![
            det(1.0, "A", 0.9, "t1"),
            det(2.0, "B", 0.95, "t2"),
            det(3.0, "A", 0.95, "t3"),
        ];
        assert_eq!(best_detection(&dets).unwrap().thumbnail, "t2");
        assert!(best_detection(&[]).is_none());
    }

    #[test]
    fn test_tags_by_frequency() {
        let rep = report(vec![
            det(1.0, "B", 0.9, ""),
            det(2.0, "A", 0.9, ""),
            det(3.0, "A", 0.9, ""),
            det(4.0, "C", 0.9, ""),
        ]);
        assert_eq!(rep.tags(), vec!["A", "B", "C"]);
        assert_eq!(report(vec![]).tags(), vec!["SAFE"]);
    }

    #[test]
    fn test_view_path() {
        let rep = report(vec![det(7.5, "A", 0.9, "")]);
        assert_eq!(rep.view_path(), "/view/abc?t=7.5");
        assert_eq!(report(vec![]).view_path(), "/view/abc?safe=1");
    }

    #[test]
    fn test_for_display_falls_back_to_best() {
        let mut rep = report(vec![det(1.0, "A", 0.9, ""), det(2.0, "A", 0.8, "\\thumbs\\abc_f60.jpg")]);
        rep.best_thumbnail = "abc_best.jpg".to_string();
        let shown = rep.for_display();
        assert_eq!(shown.detections[0].thumbnail, "abc_best.jpg");
        assert_eq!(shown.detections[1].thumbnail, "thumbs/abc_f60.jpg");
        // source record untouched
        assert_eq!(rep.detections[1].thumbnail, "\\thumbs\\abc_f60.jpg");
    }

    #[test]
    fn test_old_records_without_optional_fields_load() {
        let rep: Report = serde_json::from_str(
            r#"{"video":"v.mp4","video_id":"x","detections":[{"timestamp":1,"frame_index":30,"class":"A","score":0.7}]}"#,
        )
        .unwrap();
        assert!(rep.segments.is_empty());
        assert_eq!(rep.best_thumbnail, "");
        assert_eq!(rep.detections[0].body_type, BodyType::Unknown);
    }
}
