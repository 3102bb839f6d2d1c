//! Gap-based clustering of detections into reviewable time segments.

use super::detection::{BodyType, Detection};
use super::report::normalize_thumbnail_path;
use crate::config::DEFAULT_MERGE_GAP;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub class: String,
    /// Timestamp of the best-scoring member, not of the earliest one
    pub start: f64,
    pub end: f64,
    pub score: f64,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub body_type: BodyType,
    pub count: u64,
    /// Accumulator leftover found in some old records; dropped on repair.
    #[serde(default, rename = "best", skip_serializing_if = "Option::is_none")]
    pub stray_best: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentAggregator {
    merge_gap: f64,
}

impl Default for SegmentAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_GAP)
    }
}

impl SegmentAggregator {
    pub fn new(merge_gap: f64) -> Self {
        Self { merge_gap }
    }

    pub fn merge_gap(&self) -> f64 {
        self.merge_gap
    }

    /// Segments per class, classes in first-seen order. Output is not sorted
    /// by time across classes.
    pub fn aggregate(&self, detections: &[Detection]) -> Vec<Segment> {
        let mut classes: Vec<(&str, Vec<&Detection>)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for det in detections {
            let slot = *index.entry(det.class.as_str()).or_insert_with(|| {
                classes.push((det.class.as_str(), Vec::new()));
                classes.len() - 1
            });
            classes[slot].1.push(det);
        }

        let mut segments = Vec::new();
        for (class, mut items) in classes {
            items.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

            let mut items = items.into_iter();
            let Some(first) = items.next() else {
                continue;
            };
            let mut acc = Accumulator::seed(first);
            for item in items {
                if item.timestamp <= acc.end + self.merge_gap {
                    acc.merge(item);
                } else {
                    segments.push(acc.close(class));
                    acc = Accumulator::seed(item);
                }
            }
            segments.push(acc.close(class));
        }
        segments
    }
}

struct Accumulator<'a> {
    end: f64,
    max_score: f64,
    body_types: Vec<BodyType>,
    count: u64,
    best: &'a Detection,
}

impl<'a> Accumulator<'a> {
    fn seed(det: &'a Detection) -> Self {
        Self {
            end: det.timestamp,
            max_score: det.score,
            body_types: vec![det.body_type],
            count: 1,
            best: det,
        }
    }

    fn merge(&mut self, det: &'a Detection) {
        self.end = self.end.max(det.timestamp);
        self.max_score = self.max_score.max(det.score);
        self.body_types.push(det.body_type);
        self.count += 1;
        if det.score > self.best.score {
            self.best = det;
        }
    }

    fn close(self, class: &str) -> Segment {
        Segment {
            class: class.to_string(),
            start: self.best.timestamp,
            end: self.end,
            score: self.max_score,
            thumbnail: normalize_thumbnail_path(&self.best.thumbnail),
            body_type: mode(&self.body_types),
            count: self.count,
            stray_best: None,
        }
    }
}

/// Most frequent body type; ties go to the one seen first.
fn mode(body_types: &[BodyType]) -> BodyType {
    let mut counts: Vec<(BodyType, usize)> = Vec::new();
    for bt in body_types {
        match counts.iter_mut().find(|(seen, _)| seen == bt) {
            Some((_, n)) => *n += 1,
            None => counts.push((*bt, 1)),
        }
    }
    let mut winner: Option<(BodyType, usize)> = None;
    for (bt, n) in counts {
        if winner.map_or(true, |(_, best)| n > best) {
            winner = Some((bt, n));
        }
    }
    winner.map(|(bt, _)| bt).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(ts: f64, class: &str, score: f64) -> Detection {
        Detection {
            timestamp: ts,
            frame_index: (ts * 2.0) as u64,
            class: class.to_string(),
            score,
            bbox: [0.0; 4],
            body_type: BodyType::Unknown,
            thumbnail: format!("thumbs/v_f{}.jpg", (ts * 2.0) as u64),
        }
    }

    fn with_body(mut d: Detection, body_type: BodyType) -> Detection {
        d.body_type = body_type;
        d
    }

    #[test]
    fn test_reference_scenario() {
        let dets = vec![det(1.0, "A", 0.9), det(5.0, "A", 0.6), det(20.0, "A", 0.95)];
        let segments = SegmentAggregator::new(10.0).aggregate(&dets);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].class, "A");
        assert_eq!(segments[0].start, 1.0);
        assert_eq!(segments[0].end, 5.0);
        assert_eq!(segments[0].score, 0.9);
        assert_eq!(segments[0].count, 2);
        assert_eq!(segments[1].start, 20.0);
        assert_eq!(segments[1].end, 20.0);
        assert_eq!(segments[1].score, 0.95);
        assert_eq!(segments[1].count, 1);
    }

    #[test]
    fn test_empty_input_gives_no_segments() {
        assert!(SegmentAggregator::default().aggregate(&[]).is_empty());
    }

    #[test]
    fn test_isolated_detections_get_one_segment_each() {
        let dets = vec![det(0.0, "A", 0.5), det(10.5, "A", 0.6), det(21.0, "A", 0.7)];
        let segments = SegmentAggregator::new(10.0).aggregate(&dets);
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| s.count == 1 && s.start == s.end));
    }

    #[test]
    fn test_gap_boundary_is_inclusive() {
        let dets = vec![det(0.0, "A", 0.5), det(10.0, "A", 0.6)];
        let segments = SegmentAggregator::new(10.0).aggregate(&dets);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end, 10.0);
    }

    #[test]
    fn test_start_jumps_to_best_member() {
        let dets = vec![
            det(2.0, "A", 0.55),
            det(4.0, "A", 0.99),
            det(6.0, "A", 0.7),
        ];
        let segments = SegmentAggregator::new(10.0).aggregate(&dets);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 4.0);
        assert_eq!(segments[0].end, 6.0);
        assert_eq!(segments[0].score, 0.99);
        assert_eq!(segments[0].count, 3);
        assert_eq!(segments[0].thumbnail, "thumbs/v_f8.jpg");
    }

    #[test]
    fn test_best_is_replaced_only_on_strictly_higher_score() {
        let dets = vec![det(1.0, "A", 0.8), det(3.0, "A", 0.8)];
        let segments = SegmentAggregator::default().aggregate(&dets);
        assert_eq!(segments[0].start, 1.0);
    }

    #[test]
    fn test_unsorted_input_is_sorted_per_class() {
        let dets = vec![det(30.0, "A", 0.6), det(1.0, "A", 0.9), det(25.0, "A", 0.7)];
        let segments = SegmentAggregator::new(10.0).aggregate(&dets);
        assert_eq!(segments.len(), 2);
        assert_eq!((segments[0].start, segments[0].end), (1.0, 1.0));
        assert_eq!((segments[1].start, segments[1].end), (25.0, 30.0));
    }

    #[test]
    fn test_classes_are_grouped_in_first_seen_order() {
        let dets = vec![
            det(50.0, "B", 0.9),
            det(1.0, "A", 0.9),
            det(60.0, "B", 0.9),
            det(2.0, "A", 0.9),
        ];
        let segments = SegmentAggregator::new(10.0).aggregate(&dets);
        let order: Vec<&str> = segments.iter().map(|s| s.class.as_str()).collect();
        assert_eq!(order, vec!["B", "A"]);
    }

    #[test]
    fn test_body_type_mode_with_first_seen_tie_break() {
        let dets = vec![
            with_body(det(1.0, "A", 0.6), BodyType::UpperBody),
            with_body(det(2.0, "A", 0.6), BodyType::FullBody),
            with_body(det(3.0, "A", 0.6), BodyType::FullBody),
            with_body(det(4.0, "A", 0.6), BodyType::UpperBody),
        ];
        let segments = SegmentAggregator::default().aggregate(&dets);
        assert_eq!(segments[0].body_type, BodyType::UpperBody);

        let dets = vec![
            with_body(det(1.0, "A", 0.6), BodyType::Multiple),
            with_body(det(2.0, "A", 0.6), BodyType::FullBody),
            with_body(det(3.0, "A", 0.6), BodyType::FullBody),
        ];
        let segments = SegmentAggregator::default().aggregate(&dets);
        assert_eq!(segments[0].body_type, BodyType::FullBody);
    }

    #[test]
    fn test_thumbnail_is_normalized() {
        let mut d = det(1.0, "A", 0.9);
        d.thumbnail = "\\thumbs\\v_f2.jpg".to_string();
        let segments = SegmentAggregator::default().aggregate(&[d]);
        assert_eq!(segments[0].thumbnail, "thumbs/v_f2.jpg");
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let dets: Vec<Detection> = (0..40)
            .map(|i| det(i as f64 * 3.7, if i % 3 == 0 { "A" } else { "B" }, 0.5 + (i % 5) as f64 / 10.0))
            .collect();
        let aggregator = SegmentAggregator::new(5.0);
        let first = serde_json::to_string(&aggregator.aggregate(&dets)).unwrap();
        let second = serde_json::to_string(&aggregator.aggregate(&dets)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_stray_best_is_not_serialized_when_absent() {
        let segments = SegmentAggregator::default().aggregate(&[det(1.0, "A", 0.9)]);
        let value = serde_json::to_value(&segments[0]).unwrap();
        assert!(value.get("best").is_none());
    }
}
