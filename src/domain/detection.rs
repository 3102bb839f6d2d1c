use serde::{Deserialize, Serialize};

/// Person box height to frame height ratio at or above which the subject is
/// shown in full.
pub const FULL_BODY_RATIO: f64 = 0.6;
pub const UPPER_BODY_RATIO: f64 = 0.35;

/// Coarse framing of the person in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    FullBody,
    UpperBody,
    PartialOrFace,
    Multiple,
    #[default]
    Unknown,
}

impl BodyType {
    pub fn as_str(self) -> &'static str {
        match self {
            BodyType::FullBody => "full_body",
            BodyType::UpperBody => "upper_body",
            BodyType::PartialOrFace => "partial_or_face",
            BodyType::Multiple => "multiple",
            BodyType::Unknown => "unknown",
        }
    }
}

/// `[x, y, w, h]` in pixels of the frame the detector saw.
pub type BoundingBox = [f64; 4];

/// One hit as returned by a content detector, before thresholding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(default = "unknown_class", alias = "label")]
    pub class: String,
    #[serde(default)]
    pub score: f64,
    #[serde(rename = "box", default)]
    pub bbox: BoundingBox,
}

fn unknown_class() -> String {
    "unknown".to_string()
}

/// Persons found in a frame by a body classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonBoxes {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,
}

impl PersonBoxes {
    pub fn new(bounding_boxes: Vec<BoundingBox>) -> Self {
        Self {
            count: bounding_boxes.len(),
            bounding_boxes,
        }
    }

    /// Classify framing from box geometry: no person is `unknown`, several are
    /// `multiple`, a single one is graded by its height relative to the frame.
    pub fn body_type(&self, frame_height: u32) -> BodyType {
        match self.bounding_boxes.as_slice() {
            [] => BodyType::Unknown,
            [single] => {
                if frame_height == 0 {
                    return BodyType::Unknown;
                }
                let ratio = single[3] / f64::from(frame_height);
                if ratio >= FULL_BODY_RATIO {
                    BodyType::FullBody
                } else if ratio >= UPPER_BODY_RATIO {
                    BodyType::UpperBody
                } else {
                    BodyType::PartialOrFace
                }
            }
            _ => BodyType::Multiple,
        }
    }
}

/// One (frame, class) hit above the score threshold. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub timestamp: f64,
    pub frame_index: u64,
    pub class: String,
    pub score: f64,
    #[serde(rename = "box", default)]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub body_type: BodyType,
    /// Relative path under the upload root, or empty
    #[serde(default)]
    pub thumbnail: String,
}
