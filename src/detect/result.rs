use serde::{Deserialize, Serialize};

/// COCO class id as emitted by YOLO-family detectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectClass(pub u16);

impl ObjectClass {
    pub const PERSON: ObjectClass = ObjectClass(0);
    pub const TOOTHBRUSH: ObjectClass = ObjectClass(79);

    /// Human-readable label. Classes outside the tracked set render as `cls_<id>`.
    pub fn label(self) -> String {
        match self {
            Self::PERSON => "person".to_string(),
            Self::TOOTHBRUSH => "toothbrush".to_string(),
            ObjectClass(id) => format!("cls_{id}"),
        }
    }

    /// Parse a label or a bare numeric class id.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        match label.to_ascii_lowercase().as_str() {
            "person" => Some(Self::PERSON),
            "toothbrush" => Some(Self::TOOTHBRUSH),
            other => other
                .strip_prefix("cls_")
                .unwrap_or(other)
                .parse::<u16>()
                .ok()
                .map(ObjectClass),
        }
    }
}

/// Classes the brushing check requires by default.
pub const DEFAULT_REQUIRED_CLASSES: [ObjectClass; 2] = [ObjectClass::PERSON, ObjectClass::TOOTHBRUSH];

/// One detected object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "cls")]
    pub class: ObjectClass,
    #[serde(rename = "conf")]
    pub confidence: f32,
    /// Box corners `[x1, y1, x2, y2]` in source pixel coordinates.
    #[serde(rename = "xyxy")]
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn new(class: ObjectClass, confidence: f32, bbox: [f32; 4]) -> Self {
        Self {
            class,
            confidence,
            bbox,
        }
    }

    pub fn area(&self) -> f32 {
        let [x1, y1, x2, y2] = self.bbox;
        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }

    /// Intersection over union of two boxes.
    pub fn iou(&self, other: &Detection) -> f32 {
        let [ax1, ay1, ax2, ay2] = self.bbox;
        let [bx1, by1, bx2, by2] = other.bbox;
        let iw = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
        let ih = (ay2.min(by2) - ay1.max(by1)).max(0.0);
        let inter = iw * ih;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}
