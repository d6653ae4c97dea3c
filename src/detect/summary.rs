use serde::{Deserialize, Serialize};

use crate::detect::result::{Detection, ObjectClass};

/// Best confidence seen for one required class in a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassPresence {
    pub label: String,
    pub cls: ObjectClass,
    pub visible: bool,
    pub best_confidence: f32,
}

/// Labeled detection as reported to status readers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledDetection {
    pub label: String,
    #[serde(flatten)]
    pub detection: Detection,
}

/// Per-frame perception snapshot. Observability only; the accumulator never reads it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub sequence: u64,
    pub detections: Vec<LabeledDetection>,
    pub classes: Vec<ClassPresence>,
    /// All required classes are present above the floor.
    pub candidate: bool,
    /// Minimum best confidence over visible required classes, 0 when none are visible.
    pub confidence: f32,
}

impl FrameSummary {
    /// Reduce already-filtered detections against the required class set.
    pub fn from_detections(
        sequence: u64,
        detections: Vec<Detection>,
        required_classes: &[ObjectClass],
    ) -> Self {
        let classes: Vec<ClassPresence> = required_classes
            .iter()
            .map(|&cls| {
                let best = detections
                    .iter()
                    .filter(|det| det.class == cls)
                    .map(|det| det.confidence)
                    .fold(None, |best: Option<f32>, conf| {
                        Some(best.map_or(conf, |b| b.max(conf)))
                    });
                ClassPresence {
                    label: cls.label(),
                    cls,
                    visible: best.is_some(),
                    best_confidence: best.unwrap_or(0.0),
                }
            })
            .collect();

        let candidate = !classes.is_empty() && classes.iter().all(|c| c.visible);
        let confidence = classes
            .iter()
            .filter(|c| c.visible)
            .map(|c| c.best_confidence)
            .fold(None, |min: Option<f32>, conf| {
                Some(min.map_or(conf, |m| m.min(conf)))
            })
            .unwrap_or(0.0);

        let detections = detections
            .into_iter()
            .map(|detection| LabeledDetection {
                label: detection.class.label(),
                detection,
            })
            .collect();

        Self {
            sequence,
            detections,
            classes,
            candidate,
            confidence,
        }
    }

    pub fn presence(&self, cls: ObjectClass) -> Option<&ClassPresence> {
        self.classes.iter().find(|c| c.cls == cls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DEFAULT_REQUIRED_CLASSES;

    fn det(class: ObjectClass, confidence: f32) -> Detection {
        Detection::new(class, confidence, [1.0, 2.0, 3.0, 4.0])
    }

    #[test]
    fn candidate_requires_every_class() {
        let both = FrameSummary::from_detections(
            1,
            vec![
                det(ObjectClass::PERSON, 0.9),
                det(ObjectClass::PERSON, 0.6),
                det(ObjectClass::TOOTHBRUSH, 0.5),
            ],
            &DEFAULT_REQUIRED_CLASSES,
        );
        assert!(both.candidate);
        assert_eq!(both.presence(ObjectClass::PERSON).unwrap().best_confidence, 0.9);
        assert_eq!(both.confidence, 0.5);
        assert_eq!(both.detections.len(), 3);
        assert_eq!(both.detections[2].label, "toothbrush");

        let person_only = FrameSummary::from_detections(
            2,
            vec![det(ObjectClass::PERSON, 0.7)],
            &DEFAULT_REQUIRED_CLASSES,
        );
        assert!(!person_only.candidate);
        assert_eq!(person_only.confidence, 0.7);
        let brush = person_only.presence(ObjectClass::TOOTHBRUSH).unwrap();
        assert!(!brush.visible);
        assert_eq!(brush.best_confidence, 0.0);
    }

    #[test]
    fn empty_frame_has_zero_confidence() {
        let summary = FrameSummary::from_detections(3, vec![], &DEFAULT_REQUIRED_CLASSES);
        assert!(!summary.candidate);
        assert_eq!(summary.confidence, 0.0);
    }

    #[test]
    fn no_required_classes_is_never_a_candidate() {
        let summary = FrameSummary::from_detections(4, vec![det(ObjectClass::PERSON, 0.9)], &[]);
        assert!(!summary.candidate);
    }

    #[test]
    fn serializes_with_short_wire_names() {
        let summary = FrameSummary::from_detections(
            5,
            vec![det(ObjectClass::TOOTHBRUSH, 0.5)],
            &DEFAULT_REQUIRED_CLASSES,
        );
        let json = serde_json::to_value(&summary).unwrap();
        let first = &json["detections"][0];
        assert_eq!(first["label"], "toothbrush");
        assert_eq!(first["cls"], 79);
        assert_eq!(first["xyxy"][2], 3.0);
    }
}
