use anyhow::{anyhow, Context, Result};

use crate::detect::registry::SharedBackend;
use crate::detect::result::{Detection, ObjectClass};
use crate::frame::Frame;

/// Keep detections whose class is allowed and whose confidence reaches the floor.
///
/// The floor is inclusive. An empty allow-list admits nothing.
pub fn filter_detections(
    detections: Vec<Detection>,
    confidence_floor: f32,
    allowed_classes: &[ObjectClass],
) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|det| allowed_classes.contains(&det.class))
        .filter(|det| det.confidence >= confidence_floor)
        .collect()
}

/// Frame → detections capability used by the capture loop.
#[derive(Clone)]
pub struct DetectionAdapter {
    backend: SharedBackend,
    name: String,
}

impl DetectionAdapter {
    pub fn new(backend: SharedBackend) -> Result<Self> {
        let name = backend
            .lock()
            .map_err(|_| anyhow!("detector backend lock poisoned"))?
            .name()
            .to_string();
        Ok(Self { backend, name })
    }

    /// Backend name, carried into issued proofs.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn warm_up(&self) -> Result<()> {
        let mut guard = self
            .backend
            .lock()
            .map_err(|_| anyhow!("detector backend lock poisoned"))?;
        guard.warm_up()
    }

    pub fn detect(
        &self,
        frame: &Frame,
        confidence_floor: f32,
        allowed_classes: &[ObjectClass],
    ) -> Result<Vec<Detection>> {
        let raw = {
            let mut guard = self
                .backend
                .lock()
                .map_err(|_| anyhow!("detector backend lock poisoned"))?;
            guard
                .detect(frame.pixels(), frame.width, frame.height)
                .with_context(|| format!("{} detection failed", self.name))?
        };
        Ok(filter_detections(raw, confidence_floor, allowed_classes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BackendRegistry, ScriptedBackend};

    fn det(class: ObjectClass, confidence: f32) -> Detection {
        Detection::new(class, confidence, [0.0, 0.0, 1.0, 1.0])
    }

    #[test]
    fn filter_applies_floor_inclusively() {
        let dets = vec![
            det(ObjectClass::PERSON, 0.40),
            det(ObjectClass::PERSON, 0.39),
            det(ObjectClass::TOOTHBRUSH, 0.9),
        ];
        let kept = filter_detections(dets, 0.40, &[ObjectClass::PERSON, ObjectClass::TOOTHBRUSH]);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|d| d.confidence >= 0.40));
    }

    #[test]
    fn filter_drops_classes_outside_allow_list() {
        let dets = vec![det(ObjectClass(41), 0.99), det(ObjectClass::PERSON, 0.5)];
        let kept = filter_detections(dets.clone(), 0.1, &[ObjectClass::PERSON]);
        assert_eq!(kept, vec![det(ObjectClass::PERSON, 0.5)]);
        assert!(filter_detections(dets, 0.0, &[]).is_empty());
    }

    #[test]
    fn adapter_runs_backend_then_filters() -> Result<()> {
        let mut registry = BackendRegistry::new();
        registry.register(ScriptedBackend::new(vec![vec![
            det(ObjectClass::PERSON, 0.8),
            det(ObjectClass::TOOTHBRUSH, 0.3),
            det(ObjectClass(41), 0.9),
        ]]));
        let adapter = DetectionAdapter::new(registry.resolve(None)?)?;
        assert_eq!(adapter.name(), "scripted");

        let frame = Frame::new(vec![0u8; 12], 2, 2, 1)?;
        let kept = adapter.detect(
            &frame,
            0.4,
            &[ObjectClass::PERSON, ObjectClass::TOOTHBRUSH],
        )?;
        assert_eq!(kept, vec![det(ObjectClass::PERSON, 0.8)]);
        Ok(())
    }
}
