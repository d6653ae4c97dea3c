use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, ObjectClass};

/// Deterministic backend that replays a fixed detection script.
///
/// Each `detect` call returns the next entry, wrapping at the end. Used for
/// `stub://` cameras and tests where no model is available.
pub struct ScriptedBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self { script, cursor: 0 }
    }

    /// Person and toothbrush in every frame.
    pub fn always_brushing() -> Self {
        Self::new(vec![brushing_frame(0.82, 0.61)])
    }

    /// Brushing with periodic short dropouts of the toothbrush.
    ///
    /// Twelve frames out of every fifteen carry both classes; the other three
    /// only see the person, as happens when the brush is occluded.
    pub fn intermittent() -> Self {
        let mut script = Vec::with_capacity(15);
        for i in 0..15 {
            if i < 12 {
                script.push(brushing_frame(0.80, 0.55 + (i as f32) * 0.01));
            } else {
                script.push(vec![person(0.78)]);
            }
        }
        Self::new(script)
    }

    /// Empty scene.
    pub fn empty() -> Self {
        Self::new(vec![Vec::new()])
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<Detection>> {
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let frame = self.script[self.cursor % self.script.len()].clone();
        self.cursor = self.cursor.wrapping_add(1);
        Ok(frame)
    }
}

fn person(confidence: f32) -> Detection {
    Detection::new(ObjectClass::PERSON, confidence, [120.0, 40.0, 520.0, 470.0])
}

fn brushing_frame(person_conf: f32, brush_conf: f32) -> Vec<Detection> {
    vec![
        person(person_conf),
        Detection::new(
            ObjectClass::TOOTHBRUSH,
            brush_conf,
            [300.0, 210.0, 360.0, 240.0],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_backend_cycles() -> Result<()> {
        let mut backend = ScriptedBackend::new(vec![vec![person(0.5)], vec![]]);
        assert_eq!(backend.detect(b"a", 1, 1)?.len(), 1);
        assert!(backend.detect(b"a", 1, 1)?.is_empty());
        assert_eq!(backend.detect(b"a", 1, 1)?.len(), 1);
        Ok(())
    }

    #[test]
    fn intermittent_script_drops_toothbrush() -> Result<()> {
        let mut backend = ScriptedBackend::intermittent();
        let frames: Vec<Vec<Detection>> = (0..15)
            .map(|_| backend.detect(b"", 0, 0))
            .collect::<Result<_>>()?;
        let with_brush = frames
            .iter()
            .filter(|f| f.iter().any(|d| d.class == ObjectClass::TOOTHBRUSH))
            .count();
        assert_eq!(with_brush, 12);
        Ok(())
    }

    #[test]
    fn empty_script_returns_nothing() -> Result<()> {
        let mut backend = ScriptedBackend::new(Vec::new());
        assert!(backend.detect(b"", 0, 0)?.is_empty());
        assert!(ScriptedBackend::empty().detect(b"", 0, 0)?.is_empty());
        Ok(())
    }
}
