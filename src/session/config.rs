use serde::{Deserialize, Serialize};

use crate::error::SessionError;

pub const DEFAULT_REQUIRED_SECS: f64 = 20.0;
pub const DEFAULT_GRACE_SECS: f64 = 0.75;
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.40;

/// Thresholds applied to a session at reset.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds of accumulated activity needed to complete the session.
    #[serde(alias = "required_sec")]
    pub required_duration: f64,
    /// Longest gap (seconds) since the last candidate frame that still counts.
    #[serde(alias = "grace_sec")]
    pub grace_duration: f64,
    /// Per-detection acceptance threshold used upstream by the detector.
    #[serde(alias = "conf_thres")]
    pub confidence_floor: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            required_duration: DEFAULT_REQUIRED_SECS,
            grace_duration: DEFAULT_GRACE_SECS,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
        }
    }
}

impl SessionConfig {
    pub fn new(required_duration: f64, grace_duration: f64, confidence_floor: f32) -> Self {
        Self {
            required_duration,
            grace_duration,
            confidence_floor,
        }
    }

    /// Reject out-of-range thresholds. Values are never clamped.
    pub fn validate(&self) -> Result<(), SessionError> {
        if !self.required_duration.is_finite() || self.required_duration <= 0.0 {
            return Err(SessionError::InvalidConfiguration(format!(
                "required_duration must be a finite value > 0 (got {})",
                self.required_duration
            )));
        }
        if !self.grace_duration.is_finite() || self.grace_duration < 0.0 {
            return Err(SessionError::InvalidConfiguration(format!(
                "grace_duration must be a finite value >= 0 (got {})",
                self.grace_duration
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(SessionError::InvalidConfiguration(format!(
                "confidence_floor must be within [0, 1] (got {})",
                self.confidence_floor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_required_duration() {
        for required in [0.0, -1.0, f64::NAN] {
            let cfg = SessionConfig::new(required, 0.5, 0.4);
            assert!(matches!(
                cfg.validate(),
                Err(SessionError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn rejects_negative_grace_and_out_of_range_floor() {
        assert!(SessionConfig::new(2.0, -0.1, 0.4).validate().is_err());
        assert!(SessionConfig::new(2.0, f64::INFINITY, 0.4).validate().is_err());
        assert!(SessionConfig::new(2.0, 0.5, 1.01).validate().is_err());
        assert!(SessionConfig::new(2.0, 0.5, -0.01).validate().is_err());
        assert!(SessionConfig::new(2.0, 0.5, f32::NAN).validate().is_err());
    }

    #[test]
    fn accepts_boundary_values() {
        assert!(SessionConfig::new(0.001, 0.0, 0.0).validate().is_ok());
        assert!(SessionConfig::new(1.0, 0.0, 1.0).validate().is_ok());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: SessionConfig = serde_json::from_str(r#"{"grace_duration": 2.0}"#).unwrap();
        assert_eq!(cfg.required_duration, DEFAULT_REQUIRED_SECS);
        assert_eq!(cfg.grace_duration, 2.0);
        assert_eq!(cfg.confidence_floor, DEFAULT_CONFIDENCE_FLOOR);
    }

    #[test]
    fn deserializes_legacy_field_names() {
        let cfg: SessionConfig = serde_json::from_str(
            r#"{"required_sec": 30.0, "grace_sec": 1.0, "conf_thres": 0.5}"#,
        )
        .unwrap();
        assert_eq!(cfg, SessionConfig::new(30.0, 1.0, 0.5));
    }
}
