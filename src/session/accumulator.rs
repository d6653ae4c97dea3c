//! Grace-window accumulation state machine.
//!
//! `SessionAccumulator` turns a stream of per-frame candidate flags into an
//! accumulated-duration counter. Gaps up to `grace_duration` since the last
//! candidate frame keep counting; longer gaps pause progress without
//! discarding it. Once the counter reaches `required_duration` a `Proof` is
//! minted and the state freezes until the next `reset`.
//!
//! The accumulator performs no locking. `SharedSession` wraps it for
//! concurrent use.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::session::config::SessionConfig;

pub const PROOF_EVENT_COMPLETE: &str = "complete";

/// Immutable completion record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    pub event: String,
    pub required_duration: f64,
    pub accumulated_duration_at_completion: f64,
    /// Session clock reading (seconds) of the completing frame.
    pub completed_at: f64,
    pub confidence_floor: f32,
}

/// What a single `advance` call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Elapsed time was added; threshold not reached yet.
    Accumulated,
    /// Outside the grace window; progress held.
    Paused,
    /// This call crossed the threshold and minted the proof.
    Completed,
    /// A proof already exists; nothing changed.
    AlreadyComplete,
}

/// Copy of the accumulator fields at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AccumulatorView {
    pub config: SessionConfig,
    pub accumulated_duration: f64,
    pub last_candidate_timestamp: Option<f64>,
    pub proof: Option<Proof>,
}

#[derive(Clone, Debug)]
pub struct SessionAccumulator {
    config: SessionConfig,
    accumulated_duration: f64,
    last_candidate_timestamp: Option<f64>,
    proof: Option<Proof>,
}

impl SessionAccumulator {
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            accumulated_duration: 0.0,
            last_candidate_timestamp: None,
            proof: None,
        })
    }

    /// Clear progress and apply new thresholds.
    ///
    /// On error the previous state is left untouched.
    pub fn reset(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        config.validate()?;
        self.config = config;
        self.accumulated_duration = 0.0;
        self.last_candidate_timestamp = None;
        self.proof = None;
        Ok(())
    }

    /// Fold one processed frame into the session.
    ///
    /// `elapsed` is the wall-time delta since the previous frame and `now`
    /// the frame's timestamp on the same monotonic clock. `elapsed` is not
    /// capped.
    pub fn advance(
        &mut self,
        candidate: bool,
        elapsed: f64,
        now: f64,
    ) -> Result<AdvanceOutcome, SessionError> {
        if !elapsed.is_finite() || elapsed < 0.0 {
            return Err(SessionError::InvalidArgument(format!(
                "elapsed must be a finite value >= 0 (got {elapsed})"
            )));
        }
        if !now.is_finite() {
            return Err(SessionError::InvalidArgument(format!(
                "timestamp must be finite (got {now})"
            )));
        }

        if self.proof.is_some() {
            return Ok(AdvanceOutcome::AlreadyComplete);
        }

        if candidate {
            self.last_candidate_timestamp = Some(now);
        }
        let within_grace = self
            .last_candidate_timestamp
            .is_some_and(|last| now - last <= self.config.grace_duration);

        if !(candidate || within_grace) {
            return Ok(AdvanceOutcome::Paused);
        }

        self.accumulated_duration += elapsed;
        if self.accumulated_duration >= self.config.required_duration {
            self.proof = Some(Proof {
                event: PROOF_EVENT_COMPLETE.to_string(),
                required_duration: self.config.required_duration,
                accumulated_duration_at_completion: self.accumulated_duration,
                completed_at: now,
                confidence_floor: self.config.confidence_floor,
            });
            return Ok(AdvanceOutcome::Completed);
        }
        Ok(AdvanceOutcome::Accumulated)
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn accumulated_duration(&self) -> f64 {
        self.accumulated_duration
    }

    pub fn proof(&self) -> Option<&Proof> {
        self.proof.as_ref()
    }

    /// Fraction of the required duration reached, capped at 1.
    pub fn progress(&self) -> f64 {
        (self.accumulated_duration / self.config.required_duration).min(1.0)
    }

    pub fn view(&self) -> AccumulatorView {
        AccumulatorView {
            config: self.config,
            accumulated_duration: self.accumulated_duration,
            last_candidate_timestamp: self.last_candidate_timestamp,
            proof: self.proof.clone(),
        }
    }
}

impl Default for SessionAccumulator {
    fn default() -> Self {
        Self {
            config: SessionConfig::default(),
            accumulated_duration: 0.0,
            last_candidate_timestamp: None,
            proof: None,
        }
    }
}
