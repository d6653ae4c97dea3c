//! Lock-guarded session record shared between the capture thread and readers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::detect::{FrameSummary, ObjectClass};
use crate::error::SessionError;
use crate::session::accumulator::{AdvanceOutcome, Proof, SessionAccumulator};
use crate::session::config::SessionConfig;

/// Where a proof came from: detector name and the classes that had to be present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provenance {
    pub model: String,
    pub classes: Vec<ObjectClass>,
}

/// Proof plus the provenance stamped on it when it was minted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IssuedProof {
    #[serde(flatten)]
    pub proof: Proof,
    /// Wall-clock seconds since the Unix epoch at minting.
    pub issued_epoch_s: u64,
    pub model: String,
    pub classes: Vec<String>,
    /// Hex SHA-256 over every field above.
    pub digest: String,
}

impl IssuedProof {
    fn mint(proof: Proof, provenance: &Provenance) -> Self {
        let issued_epoch_s = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let classes: Vec<String> = provenance.classes.iter().map(|c| c.label()).collect();
        let digest = proof_digest(&proof, issued_epoch_s, &provenance.model, &classes);
        Self {
            proof,
            issued_epoch_s,
            model: provenance.model.clone(),
            classes,
            digest,
        }
    }

    /// UTC day number (days since the Unix epoch) the proof was issued on.
    pub fn issued_day(&self) -> i64 {
        (self.issued_epoch_s / 86_400) as i64
    }

    pub fn verify_digest(&self) -> bool {
        proof_digest(&self.proof, self.issued_epoch_s, &self.model, &self.classes) == self.digest
    }
}

fn proof_digest(proof: &Proof, issued_epoch_s: u64, model: &str, classes: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(proof.event.as_bytes());
    hasher.update(proof.required_duration.to_le_bytes());
    hasher.update(proof.accumulated_duration_at_completion.to_le_bytes());
    hasher.update(proof.completed_at.to_le_bytes());
    hasher.update(proof.confidence_floor.to_le_bytes());
    hasher.update(issued_epoch_s.to_le_bytes());
    hasher.update((model.len() as u64).to_le_bytes());
    hasher.update(model.as_bytes());
    for class in classes {
        hasher.update((class.len() as u64).to_le_bytes());
        hasher.update(class.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Immutable copy of the whole session at one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub running: bool,
    /// Incremented by every reset.
    pub epoch: u64,
    pub required_duration: f64,
    pub grace_duration: f64,
    pub confidence_floor: f32,
    pub accumulated_duration: f64,
    pub last_candidate_timestamp: Option<f64>,
    /// `min(1, accumulated_duration / required_duration)`.
    pub progress: f64,
    pub proof: Option<IssuedProof>,
    pub latest_frame: FrameSummary,
}

struct SessionState {
    accumulator: SessionAccumulator,
    running: bool,
    epoch: u64,
    issued: Option<IssuedProof>,
    latest_frame: FrameSummary,
}

impl SessionState {
    fn apply(&mut self, outcome: AdvanceOutcome, provenance: &Provenance) {
        if outcome != AdvanceOutcome::Completed {
            return;
        }
        if let Some(proof) = self.accumulator.proof() {
            let issued = IssuedProof::mint(proof.clone(), provenance);
            log::info!(
                "session epoch {} complete: {:.2}s accumulated (required {:.2}s), digest {}",
                self.epoch,
                proof.accumulated_duration_at_completion,
                proof.required_duration,
                issued.digest
            );
            self.issued = Some(issued);
        }
    }
}

/// Single-writer, many-reader handle to the session.
///
/// Every operation takes the lock once and holds it only for field copies and
/// arithmetic. Readers only ever get a `SessionView` copy.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<SessionState>>,
    provenance: Arc<Provenance>,
}

impl SharedSession {
    pub fn new(config: SessionConfig, provenance: Provenance) -> Result<Self, SessionError> {
        let accumulator = SessionAccumulator::new(config)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(SessionState {
                accumulator,
                running: false,
                epoch: 0,
                issued: None,
                latest_frame: FrameSummary::default(),
            })),
            provenance: Arc::new(provenance),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionState>, SessionError> {
        self.inner.lock().map_err(|_| SessionError::LockPoisoned)
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Clear progress, apply new thresholds and open a new epoch.
    ///
    /// Serialized with `advance`: an advance that lands after the reset
    /// counts toward the new epoch. Returns the new epoch.
    pub fn reset(&self, config: SessionConfig) -> Result<u64, SessionError> {
        config.validate()?;
        let mut state = self.lock()?;
        Self::reset_locked(&mut state, config)?;
        Ok(state.epoch)
    }

    /// Reset and mark the session running in one critical section.
    pub fn start(&self, config: SessionConfig) -> Result<u64, SessionError> {
        config.validate()?;
        let mut state = self.lock()?;
        Self::reset_locked(&mut state, config)?;
        state.running = true;
        Ok(state.epoch)
    }

    fn reset_locked(state: &mut SessionState, config: SessionConfig) -> Result<(), SessionError> {
        state.accumulator.reset(config)?;
        state.epoch = state.epoch.wrapping_add(1);
        state.issued = None;
        state.latest_frame = FrameSummary::default();
        Ok(())
    }

    /// Returns the previous value.
    pub fn set_running(&self, running: bool) -> Result<bool, SessionError> {
        let mut state = self.lock()?;
        Ok(std::mem::replace(&mut state.running, running))
    }

    pub fn is_running(&self) -> Result<bool, SessionError> {
        Ok(self.lock()?.running)
    }

    pub fn epoch(&self) -> Result<u64, SessionError> {
        Ok(self.lock()?.epoch)
    }

    pub fn confidence_floor(&self) -> Result<f32, SessionError> {
        Ok(self.lock()?.accumulator.config().confidence_floor)
    }

    /// Fold one frame's candidate flag into the session.
    pub fn advance(
        &self,
        candidate: bool,
        elapsed: f64,
        now: f64,
    ) -> Result<AdvanceOutcome, SessionError> {
        let mut state = self.lock()?;
        let outcome = state.accumulator.advance(candidate, elapsed, now)?;
        state.apply(outcome, &self.provenance);
        Ok(outcome)
    }

    /// Record a frame summary and advance with its candidate flag, atomically.
    ///
    /// Returns `None` without advancing when `epoch` is no longer current,
    /// so a frame measured against the previous epoch cannot leak into the
    /// new one. The summary is recorded either way.
    pub fn record_and_advance(
        &self,
        epoch: u64,
        summary: FrameSummary,
        elapsed: f64,
        now: f64,
    ) -> Result<Option<AdvanceOutcome>, SessionError> {
        let mut state = self.lock()?;
        let candidate = summary.candidate;
        state.latest_frame = summary;
        if state.epoch != epoch {
            return Ok(None);
        }
        let outcome = state.accumulator.advance(candidate, elapsed, now)?;
        state.apply(outcome, &self.provenance);
        Ok(Some(outcome))
    }

    pub fn proof(&self) -> Result<Option<IssuedProof>, SessionError> {
        Ok(self.lock()?.issued.clone())
    }

    pub fn snapshot(&self) -> Result<SessionView, SessionError> {
        let state = self.lock()?;
        let view = state.accumulator.view();
        Ok(SessionView {
            running: state.running,
            epoch: state.epoch,
            required_duration: view.config.required_duration,
            grace_duration: view.config.grace_duration,
            confidence_floor: view.config.confidence_floor,
            accumulated_duration: view.accumulated_duration,
            last_candidate_timestamp: view.last_candidate_timestamp,
            progress: state.accumulator.progress(),
            proof: state.issued.clone(),
            latest_frame: state.latest_frame.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, DEFAULT_REQUIRED_CLASSES};

    fn provenance() -> Provenance {
        Provenance {
            model: "scripted".to_string(),
            classes: DEFAULT_REQUIRED_CLASSES.to_vec(),
        }
    }

    fn session(required: f64, grace: f64) -> SharedSession {
        SharedSession::new(SessionConfig::new(required, grace, 0.4), provenance()).unwrap()
    }

    fn candidate_summary(sequence: u64) -> FrameSummary {
        FrameSummary::from_detections(
            sequence,
            vec![
                Detection::new(ObjectClass::PERSON, 0.9, [0.0, 0.0, 5.0, 5.0]),
                Detection::new(ObjectClass::TOOTHBRUSH, 0.6, [1.0, 1.0, 2.0, 2.0]),
            ],
            &DEFAULT_REQUIRED_CLASSES,
        )
    }

    #[test]
    fn never_started_session_reports_zero_progress() {
        let view = session(20.0, 0.75).snapshot().unwrap();
        assert!(!view.running);
        assert_eq!(view.epoch, 0);
        assert_eq!(view.accumulated_duration, 0.0);
        assert_eq!(view.progress, 0.0);
        assert!(view.proof.is_none());
    }

    #[test]
    fn start_resets_and_runs() {
        let session = session(1.0, 0.5);
        session.advance(true, 2.0, 0.0).unwrap();
        assert!(session.proof().unwrap().is_some());

        let epoch = session.start(SessionConfig::new(4.0, 0.5, 0.5)).unwrap();
        let view = session.snapshot().unwrap();
        assert_eq!(view.epoch, epoch);
        assert!(view.running);
        assert_eq!(view.accumulated_duration, 0.0);
        assert!(view.proof.is_none());
        assert_eq!(view.required_duration, 4.0);
        assert_eq!(view.confidence_floor, 0.5);
    }

    #[test]
    fn invalid_start_leaves_session_stopped() {
        let session = session(2.0, 0.5);
        let err = session.start(SessionConfig::new(-1.0, 0.5, 0.4)).unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfiguration(_)));
        let view = session.snapshot().unwrap();
        assert!(!view.running);
        assert_eq!(view.epoch, 0);
    }

    #[test]
    fn stop_keeps_progress_and_proof() {
        let session = session(1.0, 0.5);
        session.start(SessionConfig::new(1.0, 0.5, 0.4)).unwrap();
        session.advance(true, 1.5, 0.0).unwrap();
        assert!(session.set_running(false).unwrap());

        let view = session.snapshot().unwrap();
        assert!(!view.running);
        assert_eq!(view.accumulated_duration, 1.5);
        assert!(view.proof.is_some());
    }

    #[test]
    fn issued_proof_carries_provenance_and_digest() {
        let session = session(2.0, 0.5);
        session.advance(true, 1.0, 1.0).unwrap();
        session.advance(false, 0.3, 1.3).unwrap();
        assert_eq!(
            session.advance(true, 0.8, 2.1).unwrap(),
            AdvanceOutcome::Completed
        );

        let issued = session.proof().unwrap().expect("proof");
        assert_eq!(issued.model, "scripted");
        assert_eq!(issued.classes, vec!["person", "toothbrush"]);
        assert!(issued.verify_digest());
        assert_eq!(issued.digest.len(), 64);

        let mut tampered = issued.clone();
        tampered.proof.accumulated_duration_at_completion = 99.0;
        assert!(!tampered.verify_digest());

        // Completion is stable under further frames.
        session.advance(true, 5.0, 3.0).unwrap();
        assert_eq!(session.proof().unwrap(), Some(issued));
    }

    #[test]
    fn stale_epoch_frames_are_recorded_but_not_counted() {
        let session = session(10.0, 0.5);
        let old_epoch = session.start(SessionConfig::new(10.0, 0.5, 0.4)).unwrap();
        session.reset(SessionConfig::new(10.0, 0.5, 0.4)).unwrap();

        let outcome = session
            .record_and_advance(old_epoch, candidate_summary(7), 3.0, 1.0)
            .unwrap();
        assert_eq!(outcome, None);
        let view = session.snapshot().unwrap();
        assert_eq!(view.accumulated_duration, 0.0);
        assert_eq!(view.latest_frame.sequence, 7);

        let outcome = session
            .record_and_advance(view.epoch, candidate_summary(8), 3.0, 2.0)
            .unwrap();
        assert_eq!(outcome, Some(AdvanceOutcome::Accumulated));
        assert_eq!(session.snapshot().unwrap().accumulated_duration, 3.0);
    }

    #[test]
    fn negative_elapsed_fails_fast() {
        let session = session(10.0, 0.5);
        let err = session.advance(true, -1.0, 0.0).unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
        assert_eq!(session.snapshot().unwrap().accumulated_duration, 0.0);
    }

    #[test]
    fn view_serializes_progress() {
        let session = session(4.0, 0.5);
        session.advance(true, 1.0, 0.0).unwrap();
        let json = serde_json::to_value(session.snapshot().unwrap()).unwrap();
        assert_eq!(json["progress"], 0.25);
        assert_eq!(json["proof"], serde_json::Value::Null);
    }
}
