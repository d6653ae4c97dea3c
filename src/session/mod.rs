//! Session accumulation core.
//!
//! - `config`: thresholds and their validation
//! - `accumulator`: the grace-window state machine (no locking)
//! - `shared`: the mutex-guarded record the capture thread writes and
//!   status readers snapshot

pub mod accumulator;
pub mod config;
pub mod shared;

pub use accumulator::{AccumulatorView, AdvanceOutcome, Proof, SessionAccumulator};
pub use config::SessionConfig;
pub use shared::{IssuedProof, Provenance, SessionView, SharedSession};
