//! Brush Witness
//!
//! Watches a camera for a person holding a toothbrush and issues a proof once
//! enough brushing time has accumulated.
//!
//! # Module Structure
//!
//! - `session`: the accumulator state machine and its lock-guarded wrapper
//! - `detect`: detector backends, class/confidence filtering, per-frame summaries
//! - `frame`, `ingest`: owned RGB frames and camera sources
//! - `capture`: the producer thread and the controller that owns it
//! - `preview`: annotated JPEG previews for the MJPEG stream
//! - `streak`: daily claim ledger
//! - `api`: HTTP control surface
//! - `config`: daemon configuration (file + env)

pub mod api;
pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod preview;
pub mod session;
pub mod streak;

pub use capture::{CaptureSettings, SessionController};
pub use detect::{
    BackendRegistry, Detection, DetectionAdapter, DetectorBackend, FrameSummary, ObjectClass,
    ScriptedBackend,
};
pub use error::{SessionError, StreakError};
pub use frame::Frame;
pub use ingest::{CameraConfig, CameraSource};
pub use session::{
    AdvanceOutcome, IssuedProof, Proof, SessionAccumulator, SessionConfig, SessionView,
    SharedSession,
};
pub use streak::StreakLedger;
