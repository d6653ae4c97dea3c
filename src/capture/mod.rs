//! Producer side: the frame loop and the controller that owns it.
//!
//! The loop blocks on the camera and the detector outside any session lock,
//! then takes the session lock once per frame to record the frame summary
//! and advance the accumulator.

mod controller;
mod worker;

pub use controller::{CaptureSettings, SessionController};
