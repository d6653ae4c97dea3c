//! Captured camera frames.
//!
//! - `Frame`: owned RGB24 pixels plus capture metadata. No `Clone`; the
//!   pixels are zeroized when the frame is dropped.
//!
//! Frames live for one iteration of the capture loop: they are handed to the
//! detector and the preview encoder, then dropped.

use anyhow::{anyhow, Result};
use std::time::Instant;
use zeroize::Zeroize;

pub struct Frame {
    /// RGB24, row-major, `width * height * 3` bytes.
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonically increasing per source.
    pub sequence: u64,
    captured_at: Instant,
}

// Explicitly NOT implementing Clone.

impl Frame {
    /// Wrap RGB24 pixels. The buffer length must match the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}
