//! Camera frame sources.
//!
//! - `stub://<name>` devices generate synthetic frames (tests, demos)
//! - `/dev/videoN` devices are read through V4L2 (feature: ingest-v4l2)
//!
//! Sources hand out owned `Frame`s in RGB24. They never write frames to
//! disk or forward them anywhere.

mod normalize;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::time::Instant;

use crate::frame::Frame;
pub use normalize::{normalize_to_rgb, PixelFormat};
#[cfg(feature = "ingest-v4l2")]
use v4l2::DeviceV4l2Source;

pub const STUB_SCHEME: &str = "stub://";

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or `stub://<name>`.
    pub device: String,
    /// Target frame rate. Synthetic sources pace themselves to it.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 15,
            width: 640,
            height: 480,
        }
    }
}

impl CameraConfig {
    /// Device path for a numeric camera index.
    pub fn device_for_index(index: u32) -> String {
        format!("/dev/video{index}")
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub device: String,
}

pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceV4l2Source),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        if config.device.starts_with(STUB_SCHEME) {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticSource::new(config)),
            });
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(Self {
                backend: CameraBackend::Device(DeviceV4l2Source::new(config)),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(anyhow!(
                "camera device {} requires the ingest-v4l2 feature",
                config.device
            ))
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
        }
    }

    /// Capture the next frame. Blocks until one is available.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticSource {
    config: CameraConfig,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            last_frame_at: None,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("CameraSource: connected to {} (synthetic)", self.config.device);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.pace();
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )
    }

    /// Sleep out the remainder of the frame interval, like a real camera would block.
    fn pace(&mut self) {
        if self.config.target_fps > 0 {
            let interval = std::time::Duration::from_secs(1) / self.config.target_fps;
            if let Some(last) = self.last_frame_at {
                if let Some(remaining) = interval.checked_sub(last.elapsed()) {
                    std::thread::sleep(remaining);
                }
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    /// Horizontal gradient that drifts each frame, plus a little sensor noise.
    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.config.width as usize;
        let pixel_count = width * self.config.height as usize * 3;
        let mut pixels = vec![0u8; pixel_count];
        let shift = self.frame_count as usize;
        for (i, chunk) in pixels.chunks_exact_mut(3).enumerate() {
            let x = i % width;
            let base = ((x + shift) % 256) as u8;
            let noise = rand::random::<u8>() % 8;
            chunk[0] = base.wrapping_add(noise);
            chunk[1] = base / 2;
            chunk[2] = 255 - base;
        }
        pixels
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            device: "stub://bathroom".to_string(),
            target_fps: 0,
            width: 32,
            height: 24,
        }
    }

    #[test]
    fn stub_source_produces_sequenced_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config())?;
        source.connect()?;

        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert_eq!(first.width, 32);
        assert_eq!(first.height, 24);
        assert_eq!(first.byte_len(), 32 * 24 * 3);
        assert_eq!(second.sequence, first.sequence + 1);
        assert_eq!(source.stats().frames_captured, 2);
        assert!(source.is_healthy());
        Ok(())
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let config = CameraConfig {
            width: 0,
            ..stub_config()
        };
        assert!(CameraSource::new(config).is_err());
    }

    #[test]
    fn camera_index_maps_to_device_path() {
        assert_eq!(CameraConfig::device_for_index(2), "/dev/video2");
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn real_devices_need_v4l2_feature() {
        let config = CameraConfig {
            device: "/dev/video0".to_string(),
            ..stub_config()
        };
        assert!(CameraSource::new(config).is_err());
    }
}
