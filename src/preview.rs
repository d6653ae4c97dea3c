//! Latest-frame JPEG preview for the MJPEG stream.
//!
//! Encoding happens on the capture thread before the session lock is taken.
//! The slot has its own mutex so stream readers never contend with status
//! readers or the accumulator.

use anyhow::Result;
use std::sync::{Arc, Mutex};

use crate::detect::Detection;
use crate::frame::Frame;

pub const PREVIEW_JPEG_QUALITY: u8 = 90;

/// Box outline colours, RGB.
const CANDIDATE_COLOUR: [u8; 3] = [40, 220, 90];
const PARTIAL_COLOUR: [u8; 3] = [240, 180, 30];

#[derive(Clone, Default)]
pub struct PreviewSlot {
    latest: Arc<Mutex<Option<Arc<Vec<u8>>>>>,
}

impl PreviewSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, jpeg: Vec<u8>) {
        if let Ok(mut slot) = self.latest.lock() {
            *slot = Some(Arc::new(jpeg));
        }
    }

    pub fn latest(&self) -> Option<Arc<Vec<u8>>> {
        self.latest.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.latest.lock() {
            *slot = None;
        }
    }
}

/// True when this build can encode previews.
pub fn preview_supported() -> bool {
    cfg!(feature = "preview-jpeg")
}

/// Copy of the frame's pixels with detection boxes drawn on top.
pub fn annotate(frame: &Frame, detections: &[Detection], candidate: bool) -> Vec<u8> {
    let mut pixels = frame.pixels().to_vec();
    let colour = if candidate {
        CANDIDATE_COLOUR
    } else {
        PARTIAL_COLOUR
    };
    for det in detections {
        draw_box(&mut pixels, frame.width, frame.height, det.bbox, colour);
    }
    pixels
}

fn draw_box(pixels: &mut [u8], width: u32, height: u32, bbox: [f32; 4], colour: [u8; 3]) {
    if width == 0 || height == 0 {
        return;
    }
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let x1 = bbox[0].clamp(0.0, max_x) as u32;
    let y1 = bbox[1].clamp(0.0, max_y) as u32;
    let x2 = bbox[2].clamp(0.0, max_x) as u32;
    let y2 = bbox[3].clamp(0.0, max_y) as u32;
    if x2 < x1 || y2 < y1 {
        return;
    }
    let mut put = |x: u32, y: u32| {
        let idx = ((y * width + x) * 3) as usize;
        pixels[idx..idx + 3].copy_from_slice(&colour);
    };
    for x in x1..=x2 {
        put(x, y1);
        put(x, y2);
    }
    for y in y1..=y2 {
        put(x1, y);
        put(x2, y);
    }
}

/// Encode RGB24 pixels as JPEG.
#[cfg(feature = "preview-jpeg")]
pub fn encode_jpeg(pixels: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    use anyhow::Context;
    use image::codecs::jpeg::JpegEncoder;

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(pixels, width, height, image::ExtendedColorType::Rgb8)
        .context("encode preview jpeg")?;
    Ok(out)
}

#[cfg(not(feature = "preview-jpeg"))]
pub fn encode_jpeg(_pixels: &[u8], _width: u32, _height: u32, _quality: u8) -> Result<Vec<u8>> {
    Err(anyhow::anyhow!(
        "preview encoding requires the preview-jpeg feature"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ObjectClass;

    #[test]
    fn slot_keeps_latest_only() {
        let slot = PreviewSlot::new();
        assert!(slot.latest().is_none());
        slot.publish(vec![1, 2, 3]);
        slot.publish(vec![4]);
        assert_eq!(slot.latest().as_deref(), Some(&vec![4]));
        slot.clear();
        assert!(slot.latest().is_none());
    }

    #[test]
    fn annotate_draws_outline_without_touching_frame() {
        let frame = Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 1).unwrap();
        let det = Detection::new(ObjectClass::PERSON, 0.9, [0.0, 0.0, 2.0, 2.0]);
        let out = annotate(&frame, &[det], true);

        let px = |x: usize, y: usize| &out[(y * 4 + x) * 3..(y * 4 + x) * 3 + 3];
        assert_eq!(px(0, 0), &CANDIDATE_COLOUR);
        assert_eq!(px(2, 1), &CANDIDATE_COLOUR);
        assert_eq!(px(1, 1), &[0, 0, 0]);
        assert_eq!(px(3, 3), &[0, 0, 0]);
        assert!(frame.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn annotate_clamps_out_of_frame_boxes() {
        let frame = Frame::new(vec![0u8; 2 * 2 * 3], 2, 2, 1).unwrap();
        let det = Detection::new(ObjectClass::TOOTHBRUSH, 0.9, [-5.0, -5.0, 50.0, 50.0]);
        let out = annotate(&frame, &[det], false);
        assert_eq!(&out[0..3], &PARTIAL_COLOUR);
    }

    #[cfg(feature = "preview-jpeg")]
    #[test]
    fn encodes_jpeg_markers() {
        let jpeg = encode_jpeg(&vec![128u8; 8 * 8 * 3], 8, 8, PREVIEW_JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
