use anyhow::Result;

use crate::detect::result::Detection;

/// Object detector backend.
///
/// Backends receive RGB24 pixels for the duration of one call and return
/// every detection they find. Confidence floors and class allow-lists are
/// applied afterwards by `DetectionAdapter`, so backends stay free of
/// session policy.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Implementations must treat the pixel slice as read-only and ephemeral.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
