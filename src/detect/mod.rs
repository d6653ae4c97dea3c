mod adapter;
mod backend;
mod backends;
mod registry;
mod result;
mod summary;

pub use adapter::{filter_detections, DetectionAdapter};
pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{Detection, ObjectClass, DEFAULT_REQUIRED_CLASSES};
pub use summary::{ClassPresence, FrameSummary, LabeledDetection};
