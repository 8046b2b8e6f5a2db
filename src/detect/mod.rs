mod backend;
mod backends;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ScriptStep, ScriptedBackend, StubBackend};
pub use registry::{BackendRegistry, SharedDetector};
pub use result::{BoundingBox, DetectedObject, DetectionSet};
