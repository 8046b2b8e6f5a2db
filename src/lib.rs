//! Presence Sentry
//!
//! Watches a camera, runs an object detector on the live frame at a fixed
//! cadence and announces, by speech, when a person enters the view.
//!
//! # Behavior
//!
//! 1. **One detection at a time**: a poll tick that finds a detection still
//!    pending is skipped, so slow detectors never pile up.
//! 2. **Edges, not levels**: only the absent-to-present transition triggers
//!    an announcement, and present-to-absent cancels it.
//! 3. **One utterance at a time**: an entry while speaking is not re-announced.
//! 4. **Self-healing alerts**: a periodic safety valve forces the speaking
//!    state back to idle even if a completion signal is lost.
//! 5. **Fresh overlay**: every cycle fully redraws the box overlay.
//!
//! # Module Structure
//!
//! - `ingest`: camera enumeration and frame sources
//! - `frame`: captured frames (zeroized on drop)
//! - `detect`: detector backends and detection results
//! - `detection_loop`: serialized detection cycles
//! - `presence`: enter/exit edge detection
//! - `alert` / `speech`: announcement gating and speech sinks
//! - `overlay`: bounding-box overlay rendering
//! - `session`: the runtime tying it all together

pub mod alert;
pub mod config;
pub mod detect;
pub mod detection_loop;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod presence;
pub mod session;
pub mod speech;
pub mod ui;

pub use alert::{compose_announcement, AlertController, AlertState, AlertStats};
pub use config::SentryConfig;
pub use detect::{
    BackendRegistry, BoundingBox, DetectedObject, DetectionSet, DetectorBackend, ScriptStep,
    ScriptedBackend, SharedDetector, StubBackend,
};
pub use detection_loop::{CycleOutcome, CycleStart, DetectionLoop, LoopStats};
pub use error::SentryError;
pub use frame::{Frame, FrameGeometry};
pub use ingest::{
    select_initial_device, CameraDevice, DeviceCatalog, FrameSource, StaticCatalog,
    SyntheticCamera, SyntheticCameraConfig,
};
pub use overlay::{DisplayList, OverlayRenderer, OverlayStyle, SharedSurface, Surface};
#[cfg(feature = "overlay-raster")]
pub use overlay::RasterSurface;
pub use presence::{PresenceEvent, PresenceTracker};
pub use session::{
    EdgeStats, Sentry, Session, SessionControl, SessionHandle, SessionParts, SessionReport,
    SessionSettings,
};
pub use speech::{
    completion_channel, CommandSpeech, CompletionNotifier, CompletionSender, ConsoleSpeech,
    SpeechSink, Utterance, UtteranceId,
};
