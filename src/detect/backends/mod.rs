pub mod scripted;
pub mod stub;

pub use scripted::{ScriptStep, ScriptedBackend};
pub use stub::StubBackend;
