use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::DetectionSet;

/// One scripted detector response.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    /// The detector returns these detections.
    Detections(DetectionSet),
    /// The detector call fails with this reason.
    Fail { fail: String },
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    repeat: bool,
    #[serde(default)]
    latency_ms: u64,
    steps: Vec<ScriptStep>,
}

/// Backend that replays a fixed sequence of responses, one per frame.
///
/// Once the script is exhausted it keeps returning the last step, or starts
/// over when `repeat` is set. An empty script behaves like `StubBackend`.
pub struct ScriptedBackend {
    steps: Vec<ScriptStep>,
    cursor: usize,
    repeat: bool,
    latency: Duration,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            cursor: 0,
            repeat: false,
            latency: Duration::ZERO,
            calls: 0,
        }
    }

    /// Load a JSON scenario: `{"repeat": bool, "latency_ms": n, "steps": [...]}`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read scenario {}: {}", path.display(), e))?;
        Self::from_json(&raw).map_err(|e| anyhow!("invalid scenario {}: {}", path.display(), e))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ScenarioFile = serde_json::from_str(raw)?;
        Ok(Self::new(file.steps)
            .with_repeat(file.repeat)
            .with_latency(Duration::from_millis(file.latency_ms)))
    }

    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    /// Simulated inference time per call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn next_step(&mut self) -> Option<&ScriptStep> {
        if self.steps.is_empty() {
            return None;
        }
        let index = if self.cursor < self.steps.len() {
            self.cursor
        } else if self.repeat {
            self.cursor % self.steps.len()
        } else {
            self.steps.len() - 1
        };
        self.cursor += 1;
        self.steps.get(index)
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<DetectionSet> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        self.calls += 1;
        match self.next_step() {
            None => Ok(DetectionSet::empty()),
            Some(ScriptStep::Detections(set)) => Ok(set.clone()),
            Some(ScriptStep::Fail { fail }) => Err(anyhow!("scripted failure: {}", fail)),
        }
    }
}
