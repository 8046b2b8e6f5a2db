use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::{CameraDevice, SyntheticCameraConfig};
use crate::overlay::OverlayStyle;
use crate::presence::DEFAULT_PERSON_CLASS;

const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const MAX_POLL_INTERVAL_MS: u64 = 10_000;
const DEFAULT_SAFETY_VALVE_SECS: u64 = 10;
const DEFAULT_DETECTOR: &str = "stub";
const DEFAULT_DEVICE_ID: &str = "synthetic:0";
const DEFAULT_DEVICE_LABEL: &str = "Synthetic camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_WARMUP_MS: u64 = 300;
const DEFAULT_WORDS_PER_MINUTE: u32 = 160;

#[derive(Debug, Deserialize, Default)]
struct SentryConfigFile {
    detection: Option<DetectionConfigFile>,
    alert: Option<AlertConfigFile>,
    detector: Option<DetectorConfigFile>,
    camera: Option<CameraConfigFile>,
    speech: Option<SpeechConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    poll_interval_ms: Option<u64>,
    max_consecutive_failures: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    safety_valve_secs: Option<u64>,
    person_class: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    scenario_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device_id: Option<String>,
    devices: Option<Vec<CameraDevice>>,
    width: Option<u32>,
    height: Option<u32>,
    warmup_ms: Option<u64>,
    denied: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct SpeechConfigFile {
    command: Option<Vec<String>>,
    words_per_minute: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    color: Option<[u8; 4]>,
    line_width: Option<u32>,
    font_px: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct SentryConfig {
    pub poll_interval: Duration,
    pub max_consecutive_failures: Option<u32>,
    pub safety_valve: Duration,
    pub person_class: String,
    pub detector: DetectorSettings,
    pub camera: CameraSettings,
    pub speech: SpeechSettings,
    pub overlay: OverlayStyle,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub scenario_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device_id: Option<String>,
    pub devices: Vec<CameraDevice>,
    pub width: u32,
    pub height: u32,
    pub warmup: Duration,
    pub denied: Vec<String>,
}

impl CameraSettings {
    pub fn synthetic(&self) -> SyntheticCameraConfig {
        SyntheticCameraConfig {
            devices: self.devices.clone(),
            width: self.width,
            height: self.height,
            warmup: self.warmup,
            denied: self.denied.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    /// TTS program argv prefix; `None` selects the console sink.
    pub command: Option<Vec<String>>,
    pub words_per_minute: u32,
}

impl SentryConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTRY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a JSON string, with defaults, without consulting the environment.
    pub fn from_json(raw: &str) -> Result<Self> {
        let file: SentryConfigFile =
            serde_json::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        let mut cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentryConfigFile) -> Self {
        let detection = file.detection.unwrap_or_default();
        let alert = file.alert.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let speech = file.speech.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();
        let default_style = OverlayStyle::default();

        Self {
            poll_interval: Duration::from_millis(
                detection
                    .poll_interval_ms
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            max_consecutive_failures: detection.max_consecutive_failures,
            safety_valve: Duration::from_secs(
                alert.safety_valve_secs.unwrap_or(DEFAULT_SAFETY_VALVE_SECS),
            ),
            person_class: alert
                .person_class
                .unwrap_or_else(|| DEFAULT_PERSON_CLASS.to_string()),
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
                scenario_path: detector.scenario_path,
            },
            camera: CameraSettings {
                device_id: camera.device_id,
                devices: camera.devices.unwrap_or_else(|| {
                    vec![CameraDevice::new(DEFAULT_DEVICE_ID, DEFAULT_DEVICE_LABEL)]
                }),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                warmup: Duration::from_millis(camera.warmup_ms.unwrap_or(DEFAULT_WARMUP_MS)),
                denied: camera.denied.unwrap_or_default(),
            },
            speech: SpeechSettings {
                command: speech.command,
                words_per_minute: speech
                    .words_per_minute
                    .unwrap_or(DEFAULT_WORDS_PER_MINUTE),
            },
            overlay: OverlayStyle {
                color: overlay.color.unwrap_or(default_style.color),
                line_width: overlay.line_width.unwrap_or(default_style.line_width),
                font_px: overlay.font_px.unwrap_or(default_style.font_px),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(ms) = std::env::var("SENTRY_POLL_INTERVAL_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                anyhow!("SENTRY_POLL_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Ok(secs) = std::env::var("SENTRY_SAFETY_VALVE_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                anyhow!("SENTRY_SAFETY_VALVE_SECS must be an integer number of seconds")
            })?;
            self.safety_valve = Duration::from_secs(secs);
        }
        if let Ok(backend) = std::env::var("SENTRY_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("SENTRY_SCENARIO") {
            if !path.trim().is_empty() {
                self.detector.scenario_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(device_id) = std::env::var("SENTRY_DEVICE_ID") {
            if !device_id.trim().is_empty() {
                self.camera.device_id = Some(device_id);
            }
        }
        if let Ok(command) = std::env::var("SENTRY_SPEECH_COMMAND") {
            let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
            if !argv.is_empty() {
                self.speech.command = Some(argv);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let poll_ms = self.poll_interval.as_millis() as u64;
        if poll_ms == 0 || poll_ms > MAX_POLL_INTERVAL_MS {
            return Err(anyhow!(
                "poll interval must be between 1 and {} ms",
                MAX_POLL_INTERVAL_MS
            ));
        }
        if self.safety_valve.is_zero() {
            return Err(anyhow!("safety valve interval must be greater than zero"));
        }
        if self.max_consecutive_failures == Some(0) {
            return Err(anyhow!("max_consecutive_failures must be at least 1 when set"));
        }
        self.person_class = self.person_class.trim().to_string();
        if self.person_class.is_empty() {
            return Err(anyhow!("person class must not be empty"));
        }
        if self.camera.devices.is_empty() {
            return Err(anyhow!("camera.devices must list at least one device"));
        }
        if self.speech.words_per_minute == 0 {
            return Err(anyhow!("speech.words_per_minute must be greater than zero"));
        }
        if self.speech.command.as_ref().is_some_and(|argv| argv.is_empty()) {
            self.speech.command = None;
        }
        if self.overlay.font_px <= 0.0 {
            return Err(anyhow!("overlay.font_px must be positive"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SentryConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
