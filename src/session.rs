//! Sentry session runtime.
//!
//! A `Session` owns everything one monitoring run needs: the bound camera,
//! the detection loop, the presence tracker, the alert controller and the
//! overlay. `Session::start` binds the initial camera and moves all of it
//! into a single tokio task, so poll ticks, detection results, speech
//! completions, safety-valve ticks and operator commands are handled one at
//! a time on that task and never race each other.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::alert::{AlertController, AlertState, AlertStats};
use crate::config::SentryConfig;
use crate::detect::{DetectionSet, SharedDetector};
use crate::detection_loop::{CycleOutcome, DetectionLoop, LoopStats};
use crate::error::SentryError;
use crate::ingest::{select_initial_device, CameraDevice, DeviceCatalog, FrameSource};
use crate::overlay::{OverlayRenderer, OverlayStyle, Surface};
use crate::presence::{PresenceEvent, PresenceTracker, DEFAULT_PERSON_CLASS};
use crate::speech::{
    completion_channel, CompletionReceiver, CompletionSender, SpeechSink, UtteranceId,
};

/// Surface type the session draws on.
pub type SessionSurface = Box<dyn Surface + Send>;

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    pub safety_valve: Duration,
    pub preferred_device: Option<String>,
    pub person_class: String,
    /// Consecutive failed cycles after which a present person is treated as
    /// gone. `None` keeps presence untouched however long detection fails.
    pub max_consecutive_failures: Option<u32>,
    pub overlay_style: OverlayStyle,
}

impl SessionSettings {
    pub fn from_config(cfg: &SentryConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval,
            safety_valve: cfg.safety_valve,
            preferred_device: cfg.camera.device_id.clone(),
            person_class: cfg.person_class.clone(),
            max_consecutive_failures: cfg.max_consecutive_failures,
            overlay_style: cfg.overlay,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            safety_valve: Duration::from_secs(10),
            preferred_device: None,
            person_class: DEFAULT_PERSON_CLASS.to_string(),
            max_consecutive_failures: None,
            overlay_style: OverlayStyle::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EdgeStats {
    pub enters: u64,
    pub exits: u64,
    /// Exits synthesized after too many consecutive failed cycles.
    pub forced_exits: u64,
}

/// Synchronous core: routes cycle outcomes to presence, alerting and overlay.
pub struct Sentry {
    tracker: PresenceTracker,
    alert: AlertController,
    overlay: OverlayRenderer<SessionSurface>,
    failure_limit: Option<u32>,
    consecutive_failures: u32,
    edges: EdgeStats,
}

impl Sentry {
    pub fn new(
        settings: &SessionSettings,
        speech: Box<dyn SpeechSink>,
        completions: CompletionSender,
        surface: SessionSurface,
    ) -> Self {
        Self {
            tracker: PresenceTracker::with_person_class(settings.person_class.clone()),
            alert: AlertController::new(speech, completions),
            overlay: OverlayRenderer::new(surface, settings.overlay_style),
            failure_limit: settings.max_consecutive_failures,
            consecutive_failures: 0,
            edges: EdgeStats::default(),
        }
    }

    /// Publish one finished cycle. Returns the presence edge it caused.
    pub fn publish(&mut self, outcome: &CycleOutcome) -> Option<PresenceEvent> {
        let event = match outcome {
            CycleOutcome::Detected { set, geometry, .. } => {
                self.consecutive_failures = 0;
                self.overlay.render(set, *geometry);
                self.tracker.observe(set)
            }
            CycleOutcome::Failed {
                error,
                geometry,
                device_id,
            } => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                log::warn!(
                    "{} on {} ({} in a row)",
                    error,
                    device_id,
                    self.consecutive_failures
                );
                // Never leave boxes from an older frame on screen.
                self.overlay.render(&DetectionSet::empty(), *geometry);
                self.force_exit_if_over_limit()
            }
        };

        if let Some(event) = &event {
            match event {
                PresenceEvent::Enter { other_classes } => {
                    self.edges.enters += 1;
                    log::info!("person entered (with: {:?})", other_classes);
                }
                PresenceEvent::Exit => {
                    self.edges.exits += 1;
                    log::info!("person left");
                }
            }
            self.alert.handle(event);
        }
        event
    }

    fn force_exit_if_over_limit(&mut self) -> Option<PresenceEvent> {
        let limit = self.failure_limit?;
        if self.consecutive_failures < limit {
            return None;
        }
        let event = self.tracker.force_exit()?;
        self.edges.forced_exits += 1;
        log::warn!(
            "detection failed {} times in a row; treating person as gone",
            self.consecutive_failures
        );
        Some(event)
    }

    pub fn on_speech_finished(&mut self, id: UtteranceId) {
        self.alert.on_speech_finished(id);
    }

    pub fn on_safety_valve(&mut self) {
        self.alert.on_safety_valve();
    }

    pub fn silence(&mut self) {
        self.alert.silence();
    }

    pub fn shutdown(&mut self) {
        self.alert.shutdown();
    }

    pub fn alert_state(&self) -> AlertState {
        self.alert.state()
    }

    pub fn alert_stats(&self) -> AlertStats {
        self.alert.stats()
    }

    pub fn edges(&self) -> EdgeStats {
        self.edges
    }

    pub fn overlay_redraws(&self) -> u64 {
        self.overlay.redraws()
    }
}

/// Capabilities a session runs on.
pub struct SessionParts {
    pub source: Box<dyn FrameSource>,
    pub catalog: Box<dyn DeviceCatalog>,
    pub detector: SharedDetector,
    pub speech: Box<dyn SpeechSink>,
    pub surface: SessionSurface,
}

/// Summary returned when the session task ends.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionReport {
    pub detection: LoopStats,
    pub alert: AlertStats,
    pub edges: EdgeStats,
    pub device_switches: u64,
    pub device_errors: u64,
    pub active_device: Option<String>,
    pub overlay_redraws: u64,
}

enum Command {
    SelectDevice {
        device_id: String,
        reply: oneshot::Sender<Result<(), SentryError>>,
    },
    Silence,
    Shutdown,
}

/// Cloneable remote control for a running session.
#[derive(Clone)]
pub struct SessionControl {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionControl {
    /// Re-bind to another camera. Detection keeps polling whatever the outcome;
    /// after a refused permission the session idles until a working device is
    /// selected.
    pub async fn select_device(&self, device_id: &str) -> Result<(), SentryError> {
        let (reply, result) = oneshot::channel();
        self.send(Command::SelectDevice {
            device_id: device_id.to_string(),
            reply,
        })?;
        result.await.map_err(|_| SentryError::SessionClosed)?
    }

    /// Stop the current announcement, if any.
    pub fn silence(&self) -> Result<(), SentryError> {
        self.send(Command::Silence)
    }

    /// Ask the session to tear down. Safe to call from a signal handler.
    pub fn request_shutdown(&self) -> Result<(), SentryError> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<(), SentryError> {
        self.commands
            .send(command)
            .map_err(|_| SentryError::SessionClosed)
    }
}

pub struct Session {
    settings: SessionSettings,
    parts: SessionParts,
}

impl Session {
    pub fn new(settings: SessionSettings, parts: SessionParts) -> Self {
        Self { settings, parts }
    }

    /// Enumerate cameras, bind the initial one and spawn the session task.
    ///
    /// Fails without starting anything when no camera can be bound. Must be
    /// called from within a tokio runtime.
    pub fn start(self) -> Result<SessionHandle, SentryError> {
        let Session { settings, parts } = self;
        let SessionParts {
            mut source,
            catalog,
            detector,
            speech,
            surface,
        } = parts;

        let devices = catalog
            .enumerate()
            .map_err(|e| SentryError::DeviceEnumeration(format!("{:#}", e)))?;
        let initial = select_initial_device(&devices, settings.preferred_device.as_deref())?
            .device_id
            .clone();
        source.bind(&initial)?;
        log::info!(
            "camera bound: {} ({} device(s) available)",
            initial,
            devices.len()
        );

        let (completion_tx, completions) = completion_channel();
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (active_tx, active) = watch::channel(Some(initial));

        let task = SessionTask {
            sentry: Sentry::new(&settings, speech, completion_tx, surface),
            detection: DetectionLoop::new(detector, settings.poll_interval),
            source,
            devices: devices.clone(),
            commands,
            completions,
            active: active_tx,
            safety_valve: settings.safety_valve,
            device_switches: 0,
            device_errors: 0,
        };
        let task = tokio::spawn(task.run());

        Ok(SessionHandle {
            control: SessionControl {
                commands: commands_tx,
            },
            devices,
            active,
            task,
        })
    }
}

pub struct SessionHandle {
    control: SessionControl,
    devices: Vec<CameraDevice>,
    active: watch::Receiver<Option<String>>,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Devices enumerated at startup, in picker order.
    pub fn devices(&self) -> &[CameraDevice] {
        &self.devices
    }

    /// Currently bound camera; `None` after a failed switch.
    pub fn active_device(&self) -> Option<String> {
        self.active.borrow().clone()
    }

    /// Request teardown and wait for the final report.
    pub async fn shutdown(self) -> Result<SessionReport, SentryError> {
        // Already closed means the task is finishing on its own.
        let _ = self.control.request_shutdown();
        self.join().await
    }

    /// Wait for the session task to end.
    pub async fn join(self) -> Result<SessionReport, SentryError> {
        self.task.await.map_err(|e| {
            log::error!("session task failed: {}", e);
            SentryError::SessionClosed
        })
    }
}

struct SessionTask {
    sentry: Sentry,
    detection: DetectionLoop,
    source: Box<dyn FrameSource>,
    devices: Vec<CameraDevice>,
    commands: mpsc::UnboundedReceiver<Command>,
    completions: CompletionReceiver,
    active: watch::Sender<Option<String>>,
    safety_valve: Duration,
    device_switches: u64,
    device_errors: u64,
}

impl SessionTask {
    async fn run(mut self) -> SessionReport {
        let mut poll = time::interval(self.detection.period());
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut safety = time::interval_at(Instant::now() + self.safety_valve, self.safety_valve);
        safety.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "session running: poll every {:?}, safety valve every {:?}",
            self.detection.period(),
            self.safety_valve
        );

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::SelectDevice { device_id, reply }) => {
                        let result = self.switch_device(&device_id);
                        // The caller may have stopped waiting.
                        let _ = reply.send(result);
                    }
                    Some(Command::Silence) => self.sentry.silence(),
                    Some(Command::Shutdown) | None => break,
                },
                Some(id) = self.completions.recv() => self.sentry.on_speech_finished(id),
                _ = safety.tick() => self.sentry.on_safety_valve(),
                outcome = self.detection.settle(), if self.detection.is_busy() => {
                    if let Some(outcome) = outcome {
                        self.sentry.publish(&outcome);
                    }
                }
                _ = poll.tick() => {
                    self.detection.begin(&mut *self.source);
                }
            }
        }

        self.teardown()
    }


    fn switch_device(&mut self, device_id: &str) -> Result<(), SentryError> {
        if !self.devices.iter().any(|d| d.device_id == device_id) {
            self.device_errors += 1;
            let err = SentryError::UnknownDevice {
                device_id: device_id.to_string(),
            };
            log::warn!("{}", err);
            return Err(err);
        }

        // Any bind attempt ends the previous binding, even one that fails.
        self.detection.rebind();
        let result = self.source.bind(device_id);
        match &result {
            Ok(()) => {
                self.device_switches += 1;
                log::info!("switched camera to {}", device_id);
            }
            Err(e) => {
                self.device_errors += 1;
                log::warn!("camera switch failed: {}", e);
            }
        }
        let bound = self.source.bound_device().map(str::to_string);
        self.active.send_replace(bound);
        result
    }

    fn teardown(mut self) -> SessionReport {
        self.sentry.shutdown();
        self.detection.abandon();
        let active_device = self.source.bound_device().map(str::to_string);
        self.source.release();

        let report = SessionReport {
            detection: self.detection.stats(),
            alert: self.sentry.alert_stats(),
            edges: self.sentry.edges(),
            device_switches: self.device_switches,
            device_errors: self.device_errors,
            active_device,
            overlay_redraws: self.sentry.overlay_redraws(),
        };
        log::info!(
            "session stopped: {} cycles, {} announcements, {} enters, {} exits",
            report.detection.cycles_completed,
            report.alert.announcements,
            report.edges.enters,
            report.edges.exits
        );
        report
    }
}
