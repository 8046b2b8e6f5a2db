//! Serialized detection cycles.
//!
//! `DetectionLoop::begin` samples the bound frame source and hands the frame
//! to the detector on a blocking worker. Until `settle` has returned that
//! cycle's outcome, further `begin` calls are skipped, so at most one
//! detector invocation is ever pending regardless of the poll period.
//!
//! Every camera bind starts a new binding generation (`rebind`). A cycle
//! started under an older generation is discarded when it settles, so no
//! result outlives the binding its frame was captured from.

use anyhow::anyhow;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::detect::{DetectionSet, SharedDetector};
use crate::error::SentryError;
use crate::frame::FrameGeometry;
use crate::ingest::FrameSource;

/// Result of a finished detection cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Detected {
        set: DetectionSet,
        geometry: FrameGeometry,
        device_id: String,
    },
    Failed {
        error: SentryError,
        geometry: FrameGeometry,
        device_id: String,
    },
}

impl CycleOutcome {
    pub fn geometry(&self) -> FrameGeometry {
        match self {
            CycleOutcome::Detected { geometry, .. } | CycleOutcome::Failed { geometry, .. } => {
                *geometry
            }
        }
    }
}

/// What a poll tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStart {
    Started,
    /// Source not ready (no stream, still warming up, or capture failed).
    NotReady,
    /// Previous detection still pending.
    Busy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub detector_failures: u64,
    pub not_ready: u64,
    pub skipped_busy: u64,
    pub capture_failures: u64,
    /// Cycles discarded because the camera was re-bound while they ran.
    pub stale_outcomes: u64,
    /// Cycles whose detection took longer than the poll period.
    pub overruns: u64,
    pub worst_latency: Duration,
}

struct InFlight {
    handle: JoinHandle<anyhow::Result<DetectionSet>>,
    geometry: FrameGeometry,
    device_id: String,
    binding: u64,
    started: Instant,
}

pub struct DetectionLoop {
    detector: SharedDetector,
    period: Duration,
    binding: u64,
    in_flight: Option<InFlight>,
    stats: LoopStats,
}

impl DetectionLoop {
    pub fn new(detector: SharedDetector, period: Duration) -> Self {
        Self {
            detector,
            period,
            binding: 0,
            in_flight: None,
            stats: LoopStats::default(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Current binding generation.
    pub fn binding(&self) -> u64 {
        self.binding
    }

    /// Start a new binding generation. Call on every bind attempt; a pending
    /// cycle from the previous binding will be dropped when it settles.
    pub fn rebind(&mut self) {
        self.binding = self.binding.wrapping_add(1);
    }

    /// Start a cycle if none is pending and the source has a frame.
    ///
    /// Must be called from within a tokio runtime.
    pub fn begin(&mut self, source: &mut dyn FrameSource) -> CycleStart {
        if self.is_busy() {
            self.stats.skipped_busy += 1;
            log::debug!("detection still pending; skipping poll tick");
            return CycleStart::Busy;
        }
        if !source.is_ready() {
            self.stats.not_ready += 1;
            return CycleStart::NotReady;
        }
        let frame = match source.capture() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.stats.not_ready += 1;
                return CycleStart::NotReady;
            }
            Err(e) => {
                self.stats.capture_failures += 1;
                log::warn!("frame capture failed: {:#}", e);
                return CycleStart::NotReady;
            }
        };

        let geometry = frame.geometry();
        let device_id = frame.device_id.clone();
        log::trace!(
            "detecting on {} ({} bytes, {:?} old)",
            device_id,
            frame.byte_len(),
            frame.age()
        );
        let detector = self.detector.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let mut guard = detector
                .lock()
                .map_err(|_| anyhow!("detector backend lock poisoned"))?;
            frame.run_detector(&mut *guard)
        });

        self.stats.cycles_started += 1;
        self.in_flight = Some(InFlight {
            handle,
            geometry,
            device_id,
            binding: self.binding,
            started: Instant::now(),
        });
        CycleStart::Started
    }

    /// Wait for the pending cycle. Returns `None` when nothing is pending or
    /// the cycle belonged to an earlier binding.
    ///
    /// Cancel safe: dropping the future leaves the cycle pending.
    pub async fn settle(&mut self) -> Option<CycleOutcome> {
        let pending = self.in_flight.as_mut()?;
        let joined = (&mut pending.handle).await;
        let finished = self.in_flight.take()?;

        let latency = finished.started.elapsed();
        self.stats.worst_latency = self.stats.worst_latency.max(latency);
        if latency > self.period {
            self.stats.overruns += 1;
        }

        if finished.binding != self.binding {
            self.stats.stale_outcomes += 1;
            log::debug!(
                "dropping detection result from earlier binding of {}",
                finished.device_id
            );
            return None;
        }

        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(anyhow!("detector task failed: {}", e)),
        };
        Some(match result {
            Ok(set) => {
                self.stats.cycles_completed += 1;
                CycleOutcome::Detected {
                    set,
                    geometry: finished.geometry,
                    device_id: finished.device_id,
                }
            }
            Err(e) => {
                self.stats.detector_failures += 1;
                CycleOutcome::Failed {
                    error: SentryError::DetectorFailure(format!("{:#}", e)),
                    geometry: finished.geometry,
                    device_id: finished.device_id,
                }
            }
        })
    }

    /// Detach a pending cycle at teardown. Its result is discarded.
    pub fn abandon(&mut self) {
        if let Some(pending) = self.in_flight.take() {
            log::debug!(
                "abandoning pending detection on {} after {:?}",
                pending.device_id,
                pending.started.elapsed()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, DetectedObject, ScriptStep, ScriptedBackend};
    use crate::ingest::{CameraDevice, SyntheticCamera, SyntheticCameraConfig};
    use std::sync::{Arc, Mutex};

    fn camera() -> SyntheticCamera {
        let mut camera = SyntheticCamera::new(SyntheticCameraConfig {
            devices: vec![CameraDevice::new("cam-0", "")],
            width: 8,
            height: 6,
            warmup: Duration::ZERO,
            denied: Vec::new(),
        });
        camera.bind("cam-0").unwrap();
        camera
    }

    fn person() -> DetectionSet {
        DetectionSet::new(vec![DetectedObject::new(
            "person",
            0.9,
            BoundingBox::new(1.0, 1.0, 2.0, 2.0),
        )])
    }

    fn detector(steps: Vec<ScriptStep>, latency: Duration) -> SharedDetector {
        Arc::new(Mutex::new(ScriptedBackend::new(steps).with_latency(latency)))
    }

    #[tokio::test]
    async fn pending_cycle_blocks_new_cycles() {
        let mut source = camera();
        let mut detection = DetectionLoop::new(
            detector(vec![ScriptStep::Detections(person())], Duration::from_millis(50)),
            Duration::from_millis(10),
        );

        assert_eq!(detection.begin(&mut source), CycleStart::Started);
        assert_eq!(detection.begin(&mut source), CycleStart::Busy);
        assert_eq!(detection.begin(&mut source), CycleStart::Busy);

        let outcome = detection.settle().await.unwrap();
        match outcome {
            CycleOutcome::Detected {
                set,
                geometry,
                device_id,
            } => {
                assert!(set.contains_class("person"));
                assert_eq!(geometry, FrameGeometry::new(8, 6));
                assert_eq!(device_id, "cam-0");
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let stats = detection.stats();
        assert_eq!(stats.cycles_started, 1);
        assert_eq!(stats.skipped_busy, 2);
        assert_eq!(stats.overruns, 1);
        assert!(!detection.is_busy());
        assert_eq!(detection.begin(&mut source), CycleStart::Started);
    }

    #[tokio::test]
    async fn detector_error_becomes_failed_outcome() {
        let mut source = camera();
        let mut detection = DetectionLoop::new(
            detector(
                vec![ScriptStep::Fail {
                    fail: "gpu lost".to_string(),
                }],
                Duration::ZERO,
            ),
            Duration::from_millis(100),
        );
        detection.begin(&mut source);
        let outcome = detection.settle().await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                error: SentryError::DetectorFailure(ref msg),
                ..
            } if msg.contains("gpu lost")
        ));
        assert_eq!(detection.stats().detector_failures, 1);
    }

    #[tokio::test]
    async fn rebind_discards_pending_cycle() {
        let mut source = camera();
        let mut detection = DetectionLoop::new(
            detector(vec![ScriptStep::Detections(person())], Duration::from_millis(20)),
            Duration::from_millis(10),
        );
        assert_eq!(detection.begin(&mut source), CycleStart::Started);
        detection.rebind();
        source.bind("cam-0").unwrap();

        assert!(detection.settle().await.is_none());
        assert!(!detection.is_busy());
        assert_eq!(detection.stats().stale_outcomes, 1);
        assert_eq!(detection.stats().cycles_completed, 0);

        // Cycles under the new binding publish normally.
        assert_eq!(detection.begin(&mut source), CycleStart::Started);
        assert!(detection.settle().await.is_some());
        assert_eq!(detection.binding(), 1);
    }

    #[tokio::test]
    async fn unready_source_is_a_noop() {
        let mut source = SyntheticCamera::new(SyntheticCameraConfig::default());
        let mut detection =
            DetectionLoop::new(detector(Vec::new(), Duration::ZERO), Duration::from_millis(100));
        assert_eq!(detection.begin(&mut source), CycleStart::NotReady);
        assert!(detection.settle().await.is_none());
        assert_eq!(detection.stats().not_ready, 1);
        assert_eq!(detection.stats().cycles_started, 0);
    }
}
