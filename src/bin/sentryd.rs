//! sentryd - presence sentry daemon
//!
//! This daemon:
//! 1. Enumerates cameras and binds the configured (or first) device
//! 2. Loads the configured detector backend
//! 3. Polls the camera and runs one detection at a time
//! 4. Announces a person entering the view, cancels when they leave
//! 5. Keeps the box overlay in sync with the latest detections

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use presence_sentry::ui::{Ui, UiMode};
use presence_sentry::{
    BackendRegistry, CommandSpeech, ConsoleSpeech, DeviceCatalog, DisplayList, ScriptedBackend,
    SentryConfig, Session, SessionParts, SessionReport, SessionSettings, SharedSurface,
    SpeechSink, StubBackend, SyntheticCamera,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Camera device id to bind at startup (overrides config).
    #[arg(long)]
    device: Option<String>,
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    seconds: Option<u64>,
    /// Print the available cameras and exit.
    #[arg(long)]
    list_devices: bool,
    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value_t = UiMode::Auto, value_name = "MODE")]
    ui: UiMode,
    /// Write the final overlay display list to this JSON file.
    #[arg(long, value_name = "PATH")]
    overlay_json: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::detect(args.ui);
    let mut cfg = SentryConfig::load()?;
    if let Some(device) = &args.device {
        cfg.camera.device_id = Some(device.clone());
    }

    let camera = SyntheticCamera::new(cfg.camera.synthetic());
    let catalog = camera.catalog();

    if args.list_devices {
        let devices = {
            let _stage = ui.stage("enumerate cameras");
            catalog.enumerate()?
        };
        for (index, device) in devices.iter().enumerate() {
            println!("{}\t{}", device.device_id, device.display_label(index));
        }
        return Ok(());
    }

    let registry = {
        let stage = ui.stage("load detector");
        match load_detectors(&cfg) {
            Ok(registry) => registry,
            Err(e) => {
                stage.fail(&e);
                return Err(e);
            }
        }
    };
    let detector = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;
    log::info!(
        "detector backends: {} (using '{}')",
        registry.list().join(", "),
        cfg.detector.backend
    );

    let speech: Box<dyn SpeechSink> = match &cfg.speech.command {
        Some(argv) => Box::new(CommandSpeech::new(argv.clone())?),
        None => Box::new(ConsoleSpeech::new(cfg.speech.words_per_minute)),
    };

    let overlay = SharedSurface::new(DisplayList::default());
    let parts = SessionParts {
        source: Box::new(camera),
        catalog: Box::new(catalog),
        detector,
        speech,
        surface: Box::new(overlay.clone()),
    };
    let settings = SessionSettings::from_config(&cfg);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let report = runtime.block_on(run(Session::new(settings, parts), args.seconds, &ui))?;
    log_report(&report);

    if let Some(path) = &args.overlay_json {
        let json = overlay.lock().to_json()?;
        std::fs::write(path, json)
            .map_err(|e| anyhow!("failed to write overlay {}: {}", path.display(), e))?;
        log::info!("overlay written to {}", path.display());
    }
    Ok(())
}

async fn run(session: Session, seconds: Option<u64>, ui: &Ui) -> Result<SessionReport> {
    let handle = {
        let stage = ui.stage("bind camera");
        match session.start() {
            Ok(handle) => handle,
            Err(e) => {
                if e.requires_user_action() {
                    log::error!("camera unavailable: {}", e);
                }
                stage.fail(&e);
                return Err(e.into());
            }
        }
    };
    for (index, device) in handle.devices().iter().enumerate() {
        log::info!("camera {}: {}", device.device_id, device.display_label(index));
    }

    let control = handle.control();
    ctrlc::set_handler(move || {
        if control.request_shutdown().is_err() {
            log::debug!("shutdown requested after session closed");
        }
    })
    .context("failed to install Ctrl-C handler")?;

    if let Some(seconds) = seconds {
        let control = handle.control();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            log::info!("run time of {}s elapsed; stopping", seconds);
            let _ = control.request_shutdown();
        });
    }

    log::info!("sentryd running. press Ctrl-C to stop");
    Ok(handle.join().await?)
}

fn load_detectors(cfg: &SentryConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());
    if let Some(path) = &cfg.detector.scenario_path {
        registry.register(ScriptedBackend::from_path(path)?);
    }
    registry.set_default(&cfg.detector.backend).map_err(|e| {
        if cfg.detector.backend == "scripted" {
            anyhow!("the scripted detector needs detector.scenario_path or SENTRY_SCENARIO")
        } else {
            e
        }
    })?;
    registry.warm_up_default()?;
    Ok(registry)
}

fn log_report(report: &SessionReport) {
    log::info!(
        "cycles: started={} completed={} failed={} skipped_busy={} stale={} overruns={} worst_latency={:?}",
        report.detection.cycles_started,
        report.detection.cycles_completed,
        report.detection.detector_failures,
        report.detection.skipped_busy,
        report.detection.stale_outcomes,
        report.detection.overruns,
        report.detection.worst_latency
    );
    log::info!(
        "presence: enters={} exits={} forced_exits={}",
        report.edges.enters,
        report.edges.exits,
        report.edges.forced_exits
    );
    log::info!(
        "alerts: announced={} suppressed={} cancelled={} safety_resets={} speech_failures={}",
        report.alert.announcements,
        report.alert.suppressed_enters,
        report.alert.cancellations,
        report.alert.forced_resets,
        report.alert.speech_failures
    );
    log::info!(
        "camera: active={} switches={} errors={} overlay_redraws={}",
        report.active_device.as_deref().unwrap_or("none"),
        report.device_switches,
        report.device_errors,
        report.overlay_redraws
    );
}
