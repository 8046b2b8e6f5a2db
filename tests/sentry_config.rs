use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use presence_sentry::config::SentryConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENTRY_CONFIG",
        "SENTRY_POLL_INTERVAL_MS",
        "SENTRY_SAFETY_VALVE_SECS",
        "SENTRY_DETECTOR",
        "SENTRY_SCENARIO",
        "SENTRY_DEVICE_ID",
        "SENTRY_SPEECH_COMMAND",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let scenario_path = file.path().with_extension("scenario.json");
    let json = format!(
        r#"{{
            "detection": {{
                "poll_interval_ms": 250,
                "max_consecutive_failures": 5
            }},
            "alert": {{
                "safety_valve_secs": 30,
                "person_class": "pedestrian"
            }},
            "detector": {{
                "backend": "scripted",
                "scenario_path": "{}"
            }},
            "camera": {{
                "device_id": "front",
                "devices": [
                    {{"device_id": "front", "label": "Front door"}},
                    {{"device_id": "rear"}}
                ],
                "width": 320,
                "height": 240,
                "warmup_ms": 0,
                "denied": ["rear"]
            }},
            "speech": {{
                "words_per_minute": 200
            }},
            "overlay": {{
                "color": [255, 0, 0, 255],
                "line_width": 3
            }}
        }}"#,
        scenario_path.display()
    );
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SENTRY_CONFIG", file.path());
    std::env::set_var("SENTRY_POLL_INTERVAL_MS", "50");
    std::env::set_var("SENTRY_DEVICE_ID", "rear");
    std::env::set_var("SENTRY_SPEECH_COMMAND", "espeak-ng -s 160");

    let cfg = SentryConfig::load().expect("load config");

    assert_eq!(cfg.poll_interval, Duration::from_millis(50));
    assert_eq!(cfg.max_consecutive_failures, Some(5));
    assert_eq!(cfg.safety_valve, Duration::from_secs(30));
    assert_eq!(cfg.person_class, "pedestrian");
    assert_eq!(cfg.detector.backend, "scripted");
    assert_eq!(cfg.detector.scenario_path.unwrap(), scenario_path);
    assert_eq!(cfg.camera.device_id.as_deref(), Some("rear"));
    assert_eq!(cfg.camera.devices.len(), 2);
    assert_eq!(cfg.camera.devices[1].display_label(1), "Camera 2");
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));
    assert_eq!(cfg.camera.warmup, Duration::ZERO);
    assert_eq!(cfg.camera.denied, vec!["rear"]);
    assert_eq!(
        cfg.speech.command.unwrap(),
        vec!["espeak-ng", "-s", "160"]
    );
    assert_eq!(cfg.speech.words_per_minute, 200);
    assert_eq!(cfg.overlay.color, [255, 0, 0, 255]);
    assert_eq!(cfg.overlay.line_width, 3);
    assert_eq!(cfg.overlay.font_px, 18.0);

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SentryConfig::load().expect("load config");
    assert_eq!(cfg.poll_interval, Duration::from_millis(100));
    assert_eq!(cfg.safety_valve, Duration::from_secs(10));
    assert_eq!(cfg.detector.backend, "stub");
    assert!(cfg.camera.device_id.is_none());
    assert_eq!(cfg.camera.devices[0].device_id, "synthetic:0");

    clear_env();
}

#[test]
fn rejects_malformed_env_override() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTRY_SAFETY_VALVE_SECS", "soon");
    let err = SentryConfig::load().unwrap_err();
    assert!(err.to_string().contains("SENTRY_SAFETY_VALVE_SECS"));

    std::env::set_var("SENTRY_SAFETY_VALVE_SECS", "0");
    assert!(SentryConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    std::env::set_var("SENTRY_CONFIG", dir.path().join("absent.json"));
    let err = SentryConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
