use std::io::Write;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use brush_witness::config::ServiceConfig;
use brush_witness::ObjectClass;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "BRUSH_CONFIG",
        "BRUSH_API_ADDR",
        "PORT",
        "CAMERA_INDEX",
        "BRUSH_CAMERA_DEVICE",
        "YOLO_MODEL",
        "BRUSH_REQUIRED_SECS",
        "BRUSH_GRACE_SECS",
        "BRUSH_CONF_THRES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "api_addr": "0.0.0.0:9000",
        "camera": { "device": "stub://bathroom", "target_fps": 12, "width": 320, "height": 240 },
        "detector": { "backend": "scripted", "script": "always" },
        "classes": ["person", "toothbrush"],
        "session": { "required_sec": 30, "grace_sec": 1.5, "conf_thres": 0.5 },
        "preview": false
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("BRUSH_CONFIG", file.path());
    std::env::set_var("PORT", "5050");
    std::env::set_var("BRUSH_GRACE_SECS", "0.9");

    let cfg = ServiceConfig::load().expect("load config");

    assert_eq!(cfg.api_addr, "0.0.0.0:5050");
    assert_eq!(cfg.camera.device, "stub://bathroom");
    assert_eq!(cfg.camera.target_fps, 12);
    assert_eq!(cfg.camera.width, 320);
    assert_eq!(cfg.camera.height, 240);
    assert_eq!(cfg.detector.script, "always");
    assert_eq!(cfg.classes, vec![ObjectClass::PERSON, ObjectClass::TOOTHBRUSH]);
    assert_eq!(cfg.session.required_duration, 30.0);
    assert_eq!(cfg.session.grace_duration, 0.9);
    assert_eq!(cfg.session.confidence_floor, 0.5);
    assert!(!cfg.preview);

    clear_env();
}

#[test]
fn loads_toml_file_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
api_addr = "127.0.0.1:7000"
classes = ["toothbrush"]

[camera]
index = 3

[session]
required_duration = 12.0
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("BRUSH_CONFIG", file.path());

    let cfg = ServiceConfig::load().expect("load config");
    assert_eq!(cfg.api_addr, "127.0.0.1:7000");
    assert_eq!(cfg.camera.device, "/dev/video3");
    assert_eq!(cfg.classes, vec![ObjectClass::TOOTHBRUSH]);
    assert_eq!(cfg.session.required_duration, 12.0);
    assert_eq!(cfg.session.grace_duration, 0.75);

    clear_env();
}

#[test]
fn camera_env_overrides_apply_in_order() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAMERA_INDEX", "1");
    let cfg = ServiceConfig::load().expect("load config");
    assert_eq!(cfg.camera.device, "/dev/video1");

    std::env::set_var("BRUSH_CAMERA_DEVICE", "stub://override");
    let cfg = ServiceConfig::load().expect("load config");
    assert_eq!(cfg.camera.device, "stub://override");

    clear_env();
}

#[test]
fn rejects_invalid_session_defaults_and_bad_numbers() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BRUSH_REQUIRED_SECS", "0");
    assert!(ServiceConfig::load().is_err());
    clear_env();

    std::env::set_var("BRUSH_CONF_THRES", "1.5");
    assert!(ServiceConfig::load().is_err());
    clear_env();

    std::env::set_var("PORT", "not-a-port");
    assert!(ServiceConfig::load().is_err());
    clear_env();

    std::env::set_var("BRUSH_CONFIG", "/nonexistent/brush.json");
    assert!(ServiceConfig::load().is_err());
    clear_env();
}

#[test]
fn yolo_model_selects_tract_backend() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("YOLO_MODEL", "/models/yolov8n.onnx");
    let cfg = ServiceConfig::load().expect("load config");
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(
        cfg.detector.model_path.as_deref(),
        Some(std::path::Path::new("/models/yolov8n.onnx"))
    );

    clear_env();
}
