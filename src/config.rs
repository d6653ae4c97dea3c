use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{BackendRegistry, ObjectClass, ScriptedBackend, DEFAULT_REQUIRED_CLASSES};
use crate::ingest::{CameraConfig, STUB_SCHEME};
use crate::session::SessionConfig;

const DEFAULT_API_ADDR: &str = "127.0.0.1:5001";
const DEFAULT_TARGET_FPS: u32 = 15;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_SCRIPT: &str = "intermittent";

pub const BACKEND_SCRIPTED: &str = "scripted";
pub const BACKEND_TRACT: &str = "tract";

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    api_addr: Option<String>,
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    classes: Option<Vec<String>>,
    session: Option<SessionConfig>,
    preview: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    index: Option<u32>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    script: Option<String>,
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_addr: String,
    pub camera: CameraConfig,
    pub detector: DetectorSettings,
    /// Classes that must all be visible for a frame to count.
    pub classes: Vec<ObjectClass>,
    /// Session parameters used until the first `/api/start`.
    pub session: SessionConfig,
    pub preview: bool,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `scripted` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    /// Scripted scene: `always`, `intermittent` or `empty`.
    pub script: String,
}

/// Camera used when nothing is configured. Real devices need `ingest-v4l2`.
fn default_device() -> String {
    if cfg!(feature = "ingest-v4l2") {
        CameraConfig::device_for_index(0)
    } else {
        format!("{STUB_SCHEME}mirror")
    }
}

impl ServiceConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BRUSH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Result<Self> {
        let api_addr = file
            .api_addr
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());

        let camera_file = file.camera.unwrap_or_default();
        let device = match (camera_file.device, camera_file.index) {
            (Some(device), _) => device,
            (None, Some(index)) => CameraConfig::device_for_index(index),
            (None, None) => default_device(),
        };
        let camera = CameraConfig {
            device,
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            width: camera_file.width.unwrap_or(DEFAULT_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_HEIGHT),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| BACKEND_SCRIPTED.to_string()),
            model_path: detector_file.model_path,
            input_size: detector_file.input_size.unwrap_or(DEFAULT_MODEL_INPUT),
            script: detector_file
                .script
                .unwrap_or_else(|| DEFAULT_SCRIPT.to_string()),
        };

        let classes = match file.classes {
            Some(labels) => parse_classes(&labels)?,
            None => DEFAULT_REQUIRED_CLASSES.to_vec(),
        };

        Ok(Self {
            api_addr,
            camera,
            detector,
            classes,
            session: file.session.unwrap_or_default(),
            preview: file.preview.unwrap_or(true),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("BRUSH_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr.trim().to_string();
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| anyhow!("PORT must be a TCP port number"))?;
            self.api_addr = with_port(&self.api_addr, port)?;
        }
        if let Ok(index) = std::env::var("CAMERA_INDEX") {
            let index: u32 = index
                .trim()
                .parse()
                .map_err(|_| anyhow!("CAMERA_INDEX must be a non-negative integer"))?;
            self.camera.device = CameraConfig::device_for_index(index);
        }
        if let Ok(device) = std::env::var("BRUSH_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device.trim().to_string();
            }
        }
        if let Ok(model) = std::env::var("YOLO_MODEL") {
            if !model.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(model.trim()));
                self.detector.backend = BACKEND_TRACT.to_string();
            }
        }
        if let Ok(value) = std::env::var("BRUSH_REQUIRED_SECS") {
            self.session.required_duration = parse_env_f64("BRUSH_REQUIRED_SECS", &value)?;
        }
        if let Ok(value) = std::env::var("BRUSH_GRACE_SECS") {
            self.session.grace_duration = parse_env_f64("BRUSH_GRACE_SECS", &value)?;
        }
        if let Ok(value) = std::env::var("BRUSH_CONF_THRES") {
            self.session.confidence_floor = parse_env_f64("BRUSH_CONF_THRES", &value)? as f32;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.session
            .validate()
            .context("invalid default session configuration")?;
        if self.classes.is_empty() {
            return Err(anyhow!("at least one required class must be configured"));
        }
        self.classes.sort();
        self.classes.dedup();
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        match self.detector.backend.as_str() {
            BACKEND_SCRIPTED => {
                scripted_backend(&self.detector.script)?;
            }
            BACKEND_TRACT => {
                if self.detector.model_path.is_none() {
                    return Err(anyhow!("tract backend requires a model path (YOLO_MODEL)"));
                }
                if self.detector.input_size == 0 {
                    return Err(anyhow!("detector input_size must be greater than zero"));
                }
            }
            other => return Err(anyhow!("unknown detector backend '{}'", other)),
        }
        Ok(())
    }

    /// Build the registry holding the configured detector as its default.
    pub fn build_registry(&self) -> Result<BackendRegistry> {
        let mut registry = BackendRegistry::new();
        match self.detector.backend.as_str() {
            BACKEND_SCRIPTED => registry.register(scripted_backend(&self.detector.script)?),
            BACKEND_TRACT => register_tract(&mut registry, &self.detector)?,
            other => return Err(anyhow!("unknown detector backend '{}'", other)),
        }
        Ok(registry)
    }
}

#[cfg(feature = "backend-tract")]
fn register_tract(registry: &mut BackendRegistry, settings: &DetectorSettings) -> Result<()> {
    let path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires a model path"))?;
    let backend = crate::detect::TractBackend::new(path, settings.input_size)?;
    registry.register(backend);
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_tract(_registry: &mut BackendRegistry, _settings: &DetectorSettings) -> Result<()> {
    Err(anyhow!(
        "tract backend requested but this build lacks the backend-tract feature"
    ))
}

fn scripted_backend(script: &str) -> Result<ScriptedBackend> {
    match script {
        "always" => Ok(ScriptedBackend::always_brushing()),
        "intermittent" => Ok(ScriptedBackend::intermittent()),
        "empty" => Ok(ScriptedBackend::empty()),
        other => Err(anyhow!("unknown detector script '{}'", other)),
    }
}

fn parse_classes(labels: &[String]) -> Result<Vec<ObjectClass>> {
    labels
        .iter()
        .map(|label| {
            ObjectClass::from_label(label).ok_or_else(|| anyhow!("unknown class label '{}'", label))
        })
        .collect()
}

fn parse_env_f64(key: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be a number", key))
}

fn with_port(addr: &str, port: u16) -> Result<String> {
    let (host, _) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("api address '{}' has no port", addr))?;
    Ok(format!("{host}:{port}"))
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let mut cfg = ServiceConfig::from_file(ServiceConfigFile::default()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.api_addr, DEFAULT_API_ADDR);
        assert_eq!(cfg.session, SessionConfig::default());
        assert_eq!(cfg.classes, DEFAULT_REQUIRED_CLASSES.to_vec());
        assert_eq!(cfg.detector.backend, BACKEND_SCRIPTED);
    }

    #[test]
    fn with_port_replaces_only_port() {
        assert_eq!(with_port("0.0.0.0:5001", 8080).unwrap(), "0.0.0.0:8080");
        assert_eq!(with_port("[::1]:5001", 7).unwrap(), "[::1]:7");
        assert!(with_port("localhost", 7).is_err());
    }

    #[test]
    fn camera_index_maps_to_video_device() {
        let file = ServiceConfigFile {
            camera: Some(CameraConfigFile {
                index: Some(2),
                ..CameraConfigFile::default()
            }),
            ..ServiceConfigFile::default()
        };
        let cfg = ServiceConfig::from_file(file).unwrap();
        assert_eq!(cfg.camera.device, "/dev/video2");
    }

    #[test]
    fn validate_rejects_bad_session_and_backend() {
        let mut cfg = ServiceConfig::from_file(ServiceConfigFile::default()).unwrap();
        cfg.session.grace_duration = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = ServiceConfig::from_file(ServiceConfigFile::default()).unwrap();
        cfg.detector.backend = BACKEND_TRACT.to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = ServiceConfig::from_file(ServiceConfigFile::default()).unwrap();
        cfg.detector.script = "dancing".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn classes_are_parsed_and_deduplicated() {
        let file = ServiceConfigFile {
            classes: Some(vec![
                "toothbrush".to_string(),
                "person".to_string(),
                "79".to_string(),
            ]),
            ..ServiceConfigFile::default()
        };
        let mut cfg = ServiceConfig::from_file(file).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.classes, vec![ObjectClass::PERSON, ObjectClass::TOOTHBRUSH]);

        let file = ServiceConfigFile {
            classes: Some(vec!["unicorn".to_string()]),
            ..ServiceConfigFile::default()
        };
        assert!(ServiceConfig::from_file(file).is_err());
    }

    #[test]
    fn scripted_registry_has_default() {
        let cfg = ServiceConfig::from_file(ServiceConfigFile::default()).unwrap();
        let registry = cfg.build_registry().unwrap();
        assert_eq!(registry.default_name(), Some("scripted"));
    }
}
