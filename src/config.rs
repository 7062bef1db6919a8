use std::{collections::HashSet, net::SocketAddr, path::Path, path::PathBuf};

use figment::{providers::Format, Figment};
use serde::{Deserialize, Serialize};

use crate::engine::{is_valid_key, BoundingBox};

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub system: ConfigSystem,
    pub surveillance: ConfigSurveillance,
    pub detector: ConfigDetector,
    #[serde(default)]
    pub trigger: ConfigTrigger,
    pub camera: Vec<ConfigCamera>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ConfigSystem {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ConfigSystem {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            listen: default_listen(),
        }
    }
}

/// Synology Surveillance Station, the source of camera snapshots.
///
/// URL templates substitute `{base}`, `{user}`, `{password}` and `{camera_id}`.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ConfigSurveillance {
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_session_url")]
    pub session_url: String,
    #[serde(default = "default_snapshot_url")]
    pub snapshot_url: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ConfigDetector {
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ConfigTrigger {
    /// Minimum number of seconds between two triggers of the same camera
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    pub homebridge_webhook_url: Option<String>,
}

impl Default for ConfigTrigger {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            state_dir: default_state_dir(),
            homebridge_webhook_url: None,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ConfigCamera {
    /// Surveillance Station camera id, also the webhook path
    pub id: String,
    pub name: String,
    pub trigger_url: String,
    pub homekit_acc_id: Option<String>,
    /// Vertical anchor position within a box, 0.5 is the centre and 0 the bottom edge
    #[serde(default = "default_anchor_offset")]
    pub anchor_offset: f64,
    #[serde(default)]
    pub detect_objects: Vec<ConfigDetectObject>,
}

/// A detection rule as written in the file. Fields are optional here so a single broken rule
/// disables its camera instead of failing the whole configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ConfigDetectObject {
    #[serde(rename = "type")]
    pub object_type: Option<String>,
    #[serde(alias = "min_sizex")]
    pub min_width: Option<i64>,
    #[serde(alias = "min_sizey")]
    pub min_height: Option<i64>,
    pub min_confidence: Option<f64>,
    #[serde(default)]
    pub ignore_areas: Vec<BoundingBox>,
    #[serde(default)]
    pub ignore_polygons: Vec<Vec<[i64; 2]>>,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_session_url() -> String {
    "{base}/webapi/auth.cgi?api=SYNO.API.Auth&method=Login&version=3&account={user}&passwd={password}&session=SurveillanceStation".into()
}

fn default_snapshot_url() -> String {
    "{base}/webapi/entry.cgi?camStm=1&version=2&cameraId={camera_id}&api=SYNO.SurveillanceStation.Camera&method=GetSnapshot".into()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    60
}

fn default_state_dir() -> PathBuf {
    "/tmp/detect_trigger".into()
}

fn default_anchor_offset() -> f64 {
    0.5
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, String> {
    let cfg: Config = Figment::new()
        .merge(figment::providers::Env::prefixed("DETECT_TRIGGER_"))
        .merge(figment::providers::Toml::file(path))
        .extract()
        .map_err(|e| e.to_string())?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), String> {
    // Ids name the per-camera state files, so they must be unique and path safe
    let mut ids = HashSet::new();
    for cam in &cfg.camera {
        if !is_valid_key(&cam.id) {
            return Err(format!(
                "Camera {} has invalid ID `{}`. Only letters, digits, `_` and `-` are allowed",
                cam.name, cam.id
            ));
        }
        if !ids.insert(cam.id.as_str()) {
            return Err(format!("Camera {} has duplicate ID: {}", cam.name, cam.id));
        }
    }
    Ok(())
}
