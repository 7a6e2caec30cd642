//! Configuration file – reads/writes `~/.neurobridge/config.toml`.
//!
//! `NEUROBRIDGE_CONFIG` points at a different file.  Missing keys take their
//! defaults, and `NEUROBRIDGE_*` environment variables override whatever the
//! file says.

use neurobridge_runtime::ModelConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Persisted pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model artifact path; empty selects the stand-in adapter.
    pub model_path: String,
    pub update_rate_hz: f64,
    pub status_rate_hz: f64,
    pub input_size: usize,
    pub output_size: usize,
    pub confidence_threshold: f32,
    pub linear_scale: f32,
    pub angular_scale: f32,
    /// Listen address of the rosbridge WebSocket server.
    pub bridge_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        let model = ModelConfig::default();
        Self {
            model_path: "models/snn_model.json".to_string(),
            update_rate_hz: model.update_rate_hz,
            status_rate_hz: model.status_rate_hz,
            input_size: model.input_size,
            output_size: model.output_size,
            confidence_threshold: model.confidence_threshold,
            linear_scale: model.linear_scale,
            angular_scale: model.angular_scale,
            bridge_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

impl Config {
    /// The pipeline half of the configuration.
    pub fn to_model_config(&self) -> ModelConfig {
        let path = self.model_path.trim();
        ModelConfig {
            model_path: (!path.is_empty()).then(|| PathBuf::from(path)),
            update_rate_hz: self.update_rate_hz,
            status_rate_hz: self.status_rate_hz,
            input_size: self.input_size,
            output_size: self.output_size,
            confidence_threshold: self.confidence_threshold,
            linear_scale: self.linear_scale,
            angular_scale: self.angular_scale,
        }
    }

    pub fn bridge_socket_addr(&self) -> Result<SocketAddr, String> {
        self.bridge_addr
            .parse()
            .map_err(|e| format!("Invalid bridge_addr {:?}: {}", self.bridge_addr, e))
    }
}

/// `$NEUROBRIDGE_CONFIG`, else `~/.neurobridge/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("NEUROBRIDGE_CONFIG") {
        if !p.trim().is_empty() {
            return PathBuf::from(p);
        }
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".neurobridge").join("config.toml")
}

/// Load the config file with environment overrides applied.  `None` when
/// the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Parse a config file without looking at the environment.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `NEUROBRIDGE_*` environment overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `NEUROBRIDGE_MODEL_PATH` | `model_path` |
/// | `NEUROBRIDGE_UPDATE_RATE_HZ` | `update_rate_hz` |
/// | `NEUROBRIDGE_STATUS_RATE_HZ` | `status_rate_hz` |
/// | `NEUROBRIDGE_INPUT_SIZE` | `input_size` |
/// | `NEUROBRIDGE_OUTPUT_SIZE` | `output_size` |
/// | `NEUROBRIDGE_CONFIDENCE_THRESHOLD` | `confidence_threshold` |
/// | `NEUROBRIDGE_LINEAR_SCALE` | `linear_scale` |
/// | `NEUROBRIDGE_ANGULAR_SCALE` | `angular_scale` |
/// | `NEUROBRIDGE_BRIDGE_ADDR` | `bridge_addr` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("NEUROBRIDGE_MODEL_PATH") {
        cfg.model_path = v;
    }
    if let Some(v) = lookup("NEUROBRIDGE_BRIDGE_ADDR") {
        cfg.bridge_addr = v;
    }
    override_parsed(&lookup, "NEUROBRIDGE_UPDATE_RATE_HZ", &mut cfg.update_rate_hz);
    override_parsed(&lookup, "NEUROBRIDGE_STATUS_RATE_HZ", &mut cfg.status_rate_hz);
    override_parsed(&lookup, "NEUROBRIDGE_INPUT_SIZE", &mut cfg.input_size);
    override_parsed(&lookup, "NEUROBRIDGE_OUTPUT_SIZE", &mut cfg.output_size);
    override_parsed(&lookup, "NEUROBRIDGE_CONFIDENCE_THRESHOLD", &mut cfg.confidence_threshold);
    override_parsed(&lookup, "NEUROBRIDGE_LINEAR_SCALE", &mut cfg.linear_scale);
    override_parsed(&lookup, "NEUROBRIDGE_ANGULAR_SCALE", &mut cfg.angular_scale);
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut T,
) {
    if let Some(parsed) = lookup(key).and_then(|v| v.trim().parse().ok()) {
        *field = parsed;
    }
}

/// Save the config, creating its directory if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
