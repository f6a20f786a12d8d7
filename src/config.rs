use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use ringmark_vision::YuNetOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::compose::RingStyle;
use crate::geometry::GeometryPolicy;
use crate::text::TextPolicy;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("RINGMARK_CONFIG_PATH").unwrap_or("/usr/local/etc/ringmark/config.toml"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// YuNet ONNX model; no detection runs when unset.
    pub model: Option<PathBuf>,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    /// One detector pass per input size.
    pub input_sizes: Vec<u32>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let yunet = YuNetOptions::default();
        Self {
            model: None,
            score_threshold: yunet.score_threshold,
            nms_threshold: yunet.nms_threshold,
            input_sizes: vec![yunet.input_size, 320],
        }
    }
}

impl DetectorConfig {
    pub fn passes(&self) -> impl Iterator<Item = YuNetOptions> + '_ {
        self.input_sizes.iter().map(|&input_size| YuNetOptions {
            input_size,
            score_threshold: self.score_threshold,
            nms_threshold: self.nms_threshold,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ring: RingStyle,
    pub text: TextPolicy,
    pub geometry: GeometryPolicy,
    pub detector: DetectorConfig,
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
