use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::sensitivity::{Sensitivity, SensitivityError};
use crate::shared::color::Rgb;
use crate::shared::constants::{DEFAULT_MIN_NEIGHBORS, DEFAULT_SCALE_FACTOR, NO_DETECTION_LABEL};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read registry config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse registry config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("entry '{label}': {source}")]
    Sensitivity {
        label: String,
        #[source]
        source: SensitivityError,
    },
    #[error("invalid registry config: {0}")]
    Invalid(String),
}

/// One detector class as written in the registry config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    pub label: String,
    /// Text drawn above each region. Defaults to the label with spaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub cascade: PathBuf,
    pub color: Rgb,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    #[serde(default = "default_min_neighbors")]
    pub min_neighbors: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<(u32, u32)>,
}

fn default_enabled() -> bool {
    true
}

fn default_scale_factor() -> f64 {
    DEFAULT_SCALE_FACTOR
}

fn default_min_neighbors() -> u32 {
    DEFAULT_MIN_NEIGHBORS
}

impl EntryConfig {
    pub fn caption(&self) -> String {
        self.caption
            .clone()
            .unwrap_or_else(|| self.label.replace('_', " "))
    }

    pub fn sensitivity(&self) -> Result<Sensitivity, ConfigError> {
        Sensitivity::new(self.scale_factor, self.min_neighbors, self.min_size).map_err(|source| {
            ConfigError::Sensitivity {
                label: self.label.clone(),
                source,
            }
        })
    }
}

/// Ordered registry configuration. Entry order is registry order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub entries: Vec<EntryConfig>,
}

impl RegistryConfig {
    /// Loads and validates a JSON config. Relative cascade paths resolve
    /// against the config file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: RegistryConfig = serde_json::from_str(&json)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn resolve_relative_to(&mut self, base: &Path) {
        for entry in &mut self.entries {
            if entry.cascade.is_relative() {
                entry.cascade = base.join(&entry.cascade);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.label.is_empty() {
                return Err(ConfigError::Invalid("entry label must not be empty".into()));
            }
            if entry.label == NO_DETECTION_LABEL {
                return Err(ConfigError::Invalid(format!(
                    "label '{NO_DETECTION_LABEL}' is reserved"
                )));
            }
            if !seen.insert(entry.label.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate label '{}'",
                    entry.label
                )));
            }
            entry.sensitivity()?;
        }
        Ok(())
    }

    /// Applies operator enable/disable overrides by label.
    pub fn apply_overrides(
        &mut self,
        enable: &[String],
        disable: &[String],
    ) -> Result<(), ConfigError> {
        for (labels, value) in [(enable, true), (disable, false)] {
            for label in labels {
                let entry = self
                    .entries
                    .iter_mut()
                    .find(|e| &e.label == label)
                    .ok_or_else(|| ConfigError::Invalid(format!("unknown label '{label}'")))?;
                entry.enabled = value;
            }
        }
        Ok(())
    }

    /// The built-in traffic sign classes. Only `face` starts enabled.
    pub fn traffic_signs(cascade_dir: &Path) -> Self {
        // (label, caption, cascade file, BGR color)
        const CLASSES: [(&str, &str, &str, (u8, u8, u8)); 12] = [
            ("face", "Faces", "haarcascade_frontalface_default.xml", (0, 255, 0)),
            ("entry_forbidden", "entry forbidden", "cascade_entry_forbidden.xml", (255, 0, 0)),
            ("pedestrians", "pedestrians", "cascade_pedestrians.xml", (255, 128, 0)),
            ("turn_right", "turn right", "cascade_turn_right.xml", (128, 255, 0)),
            ("main_road", "main road", "cascade_main_road.xml", (0, 255, 255)),
            ("turn_left", "turn left", "cascade_turn_left.xml", (0, 128, 0)),
            ("warning", "warning", "cascade_warning.xml", (0, 128, 128)),
            ("no_parking", "no parking", "cascade_no_parking.xml", (255, 255, 128)),
            ("bus_stop", "bus stop", "cascade_bus_stop.xml", (255, 255, 0)),
            ("entry_crossing", "crossing", "cascade_crossing.xml", (255, 255, 0)),
            ("entry_slippery", "slippery", "cascade_slippery.xml", (255, 255, 0)),
            ("entry_road_closed", "road closed", "cascade_road_closed.xml", (255, 255, 0)),
        ];

        let entries = CLASSES
            .iter()
            .map(|&(label, caption, file, (b, g, r))| EntryConfig {
                label: label.to_string(),
                caption: Some(caption.to_string()),
                cascade: cascade_dir.join(file),
                color: Rgb::from_bgr(b, g, r),
                enabled: label == "face",
                scale_factor: DEFAULT_SCALE_FACTOR,
                min_neighbors: DEFAULT_MIN_NEIGHBORS,
                min_size: None,
            })
            .collect();
        Self { entries }
    }
}
