use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::detection::domain::region_detector::RegionDetector;
use crate::detection::domain::sensitivity::Sensitivity;
use crate::shared::color::Rgb;
use crate::shared::constants::NO_DETECTION_LABEL;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry label must not be empty")]
    EmptyLabel,
    #[error("label '{0}' is reserved for frames without a detection")]
    ReservedLabel(String),
    #[error("label '{0}' is already registered")]
    DuplicateLabel(String),
    #[error("no registry entry labelled '{0}'")]
    UnknownLabel(String),
    #[error("entry '{0}' has no detector and cannot be enabled")]
    Unavailable(String),
    #[error("registry lock poisoned")]
    LockPoisoned,
}

/// One configured detector class.
///
/// An entry whose detector failed to load keeps its slot (and therefore its
/// order) but has no detector and stays disabled.
#[derive(Clone)]
pub struct DetectorEntry {
    label: String,
    caption: String,
    color: Rgb,
    sensitivity: Sensitivity,
    detector: Option<Arc<dyn RegionDetector>>,
    enabled: bool,
}

impl DetectorEntry {
    pub fn new(
        label: impl Into<String>,
        caption: impl Into<String>,
        color: Rgb,
        sensitivity: Sensitivity,
        detector: Arc<dyn RegionDetector>,
    ) -> Self {
        Self {
            label: label.into(),
            caption: caption.into(),
            color,
            sensitivity,
            detector: Some(detector),
            enabled: true,
        }
    }

    pub fn unavailable(
        label: impl Into<String>,
        caption: impl Into<String>,
        color: Rgb,
        sensitivity: Sensitivity,
    ) -> Self {
        Self {
            label: label.into(),
            caption: caption.into(),
            color,
            sensitivity,
            detector: None,
            enabled: false,
        }
    }

    /// Sets the initial enabled flag. Has no effect on unavailable entries.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled && self.detector.is_some();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn sensitivity(&self) -> &Sensitivity {
        &self.sensitivity
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_available(&self) -> bool {
        self.detector.is_some()
    }
}

impl std::fmt::Debug for DetectorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorEntry")
            .field("label", &self.label)
            .field("caption", &self.caption)
            .field("color", &self.color)
            .field("sensitivity", &self.sensitivity)
            .field("available", &self.is_available())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// An enabled entry frozen for the duration of one detection pass.
#[derive(Clone)]
pub struct ActiveEntry {
    pub order_index: usize,
    pub label: String,
    pub caption: String,
    pub color: Rgb,
    pub sensitivity: Sensitivity,
    pub detector: Arc<dyn RegionDetector>,
}

/// Immutable, registry-ordered list of the entries a pass will invoke.
#[derive(Clone, Default)]
pub struct RegistrySnapshot {
    entries: Vec<ActiveEntry>,
}

impl RegistrySnapshot {
    pub fn entries(&self) -> &[ActiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered list of detector entries. Order is registration order and is
/// both the drawing order and the arbitration tie-break order.
#[derive(Clone, Debug, Default)]
pub struct DetectorRegistry {
    entries: Vec<DetectorEntry>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: DetectorEntry) -> Result<(), RegistryError> {
        if entry.label.is_empty() {
            return Err(RegistryError::EmptyLabel);
        }
        if entry.label == NO_DETECTION_LABEL {
            return Err(RegistryError::ReservedLabel(entry.label));
        }
        if self.position(&entry.label).is_some() {
            return Err(RegistryError::DuplicateLabel(entry.label));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn remove(&mut self, label: &str) -> Result<DetectorEntry, RegistryError> {
        let idx = self
            .position(label)
            .ok_or_else(|| RegistryError::UnknownLabel(label.to_string()))?;
        Ok(self.entries.remove(idx))
    }

    pub fn set_enabled(&mut self, label: &str, enabled: bool) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.label == label)
            .ok_or_else(|| RegistryError::UnknownLabel(label.to_string()))?;
        if enabled && !entry.is_available() {
            return Err(RegistryError::Unavailable(label.to_string()));
        }
        entry.enabled = enabled;
        Ok(())
    }

    pub fn entries(&self) -> &[DetectorEntry] {
        &self.entries
    }

    pub fn get(&self, label: &str) -> Option<&DetectorEntry> {
        self.entries.iter().find(|e| e.label == label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Captures every enabled entry, keeping each one's registry position.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let entries = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.enabled)
            .filter_map(|(order_index, e)| {
                e.detector.as_ref().map(|detector| ActiveEntry {
                    order_index,
                    label: e.label.clone(),
                    caption: e.caption.clone(),
                    color: e.color,
                    sensitivity: e.sensitivity,
                    detector: Arc::clone(detector),
                })
            })
            .collect();
        RegistrySnapshot { entries }
    }

    fn position(&self, label: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.label == label)
    }
}

/// Process-wide handle to the registry.
///
/// Passes take a [`RegistrySnapshot`] when they start; toggles made while a
/// pass runs are only seen by the next one.
#[derive(Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<RwLock<DetectorRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: DetectorRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
        }
    }

    pub fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        let guard = self.inner.read().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(guard.snapshot())
    }

    pub fn set_enabled(&self, label: &str, enabled: bool) -> Result<(), RegistryError> {
        let mut guard = self.inner.write().map_err(|_| RegistryError::LockPoisoned)?;
        guard.set_enabled(label, enabled)?;
        log::info!(
            "Detector '{label}' {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    pub fn register(&self, entry: DetectorEntry) -> Result<(), RegistryError> {
        let mut guard = self.inner.write().map_err(|_| RegistryError::LockPoisoned)?;
        guard.register(entry)
    }

    pub fn remove(&self, label: &str) -> Result<DetectorEntry, RegistryError> {
        let mut guard = self.inner.write().map_err(|_| RegistryError::LockPoisoned)?;
        guard.remove(label)
    }

    pub fn labels(&self) -> Result<Vec<String>, RegistryError> {
        let guard = self.inner.read().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(guard.entries().iter().map(|e| e.label.clone()).collect())
    }
}
