use std::sync::Arc;

use crate::detection::domain::detector_registry::{DetectorEntry, DetectorRegistry};
use crate::detection::domain::region_detector::RegionDetector;

use super::cascade_detector::CascadeDetector;
use super::registry_config::{ConfigError, RegistryConfig};

/// Builds the registry from config, loading one cascade per entry.
///
/// An entry whose cascade cannot be loaded stays in the registry, disabled
/// and unavailable; startup continues with the remaining entries.
pub fn build_registry(config: &RegistryConfig) -> Result<DetectorRegistry, ConfigError> {
    let mut registry = DetectorRegistry::new();

    for cfg in &config.entries {
        let sensitivity = cfg.sensitivity()?;
        let caption = cfg.caption();

        let entry = match CascadeDetector::load(&cfg.cascade) {
            Ok(detector) => {
                let detector: Arc<dyn RegionDetector> = Arc::new(detector);
                DetectorEntry::new(&cfg.label, caption, cfg.color, sensitivity, detector)
                    .with_enabled(cfg.enabled)
            }
            Err(e) if cfg.enabled => {
                log::warn!("Disabling detector '{}': {e}", cfg.label);
                DetectorEntry::unavailable(&cfg.label, caption, cfg.color, sensitivity)
            }
            Err(e) => {
                log::debug!("Detector '{}' unavailable: {e}", cfg.label);
                DetectorEntry::unavailable(&cfg.label, caption, cfg.color, sensitivity)
            }
        };

        registry
            .register(entry)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let active = registry.entries().iter().filter(|e| e.is_enabled()).count();
    log::info!(
        "Detector registry ready: {active} of {} entries enabled",
        registry.len()
    );
    Ok(registry)
}
