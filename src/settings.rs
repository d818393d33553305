//! Player settings and build parameters
//!
//! Persisted as JSON in LocalStorage on the web, or read from a JSON file
//! natively.

use serde::{Deserialize, Serialize};

use crate::consts::{GRAVEYARD_SIDE, SKY_AREA_PER_CLOUD, TERRAIN_DENSITY};
use crate::controller::ControllerSettings;
use crate::scene::SceneConfig;

/// Quality preset levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QualityPreset {
    Low,
    Medium,
    #[default]
    High,
}

impl QualityPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::Low => "Low",
            QualityPreset::Medium => "Medium",
            QualityPreset::High => "High",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(QualityPreset::Low),
            "medium" | "med" => Some(QualityPreset::Medium),
            "high" => Some(QualityPreset::High),
            _ => None,
        }
    }

    /// Rain drops in the scene
    pub fn rain_particles(&self) -> usize {
        match self {
            QualityPreset::Low => 2_000,
            QualityPreset::Medium => 5_000,
            QualityPreset::High => 10_000,
        }
    }

    /// Sky area covered by each cloud; bigger means fewer clouds
    pub fn sky_area_per_cloud(&self) -> f32 {
        match self {
            QualityPreset::Low => SKY_AREA_PER_CLOUD * 3.0,
            QualityPreset::Medium => SKY_AREA_PER_CLOUD * 1.5,
            QualityPreset::High => SKY_AREA_PER_CLOUD,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub quality: QualityPreset,
    /// Fixed scene seed; a fresh one is drawn per page load when unset
    pub seed: Option<u64>,
    /// Extra placement logging
    pub debug: bool,

    // === World ===
    pub graveyard_side: f32,
    pub terrain_density: f32,

    // === Player ===
    pub controller: ControllerSettings,

    // === Weather ===
    pub lightning: bool,
    pub rain: bool,

    // === HUD ===
    pub show_hint: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: QualityPreset::High,
            seed: None,
            debug: false,

            graveyard_side: GRAVEYARD_SIDE,
            terrain_density: TERRAIN_DENSITY,

            controller: ControllerSettings::default(),

            lightning: true,
            rain: true,

            show_hint: false,
        }
    }
}

impl Settings {
    /// Create settings from a quality preset
    pub fn from_preset(preset: QualityPreset) -> Self {
        let mut settings = Self::default();
        settings.apply_preset(preset);
        settings
    }

    pub fn apply_preset(&mut self, preset: QualityPreset) {
        self.quality = preset;

        // Coarser terrain keeps probing cheap on low-end machines
        self.terrain_density = if preset == QualityPreset::Low {
            TERRAIN_DENSITY / 2.0
        } else {
            TERRAIN_DENSITY
        };
    }

    /// Build parameters; `fallback_seed` is used when no seed is pinned
    pub fn scene_config(&self, fallback_seed: u64) -> SceneConfig {
        SceneConfig {
            seed: self.seed.unwrap_or(fallback_seed),
            debug: self.debug,
            graveyard_side: self.graveyard_side,
            terrain_density: self.terrain_density,
            rain_particles: self.quality.rain_particles(),
            sky_area_per_cloud: self.quality.sky_area_per_cloud(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// LocalStorage key
    const STORAGE_KEY: &'static str = "graveyard_walk_settings";

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                match Self::from_json(&json) {
                    Ok(settings) => {
                        log::info!("Loaded settings from LocalStorage");
                        return settings;
                    }
                    Err(err) => log::warn!("Ignoring stored settings: {err}"),
                }
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Save settings to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Settings saved");
            }
        }
    }

    /// Read settings from a JSON file; missing fields take their defaults
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_file(path: impl AsRef<std::path::Path>) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_parsing() {
        assert_eq!(QualityPreset::from_str("MED"), Some(QualityPreset::Medium));
        assert_eq!(QualityPreset::from_str("ultra"), None);
        for preset in [QualityPreset::Low, QualityPreset::Medium, QualityPreset::High] {
            assert_eq!(QualityPreset::from_str(preset.as_str()), Some(preset));
        }
    }

    #[test]
    fn test_low_preset_thins_the_scene() {
        let low = Settings::from_preset(QualityPreset::Low).scene_config(1);
        let high = Settings::from_preset(QualityPreset::High).scene_config(1);
        assert!(low.rain_particles < high.rain_particles);
        assert!(low.sky_area_per_cloud > high.sky_area_per_cloud);
        assert!(low.terrain_density < high.terrain_density);
    }

    #[test]
    fn test_pinned_seed_wins() {
        let mut settings = Settings::default();
        assert_eq!(settings.scene_config(9).seed, 9);
        settings.seed = Some(4);
        assert_eq!(settings.scene_config(9).seed, 4);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings = Settings::from_json(r#"{"quality":"Low","debug":true}"#).unwrap();
        assert_eq!(settings.quality, QualityPreset::Low);
        assert!(settings.debug);
        assert_eq!(settings.graveyard_side, GRAVEYARD_SIDE);
        assert!(!settings.controller.collisions);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(matches!(Settings::from_json("{"), Err(SettingsError::Json(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut settings = Settings::from_preset(QualityPreset::Medium);
        settings.seed = Some(77);
        settings.controller.collisions = true;
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(Settings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_file_roundtrip_pins_seed() {
        let path = std::env::temp_dir().join(format!("graveyard_walk_settings_{}.json", std::process::id()));
        let settings = Settings {
            seed: Some(1234),
            ..Settings::from_preset(QualityPreset::Low)
        };
        settings.save_file(&path).unwrap();
        let loaded = Settings::load_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, settings);
        assert_eq!(loaded.scene_config(9).seed, 1234);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("graveyard_walk_no_such_settings.json");
        assert!(matches!(Settings::load_file(&path), Err(SettingsError::Io(_))));
    }
}
