use serde::{Deserialize, Serialize};

use crate::erm::erm_models::Cardinality;

pub const MIN_ZOOM: f32 = 0.2;
pub const MAX_ZOOM: f32 = 5.0;
pub const MIN_FONT_SIZE: u32 = 5;
pub const MAX_FONT_SIZE: u32 = 100;
pub const FONT_SIZE_STEP: u32 = 5;

#[derive(Debug, derive_more::From)]
pub enum SettingsError {
    Io(std::io::Error),
    TomlDe(toml::de::Error),
    TomlSer(toml::ser::Error),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot access settings file: {e}"),
            Self::TomlDe(e) => write!(f, "invalid settings: {e}"),
            Self::TomlSer(e) => write!(f, "cannot write settings: {e}"),
        }
    }
}

impl std::error::Error for SettingsError {}

/// Editor defaults, stored as TOML. Missing keys fall back to the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    pub grid_size: i32,
    pub grid_show: bool,
    pub font_size: u32,
    pub zoom: f32,
    /// Multiplier applied per zoom step; zooming in divides by it.
    pub zoom_factor: f32,
    pub default_cardinality: Cardinality,
    pub entity_name: String,
    pub attribute_name: String,
    pub relation_name: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            grid_size: 25,
            grid_show: true,
            font_size: 12,
            zoom: 1.5,
            zoom_factor: 0.8,
            default_cardinality: Cardinality::Multiple,
            entity_name: "Entity".to_owned(),
            attribute_name: "Attribute".to_owned(),
            relation_name: String::new(),
        }
    }
}

impl EditorSettings {
    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        let mut settings: Self = toml::from_str(s)?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, SettingsError> {
        let s = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&s)?;
        tracing::info!(path = %path.display(), "loaded editor settings");
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), SettingsError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    fn sanitize(&mut self) {
        let defaults = Self::default();
        if self.grid_size <= 0 {
            tracing::warn!(grid_size = self.grid_size, "grid size must be positive");
            self.grid_size = defaults.grid_size;
        }
        if !(self.zoom_factor > 0.0 && self.zoom_factor < 1.0) {
            tracing::warn!(zoom_factor = self.zoom_factor, "zoom factor must be within (0, 1)");
            self.zoom_factor = defaults.zoom_factor;
        }
        self.zoom = if self.zoom.is_finite() {
            self.zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            defaults.zoom
        };
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
    }
}
