//! Viewer configuration.
//!
//! Display defaults for the overlay can be built programmatically, taken from
//! stored display preferences, read from `MARGINALIA_*` environment variables,
//! or loaded from a flat `key = value` TOML file.

use std::fs;
use std::io;
use std::path::Path;

use doc_model::{DisplayOptions, ViewMode};

use crate::overlay::DEFAULT_LABEL_FONT_PX;

pub const ENV_VIEW_MODE: &str = "MARGINALIA_VIEW_MODE";
pub const ENV_SHOW_STUDENT_NAMES: &str = "MARGINALIA_SHOW_STUDENT_NAMES";
pub const ENV_SHOW_HIGHLIGHT_COUNT: &str = "MARGINALIA_SHOW_HIGHLIGHT_COUNT";
pub const ENV_LABEL_FONT_PX: &str = "MARGINALIA_LABEL_FONT_PX";

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub view_mode: ViewMode,
    pub show_student_names: bool,
    pub show_highlight_count: bool,
    /// Label font size at scale 1.0
    pub label_font_px: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            view_mode: ViewMode::Double,
            show_student_names: true,
            show_highlight_count: true,
            label_font_px: DEFAULT_LABEL_FONT_PX,
        }
    }
}

impl ViewerConfig {
    pub fn with_view_mode(mut self, view_mode: ViewMode) -> Self {
        self.view_mode = view_mode;
        self
    }

    pub fn with_student_names(mut self, show: bool) -> Self {
        self.show_student_names = show;
        self
    }

    pub fn with_highlight_count(mut self, show: bool) -> Self {
        self.show_highlight_count = show;
        self
    }

    pub fn with_label_font_px(mut self, px: f64) -> Self {
        self.label_font_px = px;
        self
    }

    /// Takes view mode and label toggles from stored display preferences.
    pub fn with_display_options(mut self, options: &DisplayOptions) -> Self {
        self.view_mode = options.view_mode;
        self.show_student_names = options.show_student_names;
        self.show_highlight_count = options.show_highlight_count;
        self
    }

    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            show_student_names: self.show_student_names,
            show_highlight_count: self.show_highlight_count,
            view_mode: self.view_mode,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// - `MARGINALIA_VIEW_MODE`: `single` or `double`
    /// - `MARGINALIA_SHOW_STUDENT_NAMES`: boolean
    /// - `MARGINALIA_SHOW_HIGHLIGHT_COUNT`: boolean
    /// - `MARGINALIA_LABEL_FONT_PX`: positive number
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Overrides fields with whichever `MARGINALIA_*` variables are set.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        for key in [ENV_VIEW_MODE, ENV_SHOW_STUDENT_NAMES, ENV_SHOW_HIGHLIGHT_COUNT, ENV_LABEL_FONT_PX] {
            if let Ok(value) = std::env::var(key) {
                self.apply(key, &value)?;
            }
        }
        Ok(self)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses the flat subset written by [`ViewerConfig::save_to_file`].
    /// Unknown keys are ignored.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in toml_str.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"');
                match key.trim() {
                    "view_mode" => config.apply(ENV_VIEW_MODE, value)?,
                    "show_student_names" => config.apply(ENV_SHOW_STUDENT_NAMES, value)?,
                    "show_highlight_count" => config.apply(ENV_SHOW_HIGHLIGHT_COUNT, value)?,
                    "label_font_px" => config.apply(ENV_LABEL_FONT_PX, value)?,
                    _ => {}
                }
            }
        }

        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml())?;
        Ok(())
    }

    pub fn to_toml(&self) -> String {
        let view_mode = match self.view_mode {
            ViewMode::Single => "single",
            ViewMode::Double => "double",
        };
        format!(
            "# Marginalia viewer configuration\n\
             view_mode = \"{view_mode}\"\n\
             show_student_names = {}\n\
             show_highlight_count = {}\n\
             label_font_px = {}\n",
            self.show_student_names, self.show_highlight_count, self.label_font_px
        )
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue { key: key.to_owned(), value: value.to_owned() };
        match key {
            ENV_VIEW_MODE => self.view_mode = value.parse().map_err(|_| invalid())?,
            ENV_SHOW_STUDENT_NAMES => self.show_student_names = parse_bool(value).ok_or_else(invalid)?,
            ENV_SHOW_HIGHLIGHT_COUNT => self.show_highlight_count = parse_bool(value).ok_or_else(invalid)?,
            ENV_LABEL_FONT_PX => {
                self.label_font_px = value
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|px| px.is_finite() && *px > 0.0)
                    .ok_or_else(invalid)?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
