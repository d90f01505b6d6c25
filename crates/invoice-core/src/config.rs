//! Engine configuration

use crate::error::OverlayError;
use crate::overlay::{CoverStyle, OverlayStyle, TextStyle, COVER_PADDING};
use crate::update::UpdateSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Suffix appended to the file stem of updated documents
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_updated";

/// Defaults applied to every update of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub padding: f64,
    pub cover_style: CoverStyle,
    pub font_size: f64,
    pub font_family: String,
    pub color: String,
    pub output_suffix: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        let text = TextStyle::default();
        Self {
            padding: COVER_PADDING,
            cover_style: CoverStyle::default(),
            font_size: text.font_size,
            font_family: text.font_family,
            color: text.color,
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
        }
    }
}

impl OverlayConfig {
    pub fn with_cover_style(mut self, cover_style: CoverStyle) -> Self {
        self.cover_style = cover_style;
        self
    }

    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, OverlayError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| OverlayError::OperationError(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| OverlayError::OperationError(format!("{}: {}", path.display(), e)))
    }

    /// Overlay style for one spec: spec fields win over these defaults
    pub fn style_for(&self, spec: &UpdateSpec) -> OverlayStyle {
        OverlayStyle {
            cover: self.cover_style,
            text: TextStyle {
                font_size: spec.font_size.unwrap_or(self.font_size),
                font_family: spec
                    .font_family
                    .clone()
                    .unwrap_or_else(|| self.font_family.clone()),
                color: spec.color.clone().unwrap_or_else(|| self.color.clone()),
            },
            padding: self.padding,
            offset: spec.offset.unwrap_or((0.0, 0.0)),
        }
    }
}

/// Read a list of update specs from a JSON file.
///
/// Accepts a bare array or an object with an `updates` array.
pub fn load_update_specs(path: &Path) -> Result<Vec<UpdateSpec>, OverlayError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SpecFile {
        List(Vec<UpdateSpec>),
        Wrapped { updates: Vec<UpdateSpec> },
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| OverlayError::OperationError(format!("{}: {}", path.display(), e)))?;
    let file: SpecFile = serde_json::from_str(&raw)
        .map_err(|e| OverlayError::OperationError(format!("{}: {}", path.display(), e)))?;
    Ok(match file {
        SpecFile::List(specs) => specs,
        SpecFile::Wrapped { updates } => updates,
    })
}
