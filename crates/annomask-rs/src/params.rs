use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constraints::SegmentationMode;
use crate::error::Result;
use crate::geometry::{MaskColor, DEFAULT_INTERPOLATION_SPACING};
use crate::undo::DEFAULT_UNDO_DEPTH;

/// Editing parameters controlling brush strokes, overlap policy and history depth.
///
/// Every field has a default, so a parameter file only needs to name what it
/// overrides.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EditorParams {
    /// Maximum distance in pixels between interpolated stroke points (default: 0.5).
    pub interpolation_spacing: f64,
    /// Brush radius in pixels (default: 5.0).
    pub brush_radius: f64,
    /// Whether masks of different annotations may overlap (default: semantic, they may not).
    pub segmentation_mode: SegmentationMode,
    /// Maximum number of reversible actions kept (default: 100).
    pub undo_depth: usize,
    /// Fill color used when rendering masks.
    pub mask_color: MaskColor,
}

impl Default for EditorParams {
    fn default() -> Self {
        EditorParams {
            interpolation_spacing: DEFAULT_INTERPOLATION_SPACING,
            brush_radius: 5.0,
            segmentation_mode: SegmentationMode::Semantic,
            undo_depth: DEFAULT_UNDO_DEPTH,
            mask_color: MaskColor::default(),
        }
    }
}

impl EditorParams {
    /// Load parameters from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
