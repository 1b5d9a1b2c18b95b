use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::split::SplitMode;
use crate::FcdrError;

/// Exact value the upstream reader writes for a sensitivity it could not compute.
pub const DEGENERATE_SENSITIVITY: f64 = 1.0e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Scanline subsampling stride
    pub line_skip: usize,
    /// Element subsampling stride
    pub elem_skip: usize,
    /// Segments shorter than this many scanlines are dropped
    pub min_segment_lines: usize,
    pub degenerate_value: f64,
    pub split_mode: SplitMode,
    /// Report profiles on native offsets instead of subsampled ones
    pub interpolate_lengths: bool,
    pub ocean_only: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            line_skip: 5,
            elem_skip: 25,
            min_segment_lines: 1280,
            degenerate_value: DEGENERATE_SENSITIVITY,
            split_mode: SplitMode::Mask,
            interpolate_lengths: true,
            ocean_only: false,
        }
    }
}

impl ProcessingConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, FcdrError> {
        let raw = fs::read_to_string(path)?;
        let cfg: ProcessingConfig = toml::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), FcdrError> {
        if self.line_skip == 0 {
            return Err(FcdrError::InvalidConfig(
                "line_skip must be greater than zero".to_string(),
            ));
        }

        if self.elem_skip == 0 {
            return Err(FcdrError::InvalidConfig(
                "elem_skip must be greater than zero".to_string(),
            ));
        }

        if !self.degenerate_value.is_finite() {
            return Err(FcdrError::InvalidConfig(
                "degenerate_value must be finite".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = ProcessingConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.line_skip, 5);
        assert_eq!(cfg.elem_skip, 25);
        assert_eq!(cfg.min_segment_lines, 1280);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: ProcessingConfig =
            toml::from_str("line_skip = 10\nsplit_mode = \"extract\"\n").expect("valid toml");
        assert_eq!(cfg.line_skip, 10);
        assert_eq!(cfg.elem_skip, 25);
        assert_eq!(cfg.split_mode, SplitMode::Extract);
    }

    #[test]
    fn zero_stride_is_rejected() {
        let cfg = ProcessingConfig {
            elem_skip: 0,
            ..ProcessingConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(FcdrError::InvalidConfig(_))));
    }
}
