use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};
use crate::renderer::quantizer::default_thresholds;

pub const DEFAULT_COLUMN_COUNT: u32 = 70;
pub const DEFAULT_OUTPUT_FPS: u32 = 24;

/// Everything one mosaic run needs, fixed for the duration of the run.
///
/// `thresholds[i]` selects `icon_paths[i]`; both lists must have the same
/// length. A JSON config may leave `thresholds` out, in which case evenly
/// spaced defaults are used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosaicConfig {
    #[serde(default = "default_column_count")]
    pub column_count: u32,
    pub icon_paths: Vec<PathBuf>,
    #[serde(default)]
    pub thresholds: Vec<u8>,
    #[serde(default = "default_output_fps")]
    pub output_fps: u32,
}

fn default_column_count() -> u32 {
    DEFAULT_COLUMN_COUNT
}

fn default_output_fps() -> u32 {
    DEFAULT_OUTPUT_FPS
}

impl MosaicConfig {
    /// A config with evenly spaced thresholds for the given icons.
    pub fn new(icon_paths: Vec<PathBuf>, column_count: u32) -> Self {
        let thresholds = default_thresholds(icon_paths.len());
        Self {
            column_count,
            icon_paths,
            thresholds,
            output_fps: DEFAULT_OUTPUT_FPS,
        }
    }

    pub fn with_thresholds(mut self, thresholds: Vec<u8>) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_output_fps(mut self, fps: u32) -> Self {
        self.output_fps = fps;
        self
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MosaicError::Configuration(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, context: &str) -> Result<Self> {
        let mut config: Self =
            serde_json::from_str(content).map_err(|source| MosaicError::ConfigSyntax {
                context: context.to_string(),
                source,
            })?;
        if config.thresholds.is_empty() {
            config.thresholds = default_thresholds(config.icon_paths.len());
        }
        Ok(config)
    }

    /// Reject configurations that cannot produce a mosaic, before any
    /// frame or icon is loaded.
    pub fn validate(&self) -> Result<()> {
        if self.icon_paths.is_empty() {
            return Err(MosaicError::Configuration(
                "at least one icon is required".into(),
            ));
        }
        if self.icon_paths.len() != self.thresholds.len() {
            return Err(MosaicError::Configuration(format!(
                "{} icons but {} brightness thresholds",
                self.icon_paths.len(),
                self.thresholds.len()
            )));
        }
        if self.column_count == 0 {
            return Err(MosaicError::InvalidParameter(
                "column count must be at least 1".into(),
            ));
        }
        if self.output_fps == 0 {
            return Err(MosaicError::InvalidParameter(
                "output fps must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn levels(&self) -> usize {
        self.icon_paths.len()
    }
}
