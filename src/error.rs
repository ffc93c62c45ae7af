use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the mosaic library.
///
/// Configuration and parameter errors are raised before any frame is
/// touched. `Decode` is raised by frame sources when a frame in the middle
/// of a stream cannot be read; the pipelines treat it as end of stream.
#[derive(Debug, Error)]
pub enum MosaicError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid config {context}: {source}")]
    ConfigSyntax {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot read icon {path}: {source}")]
    IconUnreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("resize failed: {0}")]
    Resize(#[from] fast_image_resize::ResizeError),

    #[error("resize buffer: {0}")]
    ResizeBuffer(#[from] fast_image_resize::ImageBufferError),
}

impl MosaicError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True for the errors that belong to the configuration class:
    /// bad level setup, an unparsable config file, or an icon file that
    /// cannot be loaded.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::ConfigSyntax { .. } | Self::IconUnreadable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MosaicError>;
