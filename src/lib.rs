//! Icon mosaic video transform.
//!
//! Each frame is split into a grid of square cells, every cell's mean
//! brightness picks one of N icons, and the cell is overwritten with that
//! icon scaled to fit. Decoding and encoding go through the `ffmpeg` and
//! `ffprobe` executables; everything in between works on raw RGB buffers.

pub mod config;
pub mod core;
pub mod decoder;
pub mod error;
pub mod renderer;

pub use crate::config::MosaicConfig;
pub use crate::core::pipeline::{encode_video, transform_video, PipelineReport, VideoPipeline};
pub use crate::core::preview::{preview_middle_frame, PreviewService};
pub use crate::decoder::frame_data::Frame;
pub use crate::error::{MosaicError, Result};
pub use crate::renderer::atlas::{build_icon_atlas, IconAtlas};
pub use crate::renderer::cell::{partition_grid, Cell, GridLayout};
pub use crate::renderer::processor::{transform_frame, MosaicProcessor};
pub use crate::renderer::quantizer::{classify, BrightnessQuantizer};
