use std::path::Path;

use image::imageops::FilterType;

use crate::config::MosaicConfig;
use crate::decoder::frame_data::Frame;
use crate::decoder::video::{FfmpegDecoder, FrameSource};
use crate::error::{MosaicError, Result};
use crate::renderer::processor::MosaicProcessor;

/// Longest edge of the preview image shown to the user.
pub const PREVIEW_MAX_SIZE: u32 = 800;

/// Renders a single representative frame for quick feedback on a
/// configuration, without running the whole video.
pub struct PreviewService {
    processor: MosaicProcessor,
}

impl PreviewService {
    pub fn new(processor: MosaicProcessor) -> Self {
        Self { processor }
    }

    pub fn from_config(config: &MosaicConfig) -> Result<Self> {
        Ok(Self::new(MosaicProcessor::from_config(config)?))
    }

    /// Decode the middle frame of `source` and return its mosaic.
    pub fn preview<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> Result<Frame> {
        let (width, height) = source.dimensions();
        self.processor.prepare(width, height)?;

        let index = middle_frame_index(source.frame_count().unwrap_or(0));
        source.seek_to(index)?;
        let frame = source
            .next_frame()?
            .ok_or_else(|| MosaicError::Decode(format!("no frame at index {}", index)))?;
        log::debug!("previewing frame {}", index);
        self.processor.process_frame(frame)
    }
}

pub fn middle_frame_index(total_frames: u64) -> u64 {
    total_frames / 2
}

/// Mosaic of the middle frame of the video at `source_path`.
pub fn preview_middle_frame(source_path: &Path, config: &MosaicConfig) -> Result<Frame> {
    let mut service = PreviewService::from_config(config)?;
    let mut source = FfmpegDecoder::open(source_path)?;
    service.preview(&mut source)
}

/// Shrink `frame` to fit `max_size` x `max_size`, keeping its aspect ratio.
/// Frames that already fit are returned unchanged.
pub fn thumbnail(frame: Frame, max_size: u32) -> Result<image::RgbImage> {
    let (width, height) = frame.dimensions();
    let img = frame.into_rgb_image().ok_or_else(|| {
        MosaicError::InvalidParameter(format!("frame buffer does not match {}x{}", width, height))
    })?;
    if width <= max_size && height <= max_size {
        return Ok(img);
    }
    let scale = f64::from(max_size) / f64::from(width.max(height));
    let new_w = ((f64::from(width) * scale).round() as u32).max(1);
    let new_h = ((f64::from(height) * scale).round() as u32).max(1);
    Ok(image::imageops::resize(&img, new_w, new_h, FilterType::Lanczos3))
}
