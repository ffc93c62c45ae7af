use std::time::Instant;

use fast_image_resize::Resizer;
use rayon::prelude::*;

use super::atlas::{load_icon, IconAtlas};
use super::cell::GridLayout;
use super::quantizer::BrightnessQuantizer;
use crate::config::MosaicConfig;
use crate::decoder::frame_data::{frame_len, Frame, CHANNELS};
use crate::error::{MosaicError, Result};

/// Turns decoded frames into mosaic frames.
///
/// Icons are decoded once. The grid layout and the cell-sized atlas are
/// built for the first frame size seen and rebuilt only when the size
/// changes, so a fixed-resolution video pays for them once per run.
pub struct MosaicProcessor {
    icons: Vec<image::RgbImage>,
    quantizer: BrightnessQuantizer,
    column_count: u32,
    prepared: Option<(GridLayout, IconAtlas)>,
}

impl MosaicProcessor {
    pub fn new(icons: Vec<image::RgbImage>, thresholds: Vec<u8>, column_count: u32) -> Result<Self> {
        if icons.is_empty() {
            return Err(MosaicError::Configuration(
                "at least one icon level is required".into(),
            ));
        }
        if icons.len() != thresholds.len() {
            return Err(MosaicError::Configuration(format!(
                "{} icons but {} brightness thresholds",
                icons.len(),
                thresholds.len()
            )));
        }
        if column_count == 0 {
            return Err(MosaicError::InvalidParameter(
                "column count must be at least 1".into(),
            ));
        }
        Ok(Self {
            icons,
            quantizer: BrightnessQuantizer::new(thresholds),
            column_count,
            prepared: None,
        })
    }

    /// Validate the configuration and decode every icon it names.
    pub fn from_config(config: &MosaicConfig) -> Result<Self> {
        config.validate()?;
        let icons = config
            .icon_paths
            .iter()
            .map(|p| load_icon(p))
            .collect::<Result<Vec<_>>>()?;
        Self::new(icons, config.thresholds.clone(), config.column_count)
    }

    /// Build the layout and atlas for `width` x `height` frames.
    ///
    /// Called by the pipelines before the first frame is read so a column
    /// count that does not fit the video fails before any work is done.
    pub fn prepare(&mut self, width: u32, height: u32) -> Result<&GridLayout> {
        let prepared = match self.prepared.take() {
            Some(prepared) if prepared.0.matches(width, height) => prepared,
            _ => {
                let layout = GridLayout::new(width, height, self.column_count)?;
                let atlas = IconAtlas::from_images(&self.icons, layout.cell_size)?;
                log::info!(
                    "grid {}x{} cells of {}px for {}x{} frames",
                    layout.columns,
                    layout.rows,
                    layout.cell_size,
                    width,
                    height
                );
                (layout, atlas)
            }
        };
        Ok(&self.prepared.insert(prepared).0)
    }

    pub fn quantizer(&self) -> &BrightnessQuantizer {
        &self.quantizer
    }

    pub fn process_frame(&mut self, mut frame: Frame) -> Result<Frame> {
        self.process_frame_into(&mut frame)?;
        Ok(frame)
    }

    pub fn process_frame_into(&mut self, frame: &mut Frame) -> Result<()> {
        self.prepare(frame.width, frame.height)?;
        let Some((layout, atlas)) = &self.prepared else {
            return Err(MosaicError::InvalidParameter("grid layout unavailable".into()));
        };
        let start = Instant::now();
        paint_mosaic(frame, atlas, &self.quantizer, layout)?;
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            log::debug!("slow frame: {}us for {} cells", elapsed.as_micros(), layout.cells.len());
        }
        Ok(())
    }
}

/// Overwrite every cell of `frame` with the icon picked for its brightness.
///
/// Bands of `cell_size` pixel rows are disjoint slices of the buffer, so
/// grid rows are painted in parallel without synchronisation.
fn paint_mosaic(
    frame: &mut Frame,
    atlas: &IconAtlas,
    quantizer: &BrightnessQuantizer,
    layout: &GridLayout,
) -> Result<()> {
    if frame.buffer.len() != frame_len(frame.width, frame.height) {
        return Err(MosaicError::InvalidParameter(format!(
            "frame buffer holds {} bytes, {}x{} rgb24 needs {}",
            frame.buffer.len(),
            frame.width,
            frame.height,
            frame_len(frame.width, frame.height)
        )));
    }
    if !layout.matches(frame.width, frame.height) {
        return Err(MosaicError::InvalidParameter(format!(
            "layout is for {}x{} frames, got {}x{}",
            layout.frame_width, layout.frame_height, frame.width, frame.height
        )));
    }
    if atlas.cell_size() != layout.cell_size {
        return Err(MosaicError::InvalidParameter(format!(
            "atlas holds {}px icons but cells are {}px",
            atlas.cell_size(),
            layout.cell_size
        )));
    }
    if atlas.len() != quantizer.levels() {
        return Err(MosaicError::Configuration(format!(
            "{} icons but {} brightness thresholds",
            atlas.len(),
            quantizer.levels()
        )));
    }

    let gray = frame.to_gray();
    let stride = frame.row_stride();
    let band = layout.cell_size as usize * stride;
    if band == 0 {
        return Ok(());
    }

    frame
        .buffer
        .par_chunks_mut(band)
        .enumerate()
        .try_for_each_init(Resizer::new, |resizer, (row, chunk)| -> Result<()> {
            for cell in layout.row(row as u32) {
                let brightness = gray.mean(cell.x, cell.y, cell.width, cell.height);
                let level = quantizer.quantize(brightness);
                let tile = atlas.tile_for(resizer, level, cell.width, cell.height)?;

                let tile_stride = cell.width as usize * CHANNELS;
                let x_offset = cell.x as usize * CHANNELS;
                for dy in 0..cell.height as usize {
                    let dst = dy * stride + x_offset;
                    let src = dy * tile_stride;
                    chunk[dst..dst + tile_stride].copy_from_slice(&tile[src..src + tile_stride]);
                }
            }
            Ok(())
        })
}

/// Transform one frame with an already built atlas and layout.
pub fn transform_frame(
    mut frame: Frame,
    atlas: &IconAtlas,
    quantizer: &BrightnessQuantizer,
    layout: &GridLayout,
) -> Result<Frame> {
    paint_mosaic(&mut frame, atlas, quantizer, layout)?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DARK: [u8; 3] = [30, 30, 30];
    const MID: [u8; 3] = [128, 128, 128];
    const LIGHT: [u8; 3] = [230, 230, 230];

    fn solid(size: u32, rgb: [u8; 3]) -> image::RgbImage {
        image::RgbImage::from_pixel(size, size, image::Rgb(rgb))
    }

    fn processor(icon_size: u32, columns: u32) -> MosaicProcessor {
        let icons = vec![solid(icon_size, DARK), solid(icon_size, MID), solid(icon_size, LIGHT)];
        MosaicProcessor::new(icons, vec![0, 85, 170], columns).unwrap()
    }

    #[test]
    fn test_uniform_gray_frame_tiles_one_icon() {
        let mut proc = processor(20, 5);
        let out = proc.process_frame(Frame::filled(100, 100, [90, 90, 90])).unwrap();
        assert_eq!(out.dimensions(), (100, 100));
        assert!(out.buffer.chunks_exact(3).all(|px| px == MID));
    }

    #[test]
    fn test_cells_follow_local_brightness() {
        let mut frame = Frame::filled(40, 20, [0, 0, 0]);
        // right cell bright
        for y in 0..20 {
            for x in 20..40 {
                let o = y * frame.row_stride() + x * 3;
                frame.buffer[o..o + 3].copy_from_slice(&[250, 250, 250]);
            }
        }
        let mut proc = processor(20, 2);
        let out = proc.process_frame(frame).unwrap();
        assert_eq!(out.pixel(5, 5), DARK);
        assert_eq!(out.pixel(35, 15), LIGHT);
    }

    #[test]
    fn test_edge_cells_are_fully_covered() {
        let mut proc = processor(10, 10);
        let out = proc.process_frame(Frame::filled(105, 103, [200, 200, 200])).unwrap();
        assert_eq!(out.dimensions(), (105, 103));
        assert_eq!(out.buffer.len(), 105 * 103 * 3);
        let gray = out.to_gray();
        // clipped column and row still classify as the light level
        assert_eq!(proc.quantizer().quantize(gray.mean(100, 0, 5, 10)), 2);
        assert_eq!(proc.quantizer().quantize(gray.mean(0, 100, 10, 3)), 2);
    }

    #[test]
    fn test_second_pass_keeps_every_cell_level() {
        let mut frame = Frame::filled(60, 40, [0, 0, 0]);
        for (i, px) in frame.buffer.chunks_exact_mut(3).enumerate() {
            let v = ((i * 7) % 256) as u8;
            px.copy_from_slice(&[v, v, v]);
        }
        let mut proc = processor(10, 6);
        let once = proc.process_frame(frame).unwrap();
        let twice = proc.process_frame(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_output_is_deterministic() {
        let frame = Frame::filled(50, 30, [100, 140, 60]);
        let a = processor(7, 7).process_frame(frame.clone()).unwrap();
        let b = processor(7, 7).process_frame(frame).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_layout_is_rebuilt_when_size_changes() {
        let mut proc = processor(20, 5);
        assert_eq!(proc.prepare(100, 100).unwrap().cell_size, 20);
        assert_eq!(proc.prepare(50, 50).unwrap().cell_size, 10);
        let out = proc.process_frame(Frame::filled(50, 50, [90, 90, 90])).unwrap();
        assert_eq!(out.dimensions(), (50, 50));
    }

    #[test]
    fn test_too_many_columns_fail_before_processing() {
        let mut proc = processor(4, 1000);
        assert!(matches!(
            proc.prepare(100, 100),
            Err(MosaicError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_level_count_mismatch_is_rejected() {
        let err = MosaicProcessor::new(vec![solid(4, DARK)], vec![0, 128], 2)
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_transform_frame_checks_layout() {
        let atlas = IconAtlas::from_images(&[solid(10, DARK)], 10).unwrap();
        let quantizer = BrightnessQuantizer::new(vec![0]);
        let layout = GridLayout::new(20, 20, 2).unwrap();
        let ok = transform_frame(Frame::filled(20, 20, MID), &atlas, &quantizer, &layout).unwrap();
        assert!(ok.buffer.chunks_exact(3).all(|px| px == DARK));
        let err = transform_frame(Frame::filled(30, 20, MID), &atlas, &quantizer, &layout);
        assert!(matches!(err, Err(MosaicError::InvalidParameter(_))));
    }

    #[test]
    fn test_malformed_frame_buffer_is_rejected() {
        let short = Frame {
            buffer: vec![0; 12],
            width: 10,
            height: 10,
        };
        assert!(matches!(
            processor(5, 2).process_frame(short),
            Err(MosaicError::InvalidParameter(_))
        ));

        let atlas = IconAtlas::from_images(&[solid(10, DARK)], 10).unwrap();
        let layout = GridLayout::new(20, 20, 2).unwrap();
        let long = Frame {
            buffer: vec![0; 20 * 20 * 3 + 1],
            width: 20,
            height: 20,
        };
        let err = transform_frame(long, &atlas, &BrightnessQuantizer::new(vec![0]), &layout);
        assert!(matches!(err, Err(MosaicError::InvalidParameter(_))));
    }
}
