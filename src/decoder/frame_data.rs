use crate::error::{MosaicError, Result};

/// Bytes per pixel of every frame handled by the crate (packed RGB).
pub const CHANNELS: usize = 3;

/// A decoded video frame: tightly packed `rgb24` rows, top to bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub buffer: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(buffer: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = frame_len(width, height);
        if buffer.len() != expected {
            return Err(MosaicError::InvalidParameter(format!(
                "frame buffer holds {} bytes, {}x{} rgb24 needs {}",
                buffer.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            buffer,
            width,
            height,
        })
    }

    /// A frame filled with one color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut buffer = Vec::with_capacity(pixels * CHANNELS);
        for _ in 0..pixels {
            buffer.extend_from_slice(&rgb);
        }
        Self {
            buffer,
            width,
            height,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn row_stride(&self) -> usize {
        self.width as usize * CHANNELS
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = y as usize * self.row_stride() + x as usize * CHANNELS;
        [
            self.buffer[offset],
            self.buffer[offset + 1],
            self.buffer[offset + 2],
        ]
    }

    /// Single-channel luma view used for brightness measurement.
    pub fn to_gray(&self) -> GrayFrame {
        let luma = self
            .buffer
            .chunks_exact(CHANNELS)
            .map(|px| luma(px[0], px[1], px[2]))
            .collect();
        GrayFrame {
            luma,
            width: self.width,
            height: self.height,
        }
    }

    pub fn into_rgb_image(self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.buffer)
    }

    pub fn from_rgb_image(img: image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            buffer: img.into_raw(),
            width,
            height,
        }
    }
}

/// Grayscale companion of a [`Frame`]; built once per frame, never stored.
#[derive(Clone, Debug)]
pub struct GrayFrame {
    luma: Vec<u8>,
    width: u32,
    height: u32,
}

impl GrayFrame {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Arithmetic mean of the luma values inside the given rectangle.
    pub fn mean(&self, x: u32, y: u32, width: u32, height: u32) -> f64 {
        let count = width as u64 * height as u64;
        if count == 0 {
            return 0.0;
        }
        let stride = self.width as usize;
        let mut sum: u64 = 0;
        for row in y as usize..(y + height) as usize {
            let start = row * stride + x as usize;
            sum += self.luma[start..start + width as usize]
                .iter()
                .map(|&v| v as u64)
                .sum::<u64>();
        }
        sum as f64 / count as f64
    }
}

/// Frame size in bytes for the given dimensions.
pub fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * CHANNELS
}

/// ITU-R BT.601 luma in 14-bit fixed point, rounded half up.
#[inline(always)]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    const R_W: u32 = 4899;
    const G_W: u32 = 9617;
    const B_W: u32 = 1868;
    ((r as u32 * R_W + g as u32 * G_W + b as u32 * B_W + (1 << 13)) >> 14) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma_of_gray_is_identity() {
        for v in [0u8, 1, 90, 128, 254, 255] {
            assert_eq!(luma(v, v, v), v);
        }
    }

    #[test]
    fn test_luma_weights_green_heaviest() {
        assert!(luma(0, 255, 0) > luma(255, 0, 0));
        assert!(luma(255, 0, 0) > luma(0, 0, 255));
    }

    #[test]
    fn test_frame_new_rejects_wrong_length() {
        assert!(Frame::new(vec![0; 10], 2, 2).is_err());
        assert!(Frame::new(vec![0; 12], 2, 2).is_ok());
    }

    #[test]
    fn test_gray_mean_over_region() {
        let mut frame = Frame::filled(4, 2, [0, 0, 0]);
        // right half white
        for y in 0..2 {
            for x in 2..4 {
                let offset = y * frame.row_stride() + x * CHANNELS;
                frame.buffer[offset..offset + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        let gray = frame.to_gray();
        assert_eq!(gray.mean(0, 0, 2, 2), 0.0);
        assert_eq!(gray.mean(2, 0, 2, 2), 255.0);
        assert_eq!(gray.mean(0, 0, 4, 2), 127.5);
    }
}
