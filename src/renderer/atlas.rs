use std::borrow::Cow;
use std::path::{Path, PathBuf};

use fast_image_resize::images::{Image, ImageRef};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};

use crate::decoder::frame_data::CHANNELS;
use crate::error::{MosaicError, Result};

/// One icon already scaled to the nominal cell size, packed RGB.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IconTile {
    pub pixels: Vec<u8>,
    pub size: u32,
}

/// Icons for every brightness level, pre-scaled to `cell_size` x `cell_size`.
///
/// Built once per run before any frame is processed and shared read-only
/// afterwards. Clipped edge cells take a second, uncached resize at paste
/// time (see [`IconAtlas::tile_for`]).
#[derive(Clone, Debug)]
pub struct IconAtlas {
    cell_size: u32,
    tiles: Vec<IconTile>,
}

impl IconAtlas {
    /// Decode each icon file, convert it to RGB and scale it with Lanczos3.
    pub fn from_paths<P: AsRef<Path>>(icon_paths: &[P], cell_size: u32) -> Result<Self> {
        let icons = icon_paths
            .iter()
            .map(|p| load_icon(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::from_images(&icons, cell_size)
    }

    pub fn from_images(icons: &[image::RgbImage], cell_size: u32) -> Result<Self> {
        if icons.is_empty() {
            return Err(MosaicError::Configuration(
                "at least one icon is required".into(),
            ));
        }
        if cell_size == 0 {
            return Err(MosaicError::InvalidParameter(
                "cell size must be at least 1 pixel".into(),
            ));
        }

        let mut resizer = Resizer::new();
        let options = lanczos();
        let tiles = icons
            .iter()
            .map(|icon| {
                let (w, h) = icon.dimensions();
                let pixels = resize_rgb(
                    &mut resizer,
                    icon.as_raw(),
                    (w, h),
                    (cell_size, cell_size),
                    &options,
                )?;
                Ok(IconTile {
                    pixels,
                    size: cell_size,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("icon atlas ready: {} levels at {}px", tiles.len(), cell_size);
        Ok(Self { cell_size, tiles })
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tile(&self, level: usize) -> &IconTile {
        &self.tiles[level]
    }

    /// Icon pixels for `level` sized `width` x `height`. Full cells borrow
    /// the cached tile; clipped cells get a fresh bilinear resize.
    pub fn tile_for(
        &self,
        resizer: &mut Resizer,
        level: usize,
        width: u32,
        height: u32,
    ) -> Result<Cow<'_, [u8]>> {
        let tile = &self.tiles[level];
        if width == self.cell_size && height == self.cell_size {
            return Ok(Cow::Borrowed(tile.pixels.as_slice()));
        }
        let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
        let pixels = resize_rgb(
            resizer,
            &tile.pixels,
            (self.cell_size, self.cell_size),
            (width, height),
            &options,
        )?;
        Ok(Cow::Owned(pixels))
    }
}

/// Decode an icon file and normalise it to 8-bit RGB.
pub fn load_icon(path: &Path) -> Result<image::RgbImage> {
    if !path.is_file() {
        return Err(MosaicError::Configuration(format!(
            "icon file not found: {}",
            path.display()
        )));
    }
    let img = image::open(path).map_err(|source| MosaicError::IconUnreadable {
        path: PathBuf::from(path),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// Resize a packed RGB buffer. Same-size input is copied through so solid
/// colors and already cell-sized icons stay bit-exact.
fn resize_rgb(
    resizer: &mut Resizer,
    src: &[u8],
    src_size: (u32, u32),
    dst_size: (u32, u32),
    options: &ResizeOptions,
) -> Result<Vec<u8>> {
    if src_size == dst_size {
        return Ok(src.to_vec());
    }
    let src_image = ImageRef::new(src_size.0, src_size.1, src, PixelType::U8x3)?;
    let mut dst_image = Image::new(dst_size.0, dst_size.1, PixelType::U8x3);
    resizer.resize(&src_image, &mut dst_image, options)?;
    let pixels = dst_image.into_vec();
    debug_assert_eq!(
        pixels.len(),
        dst_size.0 as usize * dst_size.1 as usize * CHANNELS
    );
    Ok(pixels)
}

fn lanczos() -> ResizeOptions {
    ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3))
}

/// Build the atlas for a run: one Lanczos-scaled tile per icon path.
pub fn build_icon_atlas<P: AsRef<Path>>(icon_paths: &[P], cell_size: u32) -> Result<IconAtlas> {
    IconAtlas::from_paths(icon_paths, cell_size)
}
