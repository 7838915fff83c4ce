//! Reduced-resolution previews of a tile manager.

use std::time::Instant;

use image::RgbaImage;
use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::error::{RasterError, Result, try_alloc_zeroed};
use crate::format::PixelFormat;
use crate::region::{PixelRegion, PixelRegionMut, Rect};
use crate::subsample::{subsample_factor, subsample_rows};
use crate::tiles::TileManager;

/// A freshly allocated, caller-owned preview image.
#[derive(Clone, Debug, PartialEq)]
pub struct PreviewBuffer {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Packed row-major pixels, `width * height * bytes_per_pixel` bytes.
    pub data: Vec<u8>,
}

impl PreviewBuffer {
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Bytes of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.row_bytes() + x as usize * bpp;
        Some(&self.data[start..start + bpp])
    }

    /// Read-only region over the whole preview.
    pub fn region(&self) -> Result<PixelRegion<'_>> {
        PixelRegion::from_buffer(
            &self.data,
            self.width,
            self.format,
            Rect::new(0, 0, self.width as i32, self.height as i32),
        )
    }

    /// Hand an RGBA8 preview to `image`-based consumers.
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        if self.format != PixelFormat::Rgba8 {
            return None;
        }
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Preview of the whole image at `width × height`.
pub fn get_preview(tiles: &TileManager, format: PixelFormat, width: i32, height: i32) -> Result<PreviewBuffer> {
    get_preview_with_config(tiles, format, width, height, &EngineConfig::default())
}

pub fn get_preview_with_config(
    tiles: &TileManager,
    format: PixelFormat,
    width: i32,
    height: i32,
    config: &EngineConfig,
) -> Result<PreviewBuffer> {
    check_format(tiles, format)?;
    let (dest_w, dest_h) = check_dest(width, height)?;
    let src = Rect::new(0, 0, tiles.width() as i32, tiles.height() as i32);
    create_preview(tiles, format, src, dest_w, dest_h, config)
}

/// Preview of the source sub-rectangle `(src_x, src_y, src_width, src_height)`
/// at `dest_width × dest_height`.
#[allow(clippy::too_many_arguments)]
pub fn get_sub_preview(
    tiles: &TileManager,
    format: PixelFormat,
    src_x: i32,
    src_y: i32,
    src_width: i32,
    src_height: i32,
    dest_width: i32,
    dest_height: i32,
) -> Result<PreviewBuffer> {
    get_sub_preview_with_config(
        tiles,
        format,
        Rect::new(src_x, src_y, src_width, src_height),
        dest_width,
        dest_height,
        &EngineConfig::default(),
    )
}

pub fn get_sub_preview_with_config(
    tiles: &TileManager,
    format: PixelFormat,
    src: Rect,
    dest_width: i32,
    dest_height: i32,
    config: &EngineConfig,
) -> Result<PreviewBuffer> {
    check_format(tiles, format)?;
    src.validate(tiles.width(), tiles.height())?;
    let (dest_w, dest_h) = check_dest(dest_width, dest_height)?;
    create_preview(tiles, format, src, dest_w, dest_h, config)
}

fn check_format(tiles: &TileManager, format: PixelFormat) -> Result<()> {
    if format.bytes_per_pixel() != tiles.bytes_per_pixel() {
        return Err(RasterError::InvalidArgument(format!(
            "preview format {} has {} bytes per pixel, tiles have {}",
            format.name(),
            format.bytes_per_pixel(),
            tiles.bytes_per_pixel()
        )));
    }
    Ok(())
}

fn check_dest(width: i32, height: i32) -> Result<(u32, u32)> {
    if width <= 0 || height <= 0 {
        return Err(RasterError::InvalidArgument(format!(
            "preview size {}x{} must be positive",
            width, height
        )));
    }
    Ok((width as u32, height as u32))
}

/// Allocate the destination and box-filter `src` into it.  Arguments are
/// already validated.
fn create_preview(
    tiles: &TileManager,
    format: PixelFormat,
    src: Rect,
    dest_w: u32,
    dest_h: u32,
    config: &EngineConfig,
) -> Result<PreviewBuffer> {
    let start = Instant::now();
    let bpp = format.bytes_per_pixel();
    let row_bytes = dest_w as usize * bpp;
    let len = row_bytes
        .checked_mul(dest_h as usize)
        .ok_or_else(|| RasterError::ResourceExhausted(format!("{}x{} preview", dest_w, dest_h)))?;
    let mut data = try_alloc_zeroed(len)?;

    let factor = subsample_factor(src.width as u32, src.height as u32, dest_w, dest_h);

    if config.parallel && dest_h >= config.parallel_min_rows.max(1) {
        // Bands of destination rows; every band reads its own source footprint
        let band_rows = (dest_h as usize / (rayon::current_num_threads() * 4)).max(1);
        data.par_chunks_mut(band_rows * row_bytes)
            .enumerate()
            .try_for_each(|(i, band)| -> Result<()> {
                let rows = (band.len() / row_bytes) as i32;
                let mut src_region = tiles.read_rect(src)?;
                let mut dest_region =
                    PixelRegionMut::from_buffer(band, dest_w, format, Rect::new(0, 0, dest_w as i32, rows))?;
                subsample_rows(
                    &mut src_region,
                    &mut dest_region,
                    (i * band_rows) as u32,
                    dest_h,
                    factor,
                )
            })?;
    } else {
        let mut src_region = tiles.read_rect(src)?;
        let mut dest_region = PixelRegionMut::from_buffer(
            &mut data,
            dest_w,
            format,
            Rect::new(0, 0, dest_w as i32, dest_h as i32),
        )?;
        subsample_rows(&mut src_region, &mut dest_region, 0, dest_h, factor)?;
    }

    log_info!(
        "preview {}x{} of {}x{} at ({}, {}), subsample {} in {:.1} ms",
        dest_w, dest_h, src.width, src.height, src.x, src.y, factor,
        start.elapsed().as_secs_f64() * 1000.0
    );

    Ok(PreviewBuffer {
        width: dest_w,
        height: dest_h,
        format,
        data,
    })
}
