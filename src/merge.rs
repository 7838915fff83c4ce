//! Region-level compositing: drive the point compositor over tile managers.

use std::time::Instant;

use rayon::prelude::*;

use crate::compose::{LayerMode, composite};
use crate::config::EngineConfig;
use crate::error::{RasterError, Result};
use crate::region::{PixelRegion, PixelRegionMut, Rect};
use crate::tiles::TileManager;

/// Composite `layer` over `base` inside `rect` and store the result in `dest`.
///
/// The same rectangle is used in every participant.  With `base = None` the
/// current content of `dest` is the base, i.e. the layer is merged in place.
/// `mask`, when present, must be single-channel.  `opacity` is clamped to
/// `[0, 1]`.  Every destination tile touched is marked dirty.
pub fn composite_regions(
    base: Option<&TileManager>,
    layer: &TileManager,
    mask: Option<&TileManager>,
    dest: &mut TileManager,
    rect: Rect,
    mode: LayerMode,
    opacity: f32,
) -> Result<()> {
    composite_regions_with_config(base, layer, mask, dest, rect, mode, opacity, &EngineConfig::default())
}

#[allow(clippy::too_many_arguments)]
pub fn composite_regions_with_config(
    base: Option<&TileManager>,
    layer: &TileManager,
    mask: Option<&TileManager>,
    dest: &mut TileManager,
    rect: Rect,
    mode: LayerMode,
    opacity: f32,
    config: &EngineConfig,
) -> Result<()> {
    rect.validate(dest.width(), dest.height())?;
    rect.validate(layer.width(), layer.height())?;
    if let Some(base) = base {
        rect.validate(base.width(), base.height())?;
    }
    if let Some(mask) = mask {
        mask.format().require_mask()?;
        rect.validate(mask.width(), mask.height())?;
    }
    if opacity.is_nan() {
        return Err(RasterError::InvalidArgument("opacity is NaN".into()));
    }
    let opacity = opacity.clamp(0.0, 1.0);

    let start = Instant::now();
    if config.parallel && rect.height as u32 >= config.parallel_min_rows.max(1) {
        dest.bands_mut()
            .into_par_iter()
            .try_for_each(|band| -> Result<()> {
                let Some(part) = rect.clip_rows(band.rows()) else {
                    return Ok(());
                };
                let mut out = band.write(part, true)?;
                composite_part(base, layer, mask, &mut out, part, mode, opacity)
            })?;
    } else {
        let mut out = dest.write_rect(rect, true)?;
        composite_part(base, layer, mask, &mut out, rect, mode, opacity)?;
    }

    log_info!(
        "composite {} {}x{} at ({}, {}), opacity {:.3} in {:.1} ms",
        mode.name(), rect.width, rect.height, rect.x, rect.y, opacity,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

fn composite_part(
    base: Option<&TileManager>,
    layer: &TileManager,
    mask: Option<&TileManager>,
    out: &mut PixelRegionMut<'_>,
    part: Rect,
    mode: LayerMode,
    opacity: f32,
) -> Result<()> {
    let mut base = base.map(|b| b.read_rect(part)).transpose()?;
    let mut layer = layer.read_rect(part)?;
    let mut mask = mask.map(|m| m.read_rect(part)).transpose()?;
    composite_rows(base.as_mut(), &mut layer, mask.as_mut(), out, mode, opacity)
}

/// Row kernel.  Each participant is converted to RGBA float with its own
/// format, composited, and converted back with the destination's format.
pub fn composite_rows(
    mut base: Option<&mut PixelRegion<'_>>,
    layer: &mut PixelRegion<'_>,
    mut mask: Option<&mut PixelRegion<'_>>,
    out: &mut PixelRegionMut<'_>,
    mode: LayerMode,
    opacity: f32,
) -> Result<()> {
    let width = out.width() as usize;
    let out_format = out.format();
    let layer_format = layer.format();
    let base_format = base.as_ref().map(|b| b.format());
    let mask_format = mask.as_ref().map(|m| m.format());
    let mut base_f = vec![0.0f32; width * 4];
    let mut layer_f = vec![0.0f32; width * 4];
    let mut out_f = vec![0.0f32; width * 4];
    let mut mask_f = vec![0.0f32; width];

    while let Some(dst) = out.next_row_mut()? {
        let Some(l) = layer.next_row() else { break };
        layer_format.decode_rgba_f32(l, &mut layer_f);

        match (base.as_deref_mut(), base_format) {
            (Some(b), Some(format)) => {
                let Some(row) = b.next_row() else { break };
                format.decode_rgba_f32(row, &mut base_f);
            }
            _ => out_format.decode_rgba_f32(dst, &mut base_f),
        }

        let weights = match (mask.as_deref_mut(), mask_format) {
            (Some(m), Some(format)) => {
                let Some(row) = m.next_row() else { break };
                format.decode_mask(row, &mut mask_f);
                Some(&mask_f[..])
            }
            _ => None,
        };

        composite(mode, &base_f, &layer_f, weights, &mut out_f, opacity);
        out_format.encode_rgba_f32(&out_f, dst);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;

    fn filled(w: u32, h: u32, format: PixelFormat, px: &[u8]) -> TileManager {
        let config = EngineConfig::default().with_tile_size(4);
        let mut tm = TileManager::with_config(w, h, format, &config).unwrap();
        tm.fill(px).unwrap();
        tm.clear_dirty();
        tm
    }

    #[test]
    fn replace_copies_opaque_layer() {
        let base = filled(10, 10, PixelFormat::Rgba8, &[10, 20, 30, 255]);
        let layer = filled(10, 10, PixelFormat::Rgba8, &[200, 100, 50, 255]);
        let mut dest = filled(10, 10, PixelFormat::Rgba8, &[0, 0, 0, 0]);
        composite_regions(Some(&base), &layer, None, &mut dest, Rect::new(2, 2, 5, 5), LayerMode::Replace, 1.0)
            .unwrap();
        assert_eq!(dest.get_pixel(2, 2).unwrap(), &[200, 100, 50, 255]);
        assert_eq!(dest.get_pixel(6, 6).unwrap(), &[200, 100, 50, 255]);
        // outside the rectangle dest is untouched
        assert_eq!(dest.get_pixel(7, 7).unwrap(), &[0, 0, 0, 0]);
        assert_eq!(dest.get_pixel(1, 2).unwrap(), &[0, 0, 0, 0]);
    }

    #[test]
    fn in_place_uses_dest_as_base() {
        let layer = filled(8, 8, PixelFormat::Rgba8, &[255, 255, 255, 255]);
        let mut dest = filled(8, 8, PixelFormat::Rgba8, &[0, 0, 0, 255]);
        composite_regions(None, &layer, None, &mut dest, Rect::new(0, 0, 8, 8), LayerMode::Replace, 0.0)
            .unwrap();
        assert_eq!(dest.get_pixel(3, 3).unwrap(), &[0, 0, 0, 255]);

        composite_regions(None, &layer, None, &mut dest, Rect::new(0, 0, 8, 8), LayerMode::Multiply, 1.0)
            .unwrap();
        assert_eq!(dest.get_pixel(3, 3).unwrap(), &[0, 0, 0, 255]);

        composite_regions(None, &layer, None, &mut dest, Rect::new(0, 0, 8, 8), LayerMode::Screen, 1.0)
            .unwrap();
        assert_eq!(dest.get_pixel(3, 3).unwrap(), &[255, 255, 255, 255]);
    }

    #[test]
    fn mask_selects_pixels() {
        let layer = filled(8, 4, PixelFormat::Rgba8, &[255, 0, 0, 255]);
        let mut mask = filled(8, 4, PixelFormat::Y8, &[0]);
        for y in 0..4 {
            for x in 0..4 {
                mask.put_pixel(x, y, &[255]).unwrap();
            }
        }
        let mut dest = filled(8, 4, PixelFormat::Rgba8, &[0, 0, 255, 255]);
        composite_regions(None, &layer, Some(&mask), &mut dest, Rect::new(0, 0, 8, 4), LayerMode::Replace, 1.0)
            .unwrap();
        assert_eq!(dest.get_pixel(3, 3).unwrap(), &[255, 0, 0, 255]);
        assert_eq!(dest.get_pixel(4, 0).unwrap(), &[0, 0, 255, 255]);
    }

    #[test]
    fn mask_must_be_single_channel() {
        let layer = filled(4, 4, PixelFormat::Rgba8, &[1, 1, 1, 1]);
        let mask = filled(4, 4, PixelFormat::YA8, &[1, 1]);
        let mut dest = filled(4, 4, PixelFormat::Rgba8, &[0, 0, 0, 0]);
        assert!(matches!(
            composite_regions(None, &layer, Some(&mask), &mut dest, Rect::new(0, 0, 4, 4), LayerMode::Replace, 1.0),
            Err(RasterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rect_must_fit_every_participant() {
        let layer = filled(4, 4, PixelFormat::Rgba8, &[1, 1, 1, 1]);
        let mut dest = filled(8, 8, PixelFormat::Rgba8, &[0, 0, 0, 0]);
        assert!(matches!(
            composite_regions(None, &layer, None, &mut dest, Rect::new(2, 2, 4, 4), LayerMode::Replace, 1.0),
            Err(RasterError::OutOfBounds { .. })
        ));
        assert!(!dest.has_dirty_tiles());
    }

    #[test]
    fn opacity_is_clamped() {
        let layer = filled(4, 4, PixelFormat::Rgba8, &[255, 255, 255, 255]);
        let mut dest = filled(4, 4, PixelFormat::Rgba8, &[0, 0, 0, 255]);
        composite_regions(None, &layer, None, &mut dest, Rect::new(0, 0, 4, 4), LayerMode::Replace, 7.0)
            .unwrap();
        assert_eq!(dest.get_pixel(0, 0).unwrap(), &[255, 255, 255, 255]);

        let mut dest = filled(4, 4, PixelFormat::Rgba8, &[0, 0, 0, 255]);
        composite_regions(None, &layer, None, &mut dest, Rect::new(0, 0, 4, 4), LayerMode::Replace, -1.0)
            .unwrap();
        assert_eq!(dest.get_pixel(0, 0).unwrap(), &[0, 0, 0, 255]);
    }

    #[test]
    fn only_touched_tiles_become_dirty() {
        let layer = filled(12, 12, PixelFormat::Rgba8, &[9, 9, 9, 255]);
        let mut dest = filled(12, 12, PixelFormat::Rgba8, &[0, 0, 0, 0]);
        composite_regions(None, &layer, None, &mut dest, Rect::new(5, 5, 2, 2), LayerMode::Replace, 1.0)
            .unwrap();
        assert_eq!(dest.dirty_tiles(), vec![(1, 1)]);
    }

    #[test]
    fn parallel_and_serial_agree() {
        let config = EngineConfig::default().with_tile_size(4);
        let mut layer = TileManager::with_config(13, 11, PixelFormat::Rgba8, &config).unwrap();
        for y in 0..11 {
            for x in 0..13 {
                layer.put_pixel(x, y, &[(x * 19) as u8, (y * 23) as u8, 77, (x * y * 3) as u8]).unwrap();
            }
        }
        let base = filled(13, 11, PixelFormat::Rgba8, &[40, 80, 120, 200]);
        let rect = Rect::new(1, 2, 11, 8);

        let mut serial = TileManager::with_config(13, 11, PixelFormat::Rgba8, &config).unwrap();
        let mut parallel = serial.clone();
        let run = |dest: &mut TileManager, cfg: &EngineConfig| {
            composite_regions_with_config(Some(&base), &layer, None, dest, rect, LayerMode::Overlay, 0.75, cfg)
                .unwrap();
        };
        run(&mut serial, &config.clone().serial());
        run(&mut parallel, &EngineConfig { parallel_min_rows: 1, ..config.clone() });
        assert_eq!(serial.to_rgba_image().unwrap(), parallel.to_rgba_image().unwrap());
    }

    #[test]
    fn formats_convert_through_float() {
        let layer = filled(4, 4, PixelFormat::Y8, &[255]);
        let mut dest = filled(4, 4, PixelFormat::Rgba16, &[0; 8]);
        composite_regions(None, &layer, None, &mut dest, Rect::new(0, 0, 4, 4), LayerMode::Replace, 1.0)
            .unwrap();
        let white: Vec<u8> = [u16::MAX; 4].iter().flat_map(|v| v.to_ne_bytes()).collect();
        assert_eq!(dest.get_pixel(1, 1).unwrap(), &white[..]);
    }
}
