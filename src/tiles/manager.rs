use std::ops::Range;

use image::RgbaImage;
use rayon::prelude::*;

use super::{Tile, TileGrid};
use crate::config::EngineConfig;
use crate::error::{RasterError, Result};
use crate::format::PixelFormat;
use crate::region::{PixelRegion, PixelRegionMut, Rect};

/// Zero bytes handed out for pixels of unmaterialized tiles.
static ZERO_PIXEL: [u8; 16] = [0; 16];

// ============================================================================
// TILE MANAGER – dense grid of lazily allocated tiles (Vec-indexed)
// ============================================================================

/// Owner of a tile grid presenting one logical `width × height` image.
///
/// Tiles are addressed by `ty * tiles_per_row + tx`.  Tiles are allocated on
/// first write; reads of untouched tiles see zeros without allocating.  Outside
/// callers never get tile handles directly, only [`PixelRegion`] views.
#[derive(Clone, Debug)]
pub struct TileManager {
    grid: TileGrid,
    format: PixelFormat,
    tiles: Vec<Tile>,
}

impl TileManager {
    // ---- construction -------------------------------------------------------

    /// Create an all-zero image with the default 64×64 tiles.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        Self::with_config(width, height, format, &EngineConfig::default())
    }

    pub fn with_config(
        width: u32,
        height: u32,
        format: PixelFormat,
        config: &EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        if width == 0 || height == 0 {
            return Err(RasterError::InvalidArgument(format!(
                "image size {}x{} must be positive",
                width, height
            )));
        }
        let total = width as u64 * height as u64;
        if total > config.max_pixels {
            log_warn!(
                "refusing {}x{} image: {} pixels exceeds limit of {}",
                width, height, total, config.max_pixels
            );
            return Err(RasterError::ResourceExhausted(format!(
                "{}x{} exceeds the {} pixel limit",
                width, height, config.max_pixels
            )));
        }

        let bpp = format.bytes_per_pixel();
        let grid = TileGrid::new(width, height, config.tile_width, config.tile_height, bpp);
        let count = grid.tile_count();
        let mut tiles = Vec::new();
        tiles.try_reserve_exact(count)?;
        tiles.resize(count, Tile::new(config.tile_width, config.tile_height, bpp));

        log_info!(
            "tile manager {}x{} {} ({}x{} tiles of {}x{})",
            width, height, format.name(), grid.tiles_per_row, grid.tiles_per_col,
            config.tile_width, config.tile_height
        );
        Ok(Self { grid, format, tiles })
    }

    /// Import a flat `RgbaImage`.  Only tiles containing non-zero bytes are
    /// materialized; tile conversion is parallelised with rayon.
    pub fn from_rgba_image(src: &RgbaImage, config: &EngineConfig) -> Result<Self> {
        let mut tm = Self::with_config(src.width(), src.height(), PixelFormat::Rgba8, config)?;
        let grid = tm.grid;
        let src_raw = src.as_raw();
        let src_stride = grid.width as usize * 4;

        tm.tiles
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(flat, tile)| -> Result<()> {
                let (tx, ty) = grid.tile_coord(flat);
                let base_x = tx * grid.tile_width;
                let base_y = ty * grid.tile_height;
                let cw = grid.tile_width.min(grid.width - base_x) as usize;
                let ch = grid.tile_height.min(grid.height - base_y);

                let has_content = (0..ch).any(|ly| {
                    let start = (base_y + ly) as usize * src_stride + base_x as usize * 4;
                    src_raw[start..start + cw * 4].iter().any(|&b| b != 0)
                });
                if !has_content {
                    return Ok(());
                }

                let stride = grid.tile_stride();
                let data = tile.materialize()?;
                for ly in 0..ch {
                    let src_start = (base_y + ly) as usize * src_stride + base_x as usize * 4;
                    let dst_start = ly as usize * stride;
                    data[dst_start..dst_start + cw * 4]
                        .copy_from_slice(&src_raw[src_start..src_start + cw * 4]);
                }
                Ok(())
            })?;
        Ok(tm)
    }

    /// Flatten back to a contiguous `RgbaImage`.  Only valid for RGBA8 managers.
    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        if self.format != PixelFormat::Rgba8 {
            return Err(RasterError::InvalidArgument(format!(
                "cannot flatten {} tiles into an RGBA8 image",
                self.format.name()
            )));
        }
        let mut out = RgbaImage::new(self.grid.width, self.grid.height);
        let out_raw: &mut [u8] = out.as_mut();
        let mut region = self.read_rect(Rect::new(0, 0, self.grid.width as i32, self.grid.height as i32))?;
        for dst in out_raw.chunks_exact_mut(self.grid.width as usize * 4) {
            match region.next_row() {
                Some(row) => dst.copy_from_slice(row),
                None => break,
            }
        }
        Ok(out)
    }

    // ---- queries ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.grid.width
    }

    pub fn height(&self) -> u32 {
        self.grid.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn bytes_per_pixel(&self) -> usize {
        self.grid.bpp
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn tile_width(&self) -> u32 {
        self.grid.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.grid.tile_height
    }

    pub fn tiles_per_row(&self) -> u32 {
        self.grid.tiles_per_row
    }

    pub fn tiles_per_col(&self) -> u32 {
        self.grid.tiles_per_col
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Number of tiles that currently own a pixel buffer.
    pub fn materialized_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_materialized()).count()
    }

    /// Bytes held by materialized tiles.
    pub fn memory_bytes(&self) -> usize {
        self.tiles
            .iter()
            .filter(|t| t.is_materialized())
            .map(Tile::byte_len)
            .sum()
    }

    /// Resolve a pixel to `(tile_index, offset_in_pixels)`.
    pub fn locate(&self, x: u32, y: u32) -> Result<(usize, usize)> {
        if x >= self.grid.width || y >= self.grid.height {
            return Err(RasterError::OutOfBounds {
                rect: Rect::new(x as i32, y as i32, 1, 1),
                width: self.grid.width,
                height: self.grid.height,
            });
        }
        Ok(self.grid.locate(x, y))
    }

    pub(crate) fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    // ---- pixel access -------------------------------------------------------

    /// Bytes of one pixel (zeros for unmaterialized tiles).
    pub fn get_pixel(&self, x: u32, y: u32) -> Result<&[u8]> {
        let (tile, offset) = self.locate(x, y)?;
        let bpp = self.grid.bpp;
        Ok(match self.tiles[tile].data() {
            Some(data) => &data[offset * bpp..offset * bpp + bpp],
            None => &ZERO_PIXEL[..bpp],
        })
    }

    /// Write one pixel, materializing its tile and marking it dirty.
    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: &[u8]) -> Result<()> {
        let bpp = self.grid.bpp;
        if pixel.len() != bpp {
            return Err(RasterError::InvalidArgument(format!(
                "pixel has {} bytes, format {} needs {}",
                pixel.len(),
                self.format.name(),
                bpp
            )));
        }
        let (tile, offset) = self.locate(x, y)?;
        let tile = &mut self.tiles[tile];
        tile.materialize()?[offset * bpp..offset * bpp + bpp].copy_from_slice(pixel);
        tile.mark_dirty();
        Ok(())
    }

    /// Set every pixel to `pixel`.  An all-zero fill just drops the buffers.
    pub fn fill(&mut self, pixel: &[u8]) -> Result<()> {
        if pixel.len() != self.grid.bpp {
            return Err(RasterError::InvalidArgument(format!(
                "fill pixel has {} bytes, expected {}",
                pixel.len(),
                self.grid.bpp
            )));
        }
        let zero = pixel.iter().all(|&b| b == 0);
        for tile in &mut self.tiles {
            if zero {
                tile.evict();
            } else {
                for px in tile.materialize()?.chunks_exact_mut(pixel.len()) {
                    px.copy_from_slice(pixel);
                }
            }
            tile.mark_dirty();
        }
        Ok(())
    }

    // ---- regions ------------------------------------------------------------

    /// Read-only view over `(x, y, w, h)`.
    pub fn read(&self, x: i32, y: i32, w: i32, h: i32) -> Result<PixelRegion<'_>> {
        self.read_rect(Rect::new(x, y, w, h))
    }

    pub fn read_rect(&self, rect: Rect) -> Result<PixelRegion<'_>> {
        PixelRegion::new(self, rect)
    }

    /// Writable view over `(x, y, w, h)`; with `dirty` set, every tile a
    /// handed-out row touches is marked modified.
    pub fn write(&mut self, x: i32, y: i32, w: i32, h: i32, dirty: bool) -> Result<PixelRegionMut<'_>> {
        self.write_rect(Rect::new(x, y, w, h), dirty)
    }

    pub fn write_rect(&mut self, rect: Rect, dirty: bool) -> Result<PixelRegionMut<'_>> {
        let band = self.band_all();
        PixelRegionMut::from_band(band, rect, dirty)
    }

    fn band_all(&mut self) -> TileBand<'_> {
        TileBand {
            grid: self.grid,
            format: self.format,
            first_tile_row: 0,
            tiles: &mut self.tiles,
        }
    }

    /// Split the grid into disjoint tile-row bands.  Each band can back its
    /// own write region, so bands can be processed on separate threads.
    pub fn bands_mut(&mut self) -> Vec<TileBand<'_>> {
        let grid = self.grid;
        let format = self.format;
        self.tiles
            .chunks_mut(grid.tiles_per_row as usize)
            .enumerate()
            .map(|(ty, tiles)| TileBand {
                grid,
                format,
                first_tile_row: ty as u32,
                tiles,
            })
            .collect()
    }

    // ---- dirty tracking -----------------------------------------------------

    pub fn is_tile_dirty(&self, tx: u32, ty: u32) -> bool {
        self.tile_at(tx, ty).is_some_and(Tile::is_dirty)
    }

    pub fn has_dirty_tiles(&self) -> bool {
        self.tiles.iter().any(Tile::is_dirty)
    }

    /// Grid coordinates of every modified tile, row-major.
    pub fn dirty_tiles(&self) -> Vec<(u32, u32)> {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_dirty())
            .map(|(i, _)| self.grid.tile_coord(i))
            .collect()
    }

    pub fn clear_dirty(&mut self) {
        for tile in &mut self.tiles {
            tile.clear_dirty();
        }
    }

    /// Changes whenever any tile may have been written or evicted.  Clearing
    /// the dirty flags leaves it alone, so caches can compare it against the
    /// value they were built from.
    pub fn revision(&self) -> u64 {
        self.tiles
            .iter()
            .fold(0u64, |sum, t| sum.wrapping_add(t.revision()))
    }

    /// Drop a tile's buffer; its pixels read as zero afterwards.
    pub fn evict_tile(&mut self, tx: u32, ty: u32) -> bool {
        if tx >= self.grid.tiles_per_row || ty >= self.grid.tiles_per_col {
            return false;
        }
        let idx = self.grid.flat_index(tx, ty);
        let was = self.tiles[idx].is_materialized();
        self.tiles[idx].evict();
        was
    }

    fn tile_at(&self, tx: u32, ty: u32) -> Option<&Tile> {
        if tx >= self.grid.tiles_per_row || ty >= self.grid.tiles_per_col {
            return None;
        }
        self.tiles.get(self.grid.flat_index(tx, ty))
    }
}

// ============================================================================
// TILE BAND – mutable borrow of whole tile rows
// ============================================================================

/// Exclusive view of a contiguous run of tile rows.  A band produced by
/// [`TileManager::bands_mut`] covers exactly one tile row; the band behind
/// [`TileManager::write`] covers the whole grid.
#[derive(Debug)]
pub struct TileBand<'a> {
    grid: TileGrid,
    format: PixelFormat,
    first_tile_row: u32,
    tiles: &'a mut [Tile],
}

impl<'a> TileBand<'a> {
    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Logical image rows covered by this band.
    pub fn rows(&self) -> Range<u32> {
        let tile_rows = (self.tiles.len() / self.grid.tiles_per_row as usize) as u32;
        let start = self.first_tile_row * self.grid.tile_height;
        let end = ((self.first_tile_row + tile_rows) * self.grid.tile_height).min(self.grid.height);
        start..end
    }

    /// Tile by global flat index.
    #[inline]
    pub(crate) fn tile_mut(&mut self, index: usize) -> &mut Tile {
        let first = self.first_tile_row as usize * self.grid.tiles_per_row as usize;
        &mut self.tiles[index - first]
    }

    /// Writable region over `rect`, which must lie inside this band's rows.
    pub fn write(self, rect: Rect, dirty: bool) -> Result<PixelRegionMut<'a>> {
        PixelRegionMut::from_band(self, rect, dirty)
    }
}
