//! Tiled pixel storage.
//!
//! A [`TileManager`] owns a row-major grid of [`Tile`]s.  All addressing goes
//! through [`TileGrid`], a small copyable description of the grid geometry,
//! so regions and bands can resolve coordinates without borrowing the manager.

mod manager;
mod tile;

pub use manager::{TileBand, TileManager};
pub use tile::Tile;

/// Geometry of a tile grid: logical extent, tile size and bytes per pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub bpp: usize,
    pub tiles_per_row: u32,
    pub tiles_per_col: u32,
}

/// Part of a logical row that lives inside a single tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowSegment {
    /// Flat tile index
    pub tile: usize,
    /// Byte offset of the first pixel inside the tile buffer
    pub tile_offset: usize,
    /// Byte offset inside the logical row span
    pub row_offset: usize,
    pub byte_len: usize,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, tile_width: u32, tile_height: u32, bpp: usize) -> Self {
        Self {
            width,
            height,
            tile_width,
            tile_height,
            bpp,
            tiles_per_row: width.div_ceil(tile_width),
            tiles_per_col: height.div_ceil(tile_height),
        }
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles_per_row as usize * self.tiles_per_col as usize
    }

    /// Flat index of the tile at grid coordinate `(tx, ty)`.
    #[inline(always)]
    pub fn flat_index(&self, tx: u32, ty: u32) -> usize {
        (ty * self.tiles_per_row + tx) as usize
    }

    /// Grid coordinate of a flat tile index.
    #[inline]
    pub fn tile_coord(&self, index: usize) -> (u32, u32) {
        let i = index as u32;
        (i % self.tiles_per_row, i / self.tiles_per_row)
    }

    /// Resolve a pixel to `(tile_index, offset)`, the offset counted in pixels
    /// from the start of the tile.
    #[inline(always)]
    pub fn locate(&self, x: u32, y: u32) -> (usize, usize) {
        debug_assert!(x < self.width && y < self.height);
        let tile = self.flat_index(x / self.tile_width, y / self.tile_height);
        let offset = (y % self.tile_height) * self.tile_width + (x % self.tile_width);
        (tile, offset as usize)
    }

    /// Bytes in one tile row.
    #[inline]
    pub fn tile_stride(&self) -> usize {
        self.tile_width as usize * self.bpp
    }

    /// Split the span `[x, x + w)` of row `y` into per-tile pieces, left to right.
    pub fn row_segments(&self, x: u32, y: u32, w: u32) -> impl Iterator<Item = RowSegment> + '_ {
        let end = x + w;
        let mut cur = x;
        std::iter::from_fn(move || {
            if cur >= end {
                return None;
            }
            let (tile, offset) = self.locate(cur, y);
            let run = (self.tile_width - cur % self.tile_width).min(end - cur);
            let seg = RowSegment {
                tile,
                tile_offset: offset * self.bpp,
                row_offset: (cur - x) as usize * self.bpp,
                byte_len: run as usize * self.bpp,
            };
            cur += run;
            Some(seg)
        })
    }
}
