//! Boundary-transparent row cursors over tile managers and flat buffers.
//!
//! A region yields one contiguous span of `width * bytes_per_pixel` bytes per
//! row, top to bottom.  When a row lies inside a single tile the span borrows
//! the tile directly; otherwise the row is gathered into a scratch buffer (and,
//! for writable regions, scattered back into the tiles on the next advance or
//! when the region is dropped).

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{RasterError, Result, try_alloc_zeroed};
use crate::format::PixelFormat;
use crate::tiles::{Tile, TileBand, TileGrid, TileManager};

// ============================================================================
// RECT
// ============================================================================

/// Integer rectangle in logical pixel coordinates.  Signed so that requests
/// hanging off the top/left edge can be expressed and refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Refuse empty rectangles (`InvalidArgument`) and rectangles not fully
    /// inside `[0, width) × [0, height)` (`OutOfBounds`).
    pub fn validate(&self, width: u32, height: u32) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(RasterError::InvalidArgument(format!(
                "region size {}x{} must be positive",
                self.width, self.height
            )));
        }
        let (x, y) = (self.x as i64, self.y as i64);
        if x < 0
            || y < 0
            || x + self.width as i64 > width as i64
            || y + self.height as i64 > height as i64
        {
            return Err(RasterError::OutOfBounds {
                rect: *self,
                width,
                height,
            });
        }
        Ok(())
    }

    /// Part of this rectangle within the logical rows `rows`.
    pub fn clip_rows(&self, rows: Range<u32>) -> Option<Rect> {
        let top = (self.y as i64).max(rows.start as i64);
        let bottom = (self.y as i64 + self.height as i64).min(rows.end as i64);
        if top >= bottom {
            return None;
        }
        Some(Rect::new(self.x, top as i32, self.width, (bottom - top) as i32))
    }
}

fn buffer_height(len: usize, buffer_width: u32, bpp: usize) -> Result<u32> {
    let stride = buffer_width as usize * bpp;
    if stride == 0 || len % stride != 0 {
        return Err(RasterError::InvalidArgument(format!(
            "buffer of {} bytes is not a whole number of {}-pixel rows",
            len, buffer_width
        )));
    }
    Ok((len / stride) as u32)
}

// ============================================================================
// READ REGION
// ============================================================================

#[derive(Debug)]
enum Source<'a> {
    Tiles { grid: TileGrid, tiles: &'a [Tile] },
    Buffer { data: &'a [u8], stride: usize },
}

/// Read-only view over a rectangle of a [`TileManager`] or flat buffer.
#[derive(Debug)]
pub struct PixelRegion<'a> {
    source: Source<'a>,
    format: PixelFormat,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    next: u32,
    scratch: Vec<u8>,
}

impl<'a> PixelRegion<'a> {
    pub fn new(tiles: &'a TileManager, rect: Rect) -> Result<Self> {
        rect.validate(tiles.width(), tiles.height())?;
        let format = tiles.format();
        let scratch = try_alloc_zeroed(rect.width as usize * format.bytes_per_pixel())?;
        Ok(Self {
            source: Source::Tiles {
                grid: *tiles.grid(),
                tiles: tiles.tiles(),
            },
            format,
            x: rect.x as u32,
            y: rect.y as u32,
            w: rect.width as u32,
            h: rect.height as u32,
            next: 0,
            scratch,
        })
    }

    /// View over a packed row-major buffer `buffer_width` pixels wide.
    pub fn from_buffer(
        buffer: &'a [u8],
        buffer_width: u32,
        format: PixelFormat,
        rect: Rect,
    ) -> Result<Self> {
        let bpp = format.bytes_per_pixel();
        let height = buffer_height(buffer.len(), buffer_width, bpp)?;
        rect.validate(buffer_width, height)?;
        Ok(Self {
            source: Source::Buffer {
                data: buffer,
                stride: buffer_width as usize * bpp,
            },
            format,
            x: rect.x as u32,
            y: rect.y as u32,
            w: rect.width as u32,
            h: rect.height as u32,
            next: 0,
            scratch: Vec::new(),
        })
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.w
    }

    pub fn height(&self) -> u32 {
        self.h
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes in every span this region yields.
    pub fn row_bytes(&self) -> usize {
        self.w as usize * self.format.bytes_per_pixel()
    }

    pub fn rows_remaining(&self) -> u32 {
        self.h - self.next
    }

    /// Move the cursor so the next span is region row `row`.
    pub fn seek(&mut self, row: u32) {
        self.next = row.min(self.h);
    }

    /// Next row span, or `None` after the last row.
    pub fn next_row(&mut self) -> Option<&[u8]> {
        if self.next >= self.h {
            return None;
        }
        let row = self.next;
        self.next += 1;
        Some(self.fetch(row))
    }

    /// Random access to region row `row` (0-based inside the region).  Leaves
    /// the cursor just after that row.
    pub fn row_at(&mut self, row: u32) -> &[u8] {
        assert!(row < self.h, "row {} outside region of {} rows", row, self.h);
        self.next = row + 1;
        self.fetch(row)
    }

    fn fetch(&mut self, row: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let row_bytes = self.w as usize * bpp;
        let y = self.y + row;
        let Self {
            source,
            scratch,
            x,
            w,
            ..
        } = self;
        match source {
            Source::Buffer { data, stride } => {
                let data: &'a [u8] = *data;
                let start = y as usize * *stride + *x as usize * bpp;
                &data[start..start + row_bytes]
            }
            Source::Tiles { grid, tiles } => {
                let tiles: &'a [Tile] = *tiles;
                let mut segs = grid.row_segments(*x, y, *w);
                if let Some(first) = segs.next()
                    && first.byte_len == row_bytes
                    && let Some(data) = tiles[first.tile].data()
                {
                    return &data[first.tile_offset..first.tile_offset + row_bytes];
                }
                for seg in grid.row_segments(*x, y, *w) {
                    let dst = &mut scratch[seg.row_offset..seg.row_offset + seg.byte_len];
                    match tiles[seg.tile].data() {
                        Some(data) => {
                            dst.copy_from_slice(&data[seg.tile_offset..seg.tile_offset + seg.byte_len])
                        }
                        None => dst.fill(0),
                    }
                }
                &scratch[..]
            }
        }
    }
}

// ============================================================================
// WRITE REGION
// ============================================================================

#[derive(Debug)]
enum SourceMut<'a> {
    Tiles(TileBand<'a>),
    Buffer { data: &'a mut [u8], stride: usize },
}

/// Writable view over a rectangle of tiles (whole manager or one band) or of
/// a flat buffer.
///
/// Every row handed out by [`next_row_mut`](Self::next_row_mut) holds the
/// current pixel content, so callers can read-modify-write in place.
#[derive(Debug)]
pub struct PixelRegionMut<'a> {
    source: SourceMut<'a>,
    format: PixelFormat,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    next: u32,
    dirty: bool,
    scratch: Vec<u8>,
    /// Logical row currently living in `scratch`, waiting to be scattered back.
    pending: Option<u32>,
}

impl<'a> PixelRegionMut<'a> {
    pub(crate) fn from_band(band: TileBand<'a>, rect: Rect, dirty: bool) -> Result<Self> {
        let grid = *band.grid();
        rect.validate(grid.width, grid.height)?;
        let rows = band.rows();
        if (rect.y as u32) < rows.start || (rect.y + rect.height) as u32 > rows.end {
            return Err(RasterError::OutOfBounds {
                rect,
                width: grid.width,
                height: grid.height,
            });
        }
        let format = band.format();
        let scratch = try_alloc_zeroed(rect.width as usize * grid.bpp)?;
        Ok(Self {
            source: SourceMut::Tiles(band),
            format,
            x: rect.x as u32,
            y: rect.y as u32,
            w: rect.width as u32,
            h: rect.height as u32,
            next: 0,
            dirty,
            scratch,
            pending: None,
        })
    }

    /// Writable view over a packed row-major buffer, e.g. a fresh preview.
    pub fn from_buffer(
        buffer: &'a mut [u8],
        buffer_width: u32,
        format: PixelFormat,
        rect: Rect,
    ) -> Result<Self> {
        let bpp = format.bytes_per_pixel();
        let height = buffer_height(buffer.len(), buffer_width, bpp)?;
        rect.validate(buffer_width, height)?;
        Ok(Self {
            source: SourceMut::Buffer {
                data: buffer,
                stride: buffer_width as usize * bpp,
            },
            format,
            x: rect.x as u32,
            y: rect.y as u32,
            w: rect.width as u32,
            h: rect.height as u32,
            next: 0,
            dirty: false,
            scratch: Vec::new(),
            pending: None,
        })
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.w
    }

    pub fn height(&self) -> u32 {
        self.h
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn row_bytes(&self) -> usize {
        self.w as usize * self.format.bytes_per_pixel()
    }

    pub fn rows_remaining(&self) -> u32 {
        self.h - self.next
    }

    pub fn seek(&mut self, row: u32) {
        self.flush();
        self.next = row.min(self.h);
    }

    /// Next writable row span, or `None` after the last row.  Fails only when
    /// a tile under the row cannot be allocated.
    pub fn next_row_mut(&mut self) -> Result<Option<&mut [u8]>> {
        self.flush();
        if self.next >= self.h {
            return Ok(None);
        }
        let y = self.y + self.next;
        self.next += 1;

        let bpp = self.format.bytes_per_pixel();
        let row_bytes = self.w as usize * bpp;
        let Self {
            source,
            scratch,
            pending,
            dirty,
            x,
            w,
            ..
        } = self;
        match source {
            SourceMut::Buffer { data, stride } => {
                let start = y as usize * *stride + *x as usize * bpp;
                Ok(Some(&mut data[start..start + row_bytes]))
            }
            SourceMut::Tiles(band) => {
                let grid = *band.grid();
                let mut single = None;
                for seg in grid.row_segments(*x, y, *w) {
                    let tile = band.tile_mut(seg.tile);
                    tile.materialize()?;
                    if *dirty {
                        tile.mark_dirty();
                    }
                    if seg.byte_len == row_bytes {
                        single = Some(seg);
                    }
                }
                if let Some(seg) = single {
                    let data = band.tile_mut(seg.tile).materialize()?;
                    return Ok(Some(&mut data[seg.tile_offset..seg.tile_offset + row_bytes]));
                }
                for seg in grid.row_segments(*x, y, *w) {
                    if let Some(data) = band.tile_mut(seg.tile).data() {
                        scratch[seg.row_offset..seg.row_offset + seg.byte_len]
                            .copy_from_slice(&data[seg.tile_offset..seg.tile_offset + seg.byte_len]);
                    }
                }
                *pending = Some(y);
                Ok(Some(&mut scratch[..]))
            }
        }
    }

    /// Scatter a gathered row back into its tiles.
    fn flush(&mut self) {
        let Some(y) = self.pending.take() else { return };
        let Self {
            source, scratch, x, w, ..
        } = self;
        if let SourceMut::Tiles(band) = source {
            let grid = *band.grid();
            for seg in grid.row_segments(*x, y, *w) {
                if let Some(data) = band.tile_mut(seg.tile).data_mut() {
                    data[seg.tile_offset..seg.tile_offset + seg.byte_len]
                        .copy_from_slice(&scratch[seg.row_offset..seg.row_offset + seg.byte_len]);
                }
            }
        }
    }

    /// Write back any pending row and release the view.
    pub fn finish(mut self) {
        self.flush();
    }
}

impl Drop for PixelRegionMut<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}
