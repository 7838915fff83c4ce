use crate::error::{Result, try_alloc_zeroed};

/// One fixed-size block of packed pixels.
///
/// The buffer is materialized lazily on first write; until then the tile
/// reads as all zeros.  Dimensions and bytes-per-pixel never change after
/// construction, so a materialized buffer always holds
/// `width * height * bpp` bytes.
#[derive(Clone, Debug)]
pub struct Tile {
    width: u32,
    height: u32,
    bpp: usize,
    data: Option<Box<[u8]>>,
    dirty: bool,
    revision: u64,
}

impl Tile {
    pub fn new(width: u32, height: u32, bpp: usize) -> Self {
        Self {
            width,
            height,
            bpp,
            data: None,
            dirty: false,
            revision: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes in one tile row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * self.bpp
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.stride() * self.height as usize
    }

    #[inline]
    pub fn is_materialized(&self) -> bool {
        self.data.is_some()
    }

    /// Pixel bytes, or `None` while the tile is still implicit zeros.
    #[inline]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Mutable pixel bytes of an already materialized tile.
    #[inline]
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        self.touch();
        self.data.as_deref_mut()
    }

    /// Allocate the zero-filled buffer if it does not exist yet.
    pub fn materialize(&mut self) -> Result<&mut [u8]> {
        self.touch();
        let data = match self.data.take() {
            Some(data) => data,
            None => try_alloc_zeroed(self.byte_len())?.into_boxed_slice(),
        };
        Ok(&mut self.data.insert(data)[..])
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[inline]
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Drop the pixel buffer; the tile reads as zeros again.
    pub fn evict(&mut self) {
        self.touch();
        self.data = None;
        self.dirty = false;
    }

    /// Bumped on every mutable access to the pixels.  Unlike the dirty flag
    /// it is never reset, so several observers can each remember the value
    /// they last saw.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[inline]
    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}
