use uuid::Uuid;

use crate::compose::LayerMode;
use crate::config::EngineConfig;
use crate::error::{RasterError, Result};
use crate::format::PixelFormat;
use crate::merge::composite_regions_with_config;
use crate::preview::{PreviewBuffer, get_preview_with_config};
use crate::region::Rect;
use crate::tiles::TileManager;

/// Anything backed by a tile manager: layers, channels, masks.
pub trait Drawable {
    fn tile_manager(&self) -> &TileManager;

    fn tile_manager_mut(&mut self) -> &mut TileManager;

    fn bytes_per_pixel(&self) -> usize {
        self.tile_manager().bytes_per_pixel()
    }
}

impl Drawable for TileManager {
    fn tile_manager(&self) -> &TileManager {
        self
    }

    fn tile_manager_mut(&mut self) -> &mut TileManager {
        self
    }
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Clone, Debug)]
pub struct Layer {
    pub id: Uuid,
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub mode: LayerMode,
    pub pixels: TileManager,
    /// Optional single-channel mask, same size as `pixels`.
    pub mask: Option<TileManager>,
    /// Last preview handed out, valid while `pixels.revision()` equals
    /// `preview_revision`.
    preview_cache: Option<PreviewBuffer>,
    preview_revision: u64,
}

impl Layer {
    pub fn new(name: impl Into<String>, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        Ok(Self::from_tiles(name, TileManager::new(width, height, format)?))
    }

    pub fn from_tiles(name: impl Into<String>, pixels: TileManager) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            visible: true,
            opacity: 1.0,
            mode: LayerMode::Replace,
            pixels,
            mask: None,
            preview_cache: None,
            preview_revision: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Attach a mask; it must be single-channel and match the layer size.
    pub fn set_mask(&mut self, mask: TileManager) -> Result<()> {
        mask.format().require_mask()?;
        if mask.width() != self.width() || mask.height() != self.height() {
            return Err(RasterError::InvalidArgument(format!(
                "mask {}x{} does not match layer {}x{}",
                mask.width(),
                mask.height(),
                self.width(),
                self.height()
            )));
        }
        self.mask = Some(mask);
        Ok(())
    }

    pub fn invalidate_preview(&mut self) {
        self.preview_cache = None;
    }

    /// Cached preview at `width × height` in the layer's own format.
    /// Recomputed when the size changes or pixels were modified since the
    /// last call.  Dirty flags are left for other observers; a failed
    /// request keeps the previous cache.
    pub fn preview(&mut self, width: i32, height: i32) -> Result<&PreviewBuffer> {
        let revision = self.pixels.revision();
        let fresh = self.preview_revision == revision;
        let preview = match self.preview_cache.take() {
            Some(cached) if fresh && cached.width as i32 == width && cached.height as i32 == height => {
                cached
            }
            previous => match get_preview_with_config(
                &self.pixels,
                self.pixels.format(),
                width,
                height,
                &EngineConfig::default(),
            ) {
                Ok(preview) => preview,
                Err(e) => {
                    self.preview_cache = previous;
                    return Err(e);
                }
            },
        };
        self.preview_revision = revision;
        let cached: &PreviewBuffer = self.preview_cache.insert(preview);
        Ok(cached)
    }

    /// Composite this layer onto `base` in place.  Hidden layers are skipped.
    pub fn merge_onto(&self, base: &mut TileManager) -> Result<()> {
        self.merge_onto_with_config(base, &EngineConfig::default())
    }

    pub fn merge_onto_with_config(&self, base: &mut TileManager, config: &EngineConfig) -> Result<()> {
        if !self.visible {
            return Ok(());
        }
        let rect = Rect::new(0, 0, self.width() as i32, self.height() as i32);
        composite_regions_with_config(
            None,
            &self.pixels,
            self.mask.as_ref(),
            base,
            rect,
            self.mode,
            self.opacity,
            config,
        )
    }
}

impl Drawable for Layer {
    fn tile_manager(&self) -> &TileManager {
        &self.pixels
    }

    fn tile_manager_mut(&mut self) -> &mut TileManager {
        &mut self.pixels
    }
}
