//! Tiled raster storage with boundary-transparent pixel regions, box-filtered
//! previews and point compositing.
//!
//! Images are stored as grids of fixed-size tiles ([`TileManager`]).  Callers
//! never address tiles directly: they open a [`PixelRegion`] or
//! [`PixelRegionMut`] over a rectangle and walk it row by row.  On top of
//! that sit reduced-size previews ([`get_preview`], [`get_sub_preview`]) and
//! the [`LayerMode`] compositor family driven by
//! [`merge::composite_regions`].

#[macro_use]
pub mod logger;

pub mod compose;
pub mod config;
pub mod error;
pub mod format;
pub mod layer;
pub mod merge;
pub mod preview;
pub mod region;
pub mod subsample;
pub mod tiles;

pub use compose::{LayerMode, composite};
pub use config::EngineConfig;
pub use error::{RasterError, Result};
pub use format::{PixelFormat, SampleType};
pub use layer::{Drawable, Layer};
pub use merge::composite_regions;
pub use preview::{PreviewBuffer, get_preview, get_sub_preview};
pub use region::{PixelRegion, PixelRegionMut, Rect};
pub use subsample::subsample_factor;
pub use tiles::{Tile, TileBand, TileGrid, TileManager};
