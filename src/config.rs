//! Engine configuration persisted as plain `key=value` lines.

use std::path::Path;

use crate::error::{RasterError, Result};

/// Default tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 64;

/// Largest image (in pixels) a tile manager accepts by default.
pub const DEFAULT_MAX_PIXELS: u64 = 256_000_000;

/// Tunables shared by tile managers, previews and layer merging.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Tile width in pixels
    pub tile_width: u32,
    /// Tile height in pixels
    pub tile_height: u32,
    /// Upper bound on `width * height` for a single tile manager
    pub max_pixels: u64,
    /// Spread preview rows and merge bands across the rayon pool
    pub parallel: bool,
    /// Below this many destination rows everything runs on the calling thread
    pub parallel_min_rows: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            max_pixels: DEFAULT_MAX_PIXELS,
            parallel: true,
            parallel_min_rows: 64,
        }
    }
}

impl EngineConfig {
    /// Convenience for tests and small images: square tiles of `size`.
    pub fn with_tile_size(mut self, size: u32) -> Self {
        self.tile_width = size;
        self.tile_height = size;
        self
    }

    pub fn serial(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(RasterError::InvalidArgument(format!(
                "tile size {}x{} must be positive",
                self.tile_width, self.tile_height
            )));
        }
        // in-tile offsets are computed in u32
        if self.tile_width as u64 * self.tile_height as u64 > u32::MAX as u64 {
            return Err(RasterError::InvalidArgument(format!(
                "tile size {}x{} exceeds {} pixels per tile",
                self.tile_width,
                self.tile_height,
                u32::MAX
            )));
        }
        if self.max_pixels == 0 {
            return Err(RasterError::InvalidArgument(
                "max_pixels must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse `key=value` lines.  Unknown keys and malformed values are skipped
    /// and keep their defaults.
    pub fn parse(content: &str) -> Self {
        let mut c = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "tile_width" => {
                    if let Ok(v) = val.parse() {
                        c.tile_width = v;
                    }
                }
                "tile_height" => {
                    if let Ok(v) = val.parse() {
                        c.tile_height = v;
                    }
                }
                "max_pixels" => {
                    if let Ok(v) = val.parse() {
                        c.max_pixels = v;
                    }
                }
                "parallel" => {
                    c.parallel = val == "true";
                }
                "parallel_min_rows" => {
                    if let Ok(v) = val.parse() {
                        c.parallel_min_rows = v;
                    }
                }
                _ => {}
            }
        }
        c
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "tile_width={}\n\
             tile_height={}\n\
             max_pixels={}\n\
             parallel={}\n\
             parallel_min_rows={}\n",
            self.tile_width,
            self.tile_height,
            self.max_pixels,
            self.parallel,
            self.parallel_min_rows,
        )
    }

    /// Load from disk (returns default if the file is missing or unreadable).
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        let config = Self::parse(&content);
        if let Err(e) = config.validate() {
            log_warn!("ignoring config {}: {}", path.display(), e);
            return Self::default();
        }
        config
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Err(e) = std::fs::write(path, self.to_config_string()) {
            log_err!("failed to save config {}: {}", path.display(), e);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = EngineConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.tile_width, 64);
        assert_eq!(c.tile_height, 64);
    }

    #[test]
    fn parse_reads_known_keys() {
        let c = EngineConfig::parse(
            "# engine\ntile_width=4\ntile_height = 8\nparallel=false\nbogus=1\nmax_pixels=abc\n",
        );
        assert_eq!(c.tile_width, 4);
        assert_eq!(c.tile_height, 8);
        assert!(!c.parallel);
        assert_eq!(c.max_pixels, DEFAULT_MAX_PIXELS);
    }

    #[test]
    fn config_string_parses_back() {
        let c = EngineConfig {
            tile_width: 16,
            tile_height: 32,
            max_pixels: 1000,
            parallel: false,
            parallel_min_rows: 3,
        };
        assert_eq!(EngineConfig::parse(&c.to_config_string()), c);
    }

    #[test]
    fn zero_tile_size_is_rejected() {
        let c = EngineConfig::default().with_tile_size(0);
        assert!(matches!(c.validate(), Err(RasterError::InvalidArgument(_))));
    }

    #[test]
    fn tile_area_must_fit_offsets() {
        let c = EngineConfig::default().with_tile_size(70_000);
        assert!(matches!(c.validate(), Err(RasterError::InvalidArgument(_))));
        let c = EngineConfig {
            tile_width: u32::MAX,
            tile_height: 2,
            ..EngineConfig::default()
        };
        assert!(c.validate().is_err());
        assert!(EngineConfig::default().with_tile_size(65_535).validate().is_ok());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let c = EngineConfig::load_from(Path::new("/nonexistent/tilecanvas.cfg"));
        assert_eq!(c, EngineConfig::default());
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("tilecanvas-{}.cfg", std::process::id()));
        let c = EngineConfig::default().with_tile_size(16).serial();
        c.save_to(&path).unwrap();
        let loaded = EngineConfig::load_from(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, c);
    }
}
