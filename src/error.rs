use crate::region::Rect;

/// Error type for tile storage, region and preview operations.
///
/// These are precondition failures reported before any pixel is touched, so
/// a returned error never comes with a partial result.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterError {
    /// Non-positive dimensions, mismatched pixel formats and similar caller mistakes.
    InvalidArgument(String),
    /// The requested rectangle leaves the source's logical extent.
    OutOfBounds {
        rect: Rect,
        width: u32,
        height: u32,
    },
    /// Tile or buffer allocation failed.
    ResourceExhausted(String),
}

impl std::fmt::Display for RasterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RasterError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            RasterError::OutOfBounds { rect, width, height } => write!(
                f,
                "Rectangle {}x{} at ({}, {}) is outside the {}x{} source",
                rect.width, rect.height, rect.x, rect.y, width, height
            ),
            RasterError::ResourceExhausted(e) => write!(f, "Resource exhausted: {}", e),
        }
    }
}

impl std::error::Error for RasterError {}

impl From<std::collections::TryReserveError> for RasterError {
    fn from(e: std::collections::TryReserveError) -> Self {
        RasterError::ResourceExhausted(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RasterError>;

/// Allocate a zero-filled byte buffer, surfacing allocation failure as
/// `ResourceExhausted` instead of aborting.
pub(crate) fn try_alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Err(e) = buf.try_reserve_exact(len) {
        log_warn!("allocation of {} bytes failed: {}", len, e);
        return Err(e.into());
    }
    buf.resize(len, 0);
    Ok(buf)
}
