//! Measurement-set table access.
//!
//! The table format itself is opaque. Stages only need a handful of
//! queries: subtable lookups, predicate-based row selection copied to a
//! new store, and a window of pixels from an image. [`TableAccessor`] is
//! the seam; [`TaqlTables`] implements it by driving casacore's `taql`.

mod filter;
mod taql;

pub use filter::{CopyMode, RowFilter, VisRow};
pub use taql::{DEFAULT_TAQL_EXECUTABLE, TaqlTables};

use async_trait::async_trait;
use msss_shared::errors::MsssResult;
use ndarray::Array2;
use std::path::Path;
use std::sync::Arc;

/// Square pixel window on one plane of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageWindow {
    /// Polarisation plane index.
    pub plane: usize,
    /// First row/column of the window.
    pub start: usize,
    /// Width and height.
    pub size: usize,
}

impl ImageWindow {
    /// Window of `2 * half_width` pixels centred on an `npix` image.
    pub fn centred(plane: usize, npix: usize, half_width: usize) -> Self {
        Self {
            plane,
            start: (npix / 2).saturating_sub(half_width),
            size: 2 * half_width,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.size
    }
}

/// Read/copy operations on measurement sets and images.
#[async_trait]
pub trait TableAccessor: Send + Sync {
    /// Phase centre `(ra, dec)` in radians from the first FIELD row.
    async fn reference_direction(&self, ms: &Path) -> MsssResult<(f64, f64)>;

    /// Target name recorded in the OBSERVATION subtable.
    async fn observation_target(&self, ms: &Path) -> MsssResult<String>;

    /// Copy the rows of `msin` accepted by `filter` into a new store.
    async fn copy_filtered(
        &self,
        msin: &Path,
        msout: &Path,
        filter: &RowFilter,
        mode: CopyMode,
    ) -> MsssResult<()>;

    /// Pixels of `window` from the first channel of the image `map` column.
    async fn image_window(&self, image: &Path, window: ImageWindow) -> MsssResult<Array2<f64>>;
}

pub type SharedTables = Arc<dyn TableAccessor>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centred_window() {
        let window = ImageWindow::centred(3, 1024, 25);
        assert_eq!(window.start, 487);
        assert_eq!(window.end(), 537);
        assert_eq!(window.size, 50);
    }
}
