//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{GridWindow, Raster, RasterStatistics};
