//! Vector to raster conversion
//!
//! - Polygon to raster: burn a numeric attribute into a template-aligned grid

mod rasterize;

pub use rasterize::{polygons_to_raster, CellAssignment, RasterizeParams};
