//! Vector algorithms
//!
//! Geometric operations on vector features:
//! - Buffer: grow points, lines and polygons by a distance
//! - Multi-ring buffer: concentric distance bands, tagged with elevations

mod buffer;
mod rings;

pub use buffer::{buffer_geometry, buffer_points, polygonal_part, union_all, BufferParams};
pub use rings::{
    multi_ring_buffer, tag_rings, BufferUnit, Dissolve, MultiRingParams, DISTANCE_FIELD, Z_FIELD,
};
