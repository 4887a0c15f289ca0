//! # TerraStamp Algorithms
//!
//! Algorithms behind the TerraStamp surface stamping tool.
//!
//! ## Modules
//!
//! - **profile**: stair policies, height-function expressions, elevation profiles
//! - **vector**: buffers and multi-ring buffers
//! - **conversion**: polygon to raster conversion
//! - **stamp**: surface combination, scratch space and the full pipeline

pub(crate) mod maybe_rayon;

pub mod conversion;
pub mod profile;
pub mod stamp;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::conversion::{polygons_to_raster, CellAssignment, RasterizeParams};
    pub use crate::profile::{
        resolve_profile, ElevationProfile, Expression, HeightFunction, ProfileEntry, StairPolicy,
    };
    pub use crate::stamp::{
        combine, combine_with, raster_stamp, raster_stamp_files, DatasetPath, RasterStamp,
        ScratchSpace, StampOp, StampParams, ZeroDivision,
    };
    pub use crate::vector::{
        buffer_geometry, multi_ring_buffer, tag_rings, BufferParams, BufferUnit, Dissolve,
        MultiRingParams,
    };
    pub use terrastamp_core::prelude::*;
}
