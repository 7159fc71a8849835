//! Core data structures for volmesh
//!
//! This crate provides the pure, in-memory stages of the volume-to-mesh
//! pipeline: foreground bounding boxes, cropping and padding of labeled
//! volumes, vertex/face buffers, and the transform from the padded voxel
//! frame into global physical coordinates.

pub mod config;
pub mod crop;
pub mod error;
pub mod mesh;
pub mod transform;
pub mod volume;

pub use config::*;
pub use crop::*;
pub use error::*;
pub use mesh::*;
pub use transform::*;
pub use volume::*;

/// Re-export the array types volumes are expressed in
pub use ndarray::{Array3, ArrayView3};
