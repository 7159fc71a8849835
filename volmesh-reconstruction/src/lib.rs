//! # Volmesh Reconstruction
//!
//! Turns labelled voxel volumes into meshes: an isosurface extraction seam
//! with a bundled voxel-boundary extractor, and the pipeline that chains
//! cropping, extraction, coordinate transform, serialization and
//! simplification.

pub mod isosurface;
pub mod pipeline;

pub use isosurface::*;
pub use pipeline::*;
