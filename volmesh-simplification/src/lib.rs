//! Mesh simplification through an external decimation tool
//!
//! The decimation algorithm itself lives in a separate executable
//! (`fq-mesh-simplify` by default). This crate streams OBJ bytes into it and
//! back out again through a pair of named pipes, so the full mesh never lands
//! in a regular file.

#[cfg(unix)]
pub mod pipe;
#[cfg(unix)]
pub mod streamer;

#[cfg(unix)]
pub use pipe::*;
#[cfg(unix)]
pub use streamer::*;

use volmesh_core::Result;

/// Simplify a serialized mesh
pub trait MeshSimplifier {
    /// Simplify an OBJ byte stream, keeping roughly `ratio` (in `(0, 1]`) of its faces
    fn simplify(&self, obj: &[u8], ratio: f64) -> Result<Vec<u8>>;
}

impl<S: MeshSimplifier + ?Sized> MeshSimplifier for &S {
    fn simplify(&self, obj: &[u8], ratio: f64) -> Result<Vec<u8>> {
        (**self).simplify(obj, ratio)
    }
}
