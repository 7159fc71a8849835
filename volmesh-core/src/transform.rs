//! Mapping isosurface buffers from the padded voxel frame to global coordinates

use crate::config::PipelineConfig;
use crate::crop::PAD_WIDTH;
use crate::mesh::{Mesh, Point3d, RawSurface, Vector3d};
use crate::volume::BoundingBox;
use rayon::prelude::*;

/// Rescales, translates and re-winds raw isosurface buffers.
///
/// A raw vertex `p = (pz, py, px)` in the padded frame maps to
/// `(p - PAD_WIDTH + box.min) * downsample_factor`, reordered to `(x, y, z)`,
/// plus the configured offset. Each face is reversed and made 1-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBufferTransformer {
    scale: f64,
    /// Padded-frame origin of the crop, in `(z, y, x)` voxel units
    origin_zyx: Vector3d,
    offset_xyz: Vector3d,
}

impl MeshBufferTransformer {
    /// Create a transformer for a crop taken at `bbox`
    pub fn new(config: &PipelineConfig, bbox: &BoundingBox) -> Self {
        let pad = PAD_WIDTH as f64;
        Self {
            scale: config.downsample_factor,
            origin_zyx: Vector3d::new(
                bbox.min[0] as f64 - pad,
                bbox.min[1] as f64 - pad,
                bbox.min[2] as f64 - pad,
            ),
            offset_xyz: Vector3d::from(config.offset),
        }
    }

    /// Map one padded-frame `(z, y, x)` vertex to a global `(x, y, z)` position
    pub fn transform_vertex(&self, vertex: &Point3d) -> Point3d {
        let global_zyx = (vertex.coords + self.origin_zyx) * self.scale;
        Point3d::new(global_zyx[2], global_zyx[1], global_zyx[0]) + self.offset_xyz
    }

    /// Reverse a 0-based face and convert it to 1-based indexing
    pub fn transform_face(face: &[usize; 3]) -> [usize; 3] {
        [face[2] + 1, face[1] + 1, face[0] + 1]
    }

    /// Transform a whole surface into a [`Mesh`]; normals are dropped
    pub fn transform(&self, surface: &RawSurface) -> Mesh {
        let vertices: Vec<Point3d> = surface
            .vertices
            .par_iter()
            .map(|v| self.transform_vertex(v))
            .collect();
        let faces: Vec<[usize; 3]> = surface.faces.par_iter().map(Self::transform_face).collect();

        tracing::debug!(
            vertices = vertices.len(),
            faces = faces.len(),
            scale = self.scale,
            "transformed surface into global frame"
        );
        Mesh::from_vertices_and_faces(vertices, faces)
    }
}
