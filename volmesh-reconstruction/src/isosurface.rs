//! Isosurface extraction from padded boolean volumes
//!
//! The pipeline only depends on the [`IsosurfaceExtractor`] seam. The bundled
//! [`VoxelSurfaceExtractor`] builds the closed boundary surface of the
//! foreground voxels and relaxes it with Laplacian smoothing.

use ndarray::ArrayView3;
use rayon::prelude::*;
use std::collections::HashMap;
use volmesh_core::{Point3d, RawSurface, Result};

/// Produces raw surface buffers from a padded boolean volume.
///
/// Implementations return vertices in the volume's (Z, Y, X) index frame,
/// 0-based faces, and faces wound counter-clockwise when viewed from outside
/// in that frame.
pub trait IsosurfaceExtractor {
    fn extract(&self, volume: ArrayView3<'_, bool>, smoothing_iterations: usize) -> Result<RawSurface>;
}

impl<F> IsosurfaceExtractor for F
where
    F: Fn(ArrayView3<'_, bool>, usize) -> Result<RawSurface>,
{
    fn extract(&self, volume: ArrayView3<'_, bool>, smoothing_iterations: usize) -> Result<RawSurface> {
        self(volume, smoothing_iterations)
    }
}

/// Boundary-face extractor with Laplacian smoothing.
///
/// Every face shared by a foreground and a background voxel becomes a quad.
/// Voxel `p` spans `[p, p + 1]` on each axis and corners are shared, so the
/// result is a closed, consistently oriented surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoxelSurfaceExtractor;

impl IsosurfaceExtractor for VoxelSurfaceExtractor {
    fn extract(&self, volume: ArrayView3<'_, bool>, smoothing_iterations: usize) -> Result<RawSurface> {
        let (nz, ny, nx) = volume.dim();
        let dims = [nz, ny, nx];
        let is_filled = |index: [usize; 3]| (0..3).all(|a| index[a] < dims[a]) && volume[index];

        let mut corners: HashMap<[usize; 3], usize> = HashMap::new();
        let mut vertices = Vec::new();
        let mut faces = Vec::new();
        let mut corner_id = |corner: [usize; 3]| {
            *corners.entry(corner).or_insert_with(|| {
                vertices.push(Point3d::new(corner[0] as f64, corner[1] as f64, corner[2] as f64));
                vertices.len() - 1
            })
        };

        for ((z, y, x), &filled) in volume.indexed_iter() {
            if !filled {
                continue;
            }
            let voxel = [z, y, x];

            for axis in 0..3 {
                let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);

                for outward in [false, true] {
                    let exposed = if outward {
                        let mut neighbor = voxel;
                        neighbor[axis] += 1;
                        !is_filled(neighbor)
                    } else {
                        voxel[axis] == 0 || {
                            let mut neighbor = voxel;
                            neighbor[axis] -= 1;
                            !is_filled(neighbor)
                        }
                    };
                    if !exposed {
                        continue;
                    }

                    let mut c0 = voxel;
                    if outward {
                        c0[axis] += 1;
                    }
                    let mut c1 = c0;
                    c1[u] += 1;
                    let mut c2 = c1;
                    c2[v] += 1;
                    let mut c3 = c0;
                    c3[v] += 1;

                    let [i0, i1, i2, i3] = [c0, c1, c2, c3].map(&mut corner_id);
                    // e_u x e_v points along +axis
                    if outward {
                        faces.push([i0, i1, i2]);
                        faces.push([i0, i2, i3]);
                    } else {
                        faces.push([i0, i2, i1]);
                        faces.push([i0, i3, i2]);
                    }
                }
            }
        }

        laplacian_smooth(&mut vertices, &faces, smoothing_iterations);
        // Smoothing can collapse faces onto a line
        let mut surface = RawSurface::new(vertices, faces);
        surface.recompute_normals(true);

        tracing::debug!(
            vertices = surface.vertex_count(),
            faces = surface.face_count(),
            smoothing_iterations,
            "extracted voxel surface"
        );
        Ok(surface)
    }
}

/// Move each vertex to the mean of itself and its edge neighbours, `iterations` times
pub fn laplacian_smooth(vertices: &mut [Point3d], faces: &[[usize; 3]], iterations: usize) {
    if iterations == 0 || vertices.is_empty() {
        return;
    }

    let mut edges: Vec<(usize, usize)> = faces
        .iter()
        .flat_map(|&[a, b, c]| [(a, b), (b, c), (c, a)])
        .map(|(p, q)| (p.min(q), p.max(q)))
        .collect();
    edges.sort_unstable();
    edges.dedup();

    let mut neighbors = vec![Vec::new(); vertices.len()];
    for (a, b) in edges {
        neighbors[a].push(b);
        neighbors[b].push(a);
    }

    let mut previous = vertices.to_vec();
    for _ in 0..iterations {
        previous.copy_from_slice(vertices);
        vertices
            .par_iter_mut()
            .zip(neighbors.par_iter())
            .for_each(|(vertex, adjacent)| {
                let sum = adjacent
                    .iter()
                    .fold(vertex.coords, |acc, &n| acc + previous[n].coords);
                *vertex = Point3d::from(sum / (adjacent.len() + 1) as f64);
            });
    }
}
