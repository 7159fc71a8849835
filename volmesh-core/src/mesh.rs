//! Vertex and face buffers flowing through the pipeline

use crate::{Error, Result};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// 64-bit vertex position
pub type Point3d = Point3<f64>;

/// 64-bit direction vector
pub type Vector3d = Vector3<f64>;

/// Faces whose doubled area falls below this are treated as degenerate
pub const DEGENERATE_AREA_EPSILON: f64 = 1e-12;

/// Unnormalized face normal; its length is twice the face area
fn area_vector(a: &Point3d, b: &Point3d, c: &Point3d) -> Vector3d {
    (b - a).cross(&(c - a))
}

/// Area-weighted unit vertex normals following face winding.
///
/// Vertices touched only by degenerate faces get a zero normal.
pub fn vertex_normals(vertices: &[Point3d], faces: &[[usize; 3]]) -> Vec<Vector3d> {
    let mut normals = vec![Vector3d::zeros(); vertices.len()];
    for &[a, b, c] in faces {
        let weighted = area_vector(&vertices[a], &vertices[b], &vertices[c]);
        for index in [a, b, c] {
            normals[index] += weighted;
        }
    }
    normals
        .into_iter()
        .map(|n| n.try_normalize(DEGENERATE_AREA_EPSILON).unwrap_or_else(Vector3d::zeros))
        .collect()
}

/// Bit pattern of a position, with `-0.0` folded onto `0.0`
fn position_key(vertex: &Point3d) -> [u64; 3] {
    [vertex.x, vertex.y, vertex.z].map(|c| if c == 0.0 { 0.0f64.to_bits() } else { c.to_bits() })
}

/// Geometry as produced by an isosurface extractor.
///
/// Vertices are in the padded local voxel frame, in the volume's native
/// (Z, Y, X) axis order. Faces hold 0-based vertex indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSurface {
    pub vertices: Vec<Point3d>,
    pub normals: Vec<Vector3d>,
    pub faces: Vec<[usize; 3]>,
}

impl RawSurface {
    /// Create a surface without normals
    pub fn new(vertices: Vec<Point3d>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            normals: Vec::new(),
            faces,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the surface is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Recompute vertex normals from the faces.
    ///
    /// With `remove_degenerate_faces`, zero-area faces are dropped first. A
    /// surface left without faces loses its vertices too.
    pub fn recompute_normals(&mut self, remove_degenerate_faces: bool) {
        if remove_degenerate_faces {
            let vertices = &self.vertices;
            let before = self.faces.len();
            self.faces.retain(|&[a, b, c]| {
                area_vector(&vertices[a], &vertices[b], &vertices[c]).norm() > DEGENERATE_AREA_EPSILON
            });
            if self.faces.len() < before {
                tracing::debug!(removed = before - self.faces.len(), "dropped degenerate faces");
            }
        }

        if self.faces.is_empty() {
            self.vertices.clear();
            self.normals.clear();
        } else {
            self.normals = vertex_normals(&self.vertices, &self.faces);
        }
    }
}

/// A triangle mesh in global physical coordinates.
///
/// Vertices are `(x, y, z)`; faces hold 1-based vertex indices in the
/// target winding convention, exactly as they appear in an OBJ file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Point3d>,
    pub faces: Vec<[usize; 3]>,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh from vertices and 1-based faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3d>, faces: Vec<[usize; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Corner positions of a face, or `None` if any index is out of range
    fn corners(&self, face: &[usize; 3]) -> Option<[&Point3d; 3]> {
        let [a, b, c] = face.map(|i| i.checked_sub(1).and_then(|i| self.vertices.get(i)));
        Some([a?, b?, c?])
    }

    /// Unit normal of a face, following its winding.
    ///
    /// `None` when the face does not exist, refers to a missing vertex, or
    /// has no area.
    pub fn face_normal(&self, face: usize) -> Option<Vector3d> {
        let [v0, v1, v2] = self.corners(self.faces.get(face)?)?;
        area_vector(v0, v1, v2).try_normalize(DEGENERATE_AREA_EPSILON)
    }

    /// Check that every face refers to an existing vertex
    pub fn validate_faces(&self) -> Result<()> {
        match self.faces.iter().position(|face| self.corners(face).is_none()) {
            Some(index) => Err(Error::InvalidData(format!(
                "face {index} refers to a vertex outside 1..={}",
                self.vertices.len()
            ))),
            None => Ok(()),
        }
    }

    /// Drop faces with no area and return how many were removed
    pub fn remove_degenerate_faces(&mut self) -> Result<usize> {
        self.validate_faces()?;
        let before = self.faces.len();
        let vertices = &self.vertices;
        self.faces.retain(|&[a, b, c]| {
            area_vector(&vertices[a - 1], &vertices[b - 1], &vertices[c - 1]).norm()
                > DEGENERATE_AREA_EPSILON
        });
        Ok(before - self.faces.len())
    }

    /// Remove vertices no face refers to, renumbering the faces
    pub fn drop_unused_vertices(&mut self) -> Result<()> {
        self.validate_faces()?;
        let mut used = vec![false; self.vertices.len()];
        for &index in self.faces.iter().flatten() {
            used[index - 1] = true;
        }

        let mut renumbered = vec![0; self.vertices.len()];
        let mut next = 0;
        for (index, &keep) in used.iter().enumerate() {
            if keep {
                next += 1;
                renumbered[index] = next;
            }
        }

        let mut index = 0;
        self.vertices.retain(|_| {
            index += 1;
            used[index - 1]
        });
        for face in &mut self.faces {
            *face = face.map(|i| renumbered[i - 1]);
        }
        Ok(())
    }

    /// Merge vertices with identical positions so adjacent faces share them.
    ///
    /// Faces are remapped to the first occurrence of each position, unused
    /// vertices are dropped and faces over the same three vertices are kept
    /// once, whatever their winding. Returns `false` when no vertex was
    /// duplicated.
    pub fn stitch_adjacent_faces(&mut self) -> Result<bool> {
        self.validate_faces()?;
        let mut first_seen: HashMap<[u64; 3], usize> = HashMap::with_capacity(self.vertices.len());
        let canonical: Vec<usize> = self
            .vertices
            .iter()
            .enumerate()
            .map(|(index, vertex)| *first_seen.entry(position_key(vertex)).or_insert(index + 1))
            .collect();

        if first_seen.len() == self.vertices.len() {
            return Ok(false);
        }
        let merged = self.vertices.len() - first_seen.len();

        for face in &mut self.faces {
            *face = face.map(|i| canonical[i - 1]);
        }
        self.drop_unused_vertices()?;

        let before = self.faces.len();
        let mut seen = HashSet::with_capacity(before);
        self.faces.retain(|face| {
            let mut key = *face;
            key.sort_unstable();
            seen.insert(key)
        });

        tracing::debug!(
            merged,
            duplicate_faces = before - self.faces.len(),
            "stitched adjacent faces"
        );
        Ok(true)
    }

    /// Join meshes into one, offsetting each mesh's faces past the vertices before it
    pub fn concatenate<I>(meshes: I) -> Self
    where
        I: IntoIterator<Item = Mesh>,
    {
        let mut combined = Mesh::new();
        for mesh in meshes {
            let offset = combined.vertices.len();
            combined.vertices.extend(mesh.vertices);
            combined
                .faces
                .extend(mesh.faces.into_iter().map(|face| face.map(|i| i + offset)));
        }
        combined
    }

    /// Mean of all vertex positions
    pub fn centroid(&self) -> Option<Point3d> {
        if self.vertices.is_empty() {
            return None;
        }
        let sum = self
            .vertices
            .iter()
            .fold(Vector3d::zeros(), |acc, v| acc + v.coords);
        Some(Point3d::from(sum / self.vertices.len() as f64))
    }
}
