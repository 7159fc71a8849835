//! Volume-to-mesh pipeline
//!
//! A [`MeshPipeline`] runs one labelled volume through every stage: bounding
//! box, crop and pad, isosurface extraction, transform to global
//! coordinates, OBJ serialization and, when a ratio is configured, external
//! simplification. Each run is parameterized only by its [`PipelineConfig`].

use crate::isosurface::{IsosurfaceExtractor, VoxelSurfaceExtractor};
use ndarray::ArrayView3;
use std::path::Path;
use volmesh_core::{
    crop_and_pad, BoundingBox, Error, Mesh, MeshBufferTransformer, PipelineConfig, Result, Voxel,
};
use volmesh_io::{from_obj_bytes, to_obj_bytes};
use volmesh_simplification::MeshSimplifier;

/// Simplification is skipped unless more than this many faces would remain
pub const MIN_SIMPLIFIED_FACES: f64 = 4.0;

/// Whether a mesh with `face_count` faces should go through the simplifier at `ratio`
pub fn should_simplify(face_count: usize, ratio: f64) -> bool {
    face_count as f64 * ratio > MIN_SIMPLIFIED_FACES
}

/// A block cut from a larger volume.
///
/// `origin` is the full-grid `(z, y, x)` index of the block's first voxel.
#[derive(Debug, Clone, Copy)]
pub struct VolumeBlock<'a, T> {
    pub volume: ArrayView3<'a, T>,
    pub origin: [usize; 3],
}

impl<'a, T> VolumeBlock<'a, T> {
    pub fn new(volume: ArrayView3<'a, T>, origin: [usize; 3]) -> Self {
        Self { volume, origin }
    }
}

/// Sequences the stages of a single volume-to-mesh conversion
#[derive(Debug, Clone)]
pub struct MeshPipeline<E, S> {
    extractor: E,
    simplifier: S,
}

#[cfg(unix)]
impl Default for MeshPipeline<VoxelSurfaceExtractor, volmesh_simplification::PipeStreamer> {
    fn default() -> Self {
        Self::new(VoxelSurfaceExtractor, volmesh_simplification::PipeStreamer::default())
    }
}

impl<S: MeshSimplifier> MeshPipeline<VoxelSurfaceExtractor, S> {
    /// Pipeline using the bundled voxel-surface extractor
    pub fn with_simplifier(simplifier: S) -> Self {
        Self::new(VoxelSurfaceExtractor, simplifier)
    }
}

impl<E: IsosurfaceExtractor, S: MeshSimplifier> MeshPipeline<E, S> {
    pub fn new(extractor: E, simplifier: S) -> Self {
        Self {
            extractor,
            simplifier,
        }
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    pub fn simplifier(&self) -> &S {
        &self.simplifier
    }

    /// Build the transformed mesh without serializing or simplifying it.
    ///
    /// `bbox` must already be in the canonical (Z, Y, X) layout; when `None`
    /// the minimal box around the foreground is used.
    pub fn build_mesh<T: Voxel>(
        &self,
        volume: ArrayView3<'_, T>,
        bbox: Option<BoundingBox>,
        config: &PipelineConfig,
    ) -> Result<Mesh> {
        config.validate()?;

        let bbox = match bbox {
            Some(bbox) => {
                bbox.check_within(volume.shape())?;
                bbox
            }
            None => BoundingBox::from_volume(volume)?,
        };

        let mesh = self.mesh_crop(volume, &bbox, &bbox, config)?;

        tracing::info!(
            bounds = ?bbox.bounds(),
            vertices = mesh.vertex_count(),
            faces = mesh.face_count(),
            "built mesh"
        );
        Ok(mesh)
    }

    /// Mesh every block in place and join the results into one mesh.
    ///
    /// Blocks without foreground are skipped. With `stitch`, vertices that
    /// coincide where blocks meet are merged. Also returns the union of the
    /// blocks' foreground boxes in the full grid.
    pub fn build_block_mesh<T: Voxel>(
        &self,
        blocks: &[VolumeBlock<'_, T>],
        config: &PipelineConfig,
        stitch: bool,
    ) -> Result<(Mesh, BoundingBox)> {
        config.validate()?;

        let mut meshes = Vec::with_capacity(blocks.len());
        let mut union: Option<BoundingBox> = None;
        for block in blocks {
            let local = match BoundingBox::from_volume(block.volume) {
                Ok(local) => local,
                Err(Error::EmptyVolume) => continue,
                Err(e) => return Err(e),
            };
            let placed = local.translated(block.origin);
            meshes.push(self.mesh_crop(block.volume, &local, &placed, config)?);
            union = Some(union.map_or(placed, |bbox| bbox.union(&placed)));
        }
        let bbox = union.ok_or(Error::EmptyVolume)?;

        let mut mesh = Mesh::concatenate(meshes);
        if stitch {
            mesh.stitch_adjacent_faces()?;
        }

        tracing::info!(
            blocks = blocks.len(),
            bounds = ?bbox.bounds(),
            vertices = mesh.vertex_count(),
            faces = mesh.face_count(),
            "built block mesh"
        );
        Ok((mesh, bbox))
    }

    /// Crop `volume` to `crop`, extract its surface and place it as if the crop sat at `placement`
    fn mesh_crop<T: Voxel>(
        &self,
        volume: ArrayView3<'_, T>,
        crop: &BoundingBox,
        placement: &BoundingBox,
        config: &PipelineConfig,
    ) -> Result<Mesh> {
        let padded = crop_and_pad(volume, crop)?;
        if !padded.iter().any(|&filled| filled) {
            return Err(Error::EmptyVolume);
        }

        let surface = self
            .extractor
            .extract(padded.view(), config.smoothing_iterations)?;
        Ok(MeshBufferTransformer::new(config, placement).transform(&surface))
    }

    /// Simplify a mesh and parse the result back.
    ///
    /// Faces the simplifier collapsed to zero area are dropped along with any
    /// vertex left unused. Meshes below the tiny-mesh guard come back as is.
    pub fn simplify_mesh(&self, mesh: &Mesh, ratio: f64) -> Result<Mesh> {
        if !should_simplify(mesh.face_count(), ratio) {
            return Ok(mesh.clone());
        }

        let simplified = self.simplifier.simplify(&to_obj_bytes(mesh)?, ratio)?;
        let mut simplified = from_obj_bytes(&simplified)?;
        let degenerate = simplified.remove_degenerate_faces()?;
        simplified.drop_unused_vertices()?;

        tracing::info!(
            ratio,
            faces_before = mesh.face_count(),
            faces_after = simplified.face_count(),
            degenerate,
            "simplified mesh"
        );
        Ok(simplified)
    }

    /// Run the full pipeline and return the final OBJ bytes
    pub fn run<T: Voxel>(
        &self,
        volume: ArrayView3<'_, T>,
        bbox: Option<BoundingBox>,
        config: &PipelineConfig,
    ) -> Result<Vec<u8>> {
        let mesh = self.build_mesh(volume, bbox, config)?;
        let obj = to_obj_bytes(&mesh)?;

        match config.simplify_ratio {
            Some(ratio) if should_simplify(mesh.face_count(), ratio) => {
                tracing::info!(ratio, faces = mesh.face_count(), "simplifying mesh");
                let simplified = self.simplifier.simplify(&obj, ratio)?;
                tracing::info!(
                    input_bytes = obj.len(),
                    output_bytes = simplified.len(),
                    "simplification finished"
                );
                Ok(simplified)
            }
            Some(ratio) => {
                tracing::debug!(ratio, faces = mesh.face_count(), "skipping simplification");
                Ok(obj)
            }
            None => Ok(obj),
        }
    }

    /// Run the pipeline and write the result to `path`
    pub fn run_to_path<T: Voxel, P: AsRef<Path>>(
        &self,
        volume: ArrayView3<'_, T>,
        bbox: Option<BoundingBox>,
        config: &PipelineConfig,
        path: P,
    ) -> Result<()> {
        let bytes = self.run(volume, bbox, config)?;
        std::fs::write(path.as_ref(), &bytes)?;
        tracing::info!(path = %path.as_ref().display(), bytes = bytes.len(), "wrote mesh");
        Ok(())
    }
}
