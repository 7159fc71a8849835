//! Integration tests for volmesh-reconstruction
//!
//! These tests run whole volumes through the pipeline and, on unix, through
//! fake simplifiers driven over real named pipes.

use approx::assert_relative_eq;
use ndarray::{s, Array3};
use std::collections::HashSet;
use volmesh_core::{
    crop_and_pad, select_label, BoundingBox, Error, Mesh, PipelineConfig, Point3d, Result,
};
use volmesh_io::{from_obj_bytes, read_mesh, to_obj_bytes};
use volmesh_reconstruction::*;
use volmesh_simplification::MeshSimplifier;

/// Fails the test if the pipeline ever reaches simplification
struct UnreachableSimplifier;

impl MeshSimplifier for UnreachableSimplifier {
    fn simplify(&self, _obj: &[u8], _ratio: f64) -> Result<Vec<u8>> {
        panic!("simplifier must not be called");
    }
}

fn volume_with(shape: (usize, usize, usize), filled: &[[usize; 3]]) -> Array3<u8> {
    let mut volume = Array3::zeros(shape);
    for &index in filled {
        volume[index] = 1;
    }
    volume
}

fn bounds_of(mesh: &Mesh) -> (Point3d, Point3d) {
    let mut min = Point3d::new(f64::MAX, f64::MAX, f64::MAX);
    let mut max = Point3d::new(f64::MIN, f64::MIN, f64::MIN);
    for v in &mesh.vertices {
        for axis in 0..3 {
            min[axis] = min[axis].min(v[axis]);
            max[axis] = max[axis].max(v[axis]);
        }
    }
    (min, max)
}

fn assert_closed(mesh: &Mesh) {
    let mut directed = HashSet::new();
    for &[a, b, c] in &mesh.faces {
        for edge in [(a, b), (b, c), (c, a)] {
            assert!(directed.insert(edge), "directed edge {edge:?} repeated");
        }
    }
    for &(a, b) in &directed {
        assert!(directed.contains(&(b, a)));
    }
}

/// Every face of a convex mesh must face away from its centroid
fn assert_outward(mesh: &Mesh) {
    let centroid = mesh.centroid().unwrap();
    for (i, &[a, b, c]) in mesh.faces.iter().enumerate() {
        let center = (mesh.vertices[a - 1].coords + mesh.vertices[b - 1].coords + mesh.vertices[c - 1].coords) / 3.0;
        let normal = mesh.face_normal(i).unwrap();
        assert!(
            normal.dot(&(center - centroid.coords)) > 0.0,
            "face {i} points inward"
        );
    }
}

#[test]
fn test_single_voxel_fixture() {
    let volume = volume_with((3, 3, 3), &[[1, 1, 1]]);

    let bbox = BoundingBox::from_volume(volume.view()).unwrap();
    assert_eq!(bbox.bounds(), [1, 2, 1, 2, 1, 2]);
    assert_eq!(bbox.extent(), [1, 1, 1]);

    let padded = crop_and_pad(volume.view(), &bbox).unwrap();
    assert_eq!(padded.dim(), (3, 3, 3));
    assert_eq!(padded.iter().filter(|&&v| v).count(), 1);
    assert!(padded[[1, 1, 1]]);

    let pipeline = MeshPipeline::with_simplifier(UnreachableSimplifier);
    let config = PipelineConfig::default().with_smoothing_iterations(0);
    let mesh = pipeline.build_mesh(volume.view(), None, &config).unwrap();

    assert_eq!(mesh.vertex_count(), 8);
    assert_eq!(mesh.face_count(), 12);
    let (min, max) = bounds_of(&mesh);
    assert_relative_eq!(min, Point3d::new(1.0, 1.0, 1.0));
    assert_relative_eq!(max, Point3d::new(2.0, 2.0, 2.0));
    assert!(mesh.faces.iter().flatten().all(|&i| (1..=8).contains(&i)));
    assert_closed(&mesh);
    assert_outward(&mesh);
}

#[test]
fn test_winding_is_outward_for_anisotropic_block() {
    let mut volume = Array3::<u8>::zeros((6, 7, 8));
    volume.slice_mut(s![1..3, 2..5, 1..5]).fill(3);

    let pipeline = MeshPipeline::with_simplifier(UnreachableSimplifier);
    let config = PipelineConfig::default()
        .with_smoothing_iterations(0)
        .with_downsample_factor(2.0)
        .with_offset([5.0, -3.0, 0.5]);
    let mesh = pipeline.build_mesh(volume.view(), None, &config).unwrap();

    assert_closed(&mesh);
    assert_outward(&mesh);

    // x spans voxel columns 1..5, z spans slices 1..3
    let (min, max) = bounds_of(&mesh);
    assert_relative_eq!(min, Point3d::new(2.0 + 5.0, 4.0 - 3.0, 2.0 + 0.5));
    assert_relative_eq!(max, Point3d::new(10.0 + 5.0, 10.0 - 3.0, 6.0 + 0.5));
}

#[test]
fn test_smoothed_surface_stays_outward() {
    let mut volume = Array3::<u8>::zeros((7, 7, 7));
    volume.slice_mut(s![1..6, 1..6, 1..6]).fill(1);

    let pipeline = MeshPipeline::with_simplifier(UnreachableSimplifier);
    let mesh = pipeline
        .build_mesh(volume.view(), None, &PipelineConfig::default())
        .unwrap();

    assert_closed(&mesh);
    assert_outward(&mesh);
}

#[test]
fn test_no_ratio_returns_serialized_bytes() {
    let volume = volume_with((4, 5, 6), &[[1, 2, 3], [2, 2, 3], [2, 3, 3]]);
    let pipeline = MeshPipeline::with_simplifier(UnreachableSimplifier);
    let config = PipelineConfig::default();

    let bytes = pipeline.run(volume.view(), None, &config).unwrap();
    let mesh = pipeline.build_mesh(volume.view(), None, &config).unwrap();
    assert_eq!(bytes, to_obj_bytes(&mesh).unwrap());
}

#[test]
fn test_placement_uses_box_origin_scale_and_offset() {
    let volume = volume_with((5, 6, 7), &[[2, 3, 4]]);
    let pipeline = MeshPipeline::with_simplifier(UnreachableSimplifier);
    let config = PipelineConfig::default()
        .with_smoothing_iterations(0)
        .with_downsample_factor(2.0)
        .with_offset([10.0, 20.0, 30.0]);

    let mesh = pipeline.build_mesh(volume.view(), None, &config).unwrap();
    let (min, max) = bounds_of(&mesh);
    assert_relative_eq!(min, Point3d::new(18.0, 26.0, 34.0));
    assert_relative_eq!(max, Point3d::new(20.0, 28.0, 36.0));
}

#[test]
fn test_transform_is_linear_in_downsample_factor() {
    let volume = volume_with((4, 4, 4), &[[1, 1, 2], [2, 1, 2]]);
    let pipeline = MeshPipeline::with_simplifier(UnreachableSimplifier);
    let base = PipelineConfig::default().with_smoothing_iterations(2);

    let unit = pipeline.build_mesh(volume.view(), None, &base).unwrap();
    let scaled = pipeline
        .build_mesh(volume.view(), None, &base.clone().with_downsample_factor(3.0))
        .unwrap();

    assert_eq!(unit.faces, scaled.faces);
    for (a, b) in unit.vertices.iter().zip(&scaled.vertices) {
        assert_relative_eq!(a.coords * 3.0, b.coords, epsilon = 1e-9);
    }
}

#[test]
fn test_supplied_box_matches_computed_box() {
    let volume = volume_with((6, 6, 6), &[[2, 1, 3], [3, 1, 3]]);
    let pipeline = MeshPipeline::with_simplifier(UnreachableSimplifier);
    let config = PipelineConfig::default();

    let computed = pipeline.build_mesh(volume.view(), None, &config).unwrap();
    // A looser caller box given as (x, y, z) corners
    let loose = BoundingBox::from_xyz_corners([1, 0, 1], [5, 4, 5]);
    let supplied = pipeline
        .build_mesh(volume.view(), Some(loose), &config)
        .unwrap();

    assert_eq!(computed.faces, supplied.faces);
    for (a, b) in computed.vertices.iter().zip(&supplied.vertices) {
        assert_relative_eq!(a, b, epsilon = 1e-9);
    }
}

#[test]
fn test_supplied_box_outside_volume() {
    let volume = volume_with((3, 3, 3), &[[1, 1, 1]]);
    let pipeline = MeshPipeline::with_simplifier(UnreachableSimplifier);
    let bbox = BoundingBox::new(0..2, 0..2, 0..4);
    let err = pipeline
        .run(volume.view(), Some(bbox), &PipelineConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
}

#[test]
fn test_selected_label_is_meshed_alone() {
    let mut labels = Array3::<u32>::zeros((5, 5, 8));
    labels[[1, 1, 1]] = 7;
    labels[[3, 3, 6]] = 9;

    let mask = select_label(labels.view(), 9);
    let pipeline = MeshPipeline::with_simplifier(UnreachableSimplifier);
    let config = PipelineConfig::default().with_smoothing_iterations(0);
    let mesh = pipeline.build_mesh(mask.view(), None, &config).unwrap();

    let (min, max) = bounds_of(&mesh);
    assert_relative_eq!(min, Point3d::new(6.0, 3.0, 3.0));
    assert_relative_eq!(max, Point3d::new(7.0, 4.0, 4.0));
}

#[test]
fn test_run_to_path_writes_readable_mesh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cell.obj");
    let volume = volume_with((3, 4, 3), &[[1, 1, 1], [1, 2, 1]]);
    let pipeline = MeshPipeline::with_simplifier(UnreachableSimplifier);
    let config = PipelineConfig::default().with_smoothing_iterations(0);

    pipeline.run_to_path(volume.view(), None, &config, &path).unwrap();

    let written = read_mesh(&path).unwrap();
    let expected = pipeline.build_mesh(volume.view(), None, &config).unwrap();
    assert_eq!(written.faces, expected.faces);
    assert_eq!(written.vertex_count(), expected.vertex_count());
}

#[cfg(unix)]
mod streaming {
    use super::*;
    use std::path::{Path, PathBuf};
    use volmesh_simplification::PipeStreamer;

    /// Fake simplifier that records its pipe directory, then echoes the request
    const ECHO_WITH_DIR: &str = r##"{ echo "# dir $(dirname "$1")"; cat "$1"; } > "$2""##;

    fn script(root: &Path, body: &str) -> PipeStreamer {
        PipeStreamer::new("sh")
            .with_args(["-c", body, "fake-simplifier"])
            .with_temp_root(root)
    }

    fn is_empty_dir(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    fn recorded_dir(bytes: &[u8]) -> PathBuf {
        let text = String::from_utf8_lossy(bytes);
        let line = text
            .lines()
            .find_map(|line| line.strip_prefix("# dir "))
            .expect("fake simplifier did not record its directory");
        PathBuf::from(line)
    }

    #[test]
    fn test_simplifier_failure_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = MeshPipeline::with_simplifier(script(root.path(), "cat \"$1\" > /dev/null; exit 1"));
        let volume = volume_with((3, 3, 3), &[[1, 1, 1]]);
        let config = PipelineConfig::default().with_simplify_ratio(0.5);

        let err = pipeline.run(volume.view(), None, &config).unwrap_err();
        assert!(matches!(err, Error::Simplification { exit_code: 1, .. }));
        assert!(is_empty_dir(root.path()));

        // A retry starts from a clean slate and fails the same way
        let err = pipeline.run(volume.view(), None, &config).unwrap_err();
        assert!(matches!(err, Error::Simplification { exit_code: 1, .. }));
        assert!(is_empty_dir(root.path()));
    }

    #[test]
    fn test_passthrough_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = MeshPipeline::with_simplifier(script(root.path(), "cat \"$1\" > \"$2\""));
        let volume = volume_with((4, 4, 4), &[[1, 1, 1], [1, 2, 1], [2, 2, 2]]);
        let config = PipelineConfig::default().with_simplify_ratio(0.5);

        let bytes = pipeline.run(volume.view(), None, &config).unwrap();
        let expected = pipeline.build_mesh(volume.view(), None, &config).unwrap();
        assert_eq!(bytes, to_obj_bytes(&expected).unwrap());

        let parsed = from_obj_bytes(&bytes).unwrap();
        assert_eq!(parsed.faces, expected.faces);
        for (a, b) in parsed.vertices.iter().zip(&expected.vertices) {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }
        assert!(is_empty_dir(root.path()));
    }

    #[test]
    fn test_concurrent_runs_use_private_pipes() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = MeshPipeline::with_simplifier(script(root.path(), ECHO_WITH_DIR));
        let config = PipelineConfig::default().with_simplify_ratio(0.5);

        let small = volume_with((3, 3, 3), &[[1, 1, 1]]);
        let mut large = Array3::<u8>::zeros((12, 12, 12));
        large.slice_mut(s![1..11, 1..11, 1..11]).fill(1);

        let (small_bytes, large_bytes) = std::thread::scope(|scope| {
            let small_run = scope.spawn(|| pipeline.run(small.view(), None, &config));
            let large_run = scope.spawn(|| pipeline.run(large.view(), None, &config));
            (
                small_run.join().unwrap().unwrap(),
                large_run.join().unwrap().unwrap(),
            )
        });

        let small_dir = recorded_dir(&small_bytes);
        let large_dir = recorded_dir(&large_bytes);
        assert_ne!(small_dir, large_dir);
        assert!(small_dir.starts_with(root.path()));
        assert!(large_dir.starts_with(root.path()));
        assert!(!small_dir.exists());
        assert!(!large_dir.exists());

        let small_mesh = from_obj_bytes(&small_bytes).unwrap();
        let large_mesh = from_obj_bytes(&large_bytes).unwrap();
        assert_eq!(small_mesh.face_count(), 12);
        assert_eq!(
            large_mesh.faces,
            pipeline.build_mesh(large.view(), None, &config).unwrap().faces
        );
        assert!(is_empty_dir(root.path()));
    }

    #[test]
    fn test_missing_simplifier() {
        let root = tempfile::tempdir().unwrap();
        let streamer = PipeStreamer::new(root.path().join("no-such-simplifier")).with_temp_root(root.path());
        let pipeline = MeshPipeline::with_simplifier(streamer);
        let volume = volume_with((3, 3, 3), &[[1, 1, 1]]);
        let config = PipelineConfig::default().with_simplify_ratio(0.5);

        let err = pipeline.run(volume.view(), None, &config).unwrap_err();
        assert!(matches!(err, Error::SimplifierNotFound { .. }));
        assert!(is_empty_dir(root.path()));
    }
}
