//! I/O operations for meshes
//!
//! This crate turns [`Mesh`] buffers into the plain-text OBJ byte stream
//! handed to the simplifier and written to disk, and parses such streams back.

pub mod obj;

pub use obj::{from_obj_bytes, read_obj, to_obj_bytes, write_obj, ObjReader, ObjWriter, OBJ_HEADER};

use volmesh_core::{Error, Mesh, Result};

/// Trait for reading meshes from files
pub trait MeshReader {
    fn read_mesh<P: AsRef<std::path::Path>>(path: P) -> Result<Mesh>;
}

/// Trait for writing meshes to files
pub trait MeshWriter {
    fn write_mesh<P: AsRef<std::path::Path>>(mesh: &Mesh, path: P) -> Result<()>;
}

/// Auto-detect format and read mesh
pub fn read_mesh<P: AsRef<std::path::Path>>(path: P) -> Result<Mesh> {
    let path = path.as_ref();
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("obj") => ObjReader::read_mesh(path),
        _ => Err(Error::InvalidData(format!(
            "Unsupported mesh format: {:?}",
            path.extension()
        ))),
    }
}

/// Auto-detect format and write mesh
pub fn write_mesh<P: AsRef<std::path::Path>>(mesh: &Mesh, path: P) -> Result<()> {
    let path = path.as_ref();
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("obj") => ObjWriter::write_mesh(mesh, path),
        _ => Err(Error::InvalidData(format!(
            "Unsupported mesh format: {:?}",
            path.extension()
        ))),
    }
}
