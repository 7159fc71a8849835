//! OBJ format support
//!
//! Only positions and triangle faces are written: a `# OBJ file` header,
//! then every `v x y z` line (7 decimal places), then every `f i j k` line
//! with 1-based indices. The reader accepts the same subset and skips
//! normals, texture coordinates, groups and comments.

use crate::{MeshReader, MeshWriter};
use itertools::Itertools;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use volmesh_core::{Error, Mesh, Point3d, Result};

/// Comment line written at the top of every serialized mesh
pub const OBJ_HEADER: &str = "# OBJ file";

pub struct ObjReader;
pub struct ObjWriter;

/// Stream a mesh into `writer` in OBJ text form
pub fn write_obj<W: Write>(mesh: &Mesh, mut writer: W) -> Result<()> {
    writeln!(writer, "{OBJ_HEADER}")?;
    for v in &mesh.vertices {
        writeln!(writer, "v {:.7} {:.7} {:.7}", v.x, v.y, v.z)?;
    }
    for [a, b, c] in &mesh.faces {
        writeln!(writer, "f {a} {b} {c}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Serialize a mesh into an in-memory OBJ byte stream
pub fn to_obj_bytes(mesh: &Mesh) -> Result<Vec<u8>> {
    // ~40 bytes per vertex line, ~20 per face line
    let mut buffer = Vec::with_capacity(16 + mesh.vertex_count() * 40 + mesh.face_count() * 20);
    write_obj(mesh, &mut buffer)?;
    Ok(buffer)
}

/// Parse an OBJ byte stream
pub fn read_obj<R: BufRead>(reader: R) -> Result<Mesh> {
    let mut mesh = Mesh::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = number + 1;
        let mut tokens = line.split_whitespace();

        match tokens.next() {
            Some("v") => {
                let (x, y, z) = tokens
                    .next_tuple()
                    .ok_or_else(|| parse_error(line_no, "vertex needs three coordinates"))?;
                mesh.vertices.push(Point3d::new(
                    parse_coordinate(x, line_no)?,
                    parse_coordinate(y, line_no)?,
                    parse_coordinate(z, line_no)?,
                ));
            }
            Some("f") => {
                let corners = tokens
                    .map(|token| resolve_index(token, mesh.vertices.len(), line_no))
                    .collect::<Result<Vec<usize>>>()?;
                if corners.len() < 3 {
                    return Err(parse_error(line_no, "face needs at least three vertices"));
                }
                // Fan-triangulate polygons
                for i in 1..corners.len() - 1 {
                    mesh.faces.push([corners[0], corners[i], corners[i + 1]]);
                }
            }
            _ => {}
        }
    }

    let vertex_count = mesh.vertices.len();
    if let Some(face) = mesh.faces.iter().find(|f| f.iter().any(|&i| i > vertex_count)) {
        return Err(Error::InvalidData(format!(
            "face {face:?} references a vertex beyond the {vertex_count} defined"
        )));
    }

    tracing::debug!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "parsed OBJ stream"
    );
    Ok(mesh)
}

/// Parse an in-memory OBJ byte stream
pub fn from_obj_bytes(bytes: &[u8]) -> Result<Mesh> {
    read_obj(bytes)
}

fn parse_error(line: usize, message: impl Into<String>) -> Error {
    Error::Parse {
        line,
        message: message.into(),
    }
}

fn parse_coordinate(token: &str, line: usize) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|e| parse_error(line, format!("bad coordinate {token:?}: {e}")))
}

/// Resolve a face token (`i`, `i/t`, `i//n`, `i/t/n`) to a 1-based vertex index
fn resolve_index(token: &str, vertex_count: usize, line: usize) -> Result<usize> {
    let position = token.split('/').next().unwrap_or(token);
    let index: i64 = position
        .parse()
        .map_err(|e| parse_error(line, format!("bad face index {token:?}: {e}")))?;

    match index {
        0 => Err(parse_error(line, "face index 0 is not valid in OBJ")),
        i if i > 0 => Ok(i as usize),
        i => {
            // Negative indices count back from the latest vertex
            let back = i.unsigned_abs() as usize;
            if back > vertex_count {
                Err(parse_error(line, format!("relative index {i} precedes the first vertex")))
            } else {
                Ok(vertex_count + 1 - back)
            }
        }
    }
}

impl MeshReader for ObjReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<Mesh> {
        let file = File::open(path)?;
        read_obj(BufReader::new(file))
    }
}

impl MeshWriter for ObjWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &Mesh, path: P) -> Result<()> {
        let file = File::create(path)?;
        write_obj(mesh, BufWriter::new(file))
    }
}
