//! Private directories holding a pair of named pipes

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use volmesh_core::{Error, Result};

/// File name of the pipe the simplifier reads its input mesh from
pub const REQUEST_PIPE: &str = "request.obj";
/// File name of the pipe the simplifier writes its output mesh to
pub const RESPONSE_PIPE: &str = "response.obj";

const DIR_PREFIX: &str = "volmesh-";

/// A temporary directory holding the request and response fifos of one call.
///
/// Dropping the workspace removes both pipes and the directory.
#[derive(Debug)]
pub struct PipeWorkspace {
    dir: TempDir,
    request: PathBuf,
    response: PathBuf,
}

impl PipeWorkspace {
    /// Create a fresh workspace under `root`, or the system temp dir when `None`
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(DIR_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|source| Error::PipeCreation {
            path: root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            source,
        })?;

        let request = make_fifo(dir.path().join(REQUEST_PIPE))?;
        let response = make_fifo(dir.path().join(RESPONSE_PIPE))?;
        tracing::debug!(dir = %dir.path().display(), "created pipe workspace");

        Ok(Self { dir, request, response })
    }

    /// Directory holding the pipes
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn request_path(&self) -> &Path {
        &self.request
    }

    pub fn response_path(&self) -> &Path {
        &self.response
    }

    /// Remove the pipes and directory, reporting any failure
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!(dir = %path.display(), "removed pipe workspace");
        Ok(())
    }
}

fn make_fifo(path: PathBuf) -> Result<PathBuf> {
    mkfifo(path.as_path(), Mode::S_IRUSR | Mode::S_IWUSR).map_err(|errno| Error::PipeCreation {
        path: path.clone(),
        source: std::io::Error::from(errno),
    })?;
    Ok(path)
}

/// Open the read end of a fifo without waiting for a writer
pub(crate) fn open_read_nonblocking(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path)
}

/// Open the write end of a fifo, blocking until a reader attaches
pub(crate) fn open_write(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).open(path)
}
