//! Streaming a mesh through an external simplifier over named pipes
//!
//! The simplifier is invoked as `<program> [args..] <request> <response> <ratio>`
//! where both paths are fifos in a private [`PipeWorkspace`]. No mesh bytes
//! ever touch a regular file.
//!
//! The writer thread opens the request fifo with a plain blocking open, so
//! its end is alive exactly while the child opens and drains it. Once the
//! child has been reaped, a writer still waiting in `open` is released by a
//! momentary reader and reports `BrokenPipe`.
//!
//! The calling thread holds a write end of the response fifo until the child
//! is reaped, so its non-blocking reader never sees EOF before the child has
//! attached. The optional timeout is checked on every pass of the read loop.

use crate::pipe::{open_read_nonblocking, open_write, PipeWorkspace};
use crate::MeshSimplifier;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use volmesh_core::{validate_ratio, Error, Result};

/// Executable used when none is configured
pub const DEFAULT_SIMPLIFIER: &str = "fq-mesh-simplify";

const POLL_INTERVAL_MS: u16 = 50;
const READ_CHUNK: usize = 64 * 1024;
const RELEASE_INTERVAL: Duration = Duration::from_millis(5);

/// Runs an external simplifier with its input and output on named pipes
#[derive(Debug, Clone)]
pub struct PipeStreamer {
    program: PathBuf,
    args: Vec<OsString>,
    temp_root: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Default for PipeStreamer {
    fn default() -> Self {
        Self::new(DEFAULT_SIMPLIFIER)
    }
}

impl PipeStreamer {
    /// Create a streamer for the given executable (looked up on `PATH` if bare)
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            temp_root: None,
            timeout: None,
        }
    }

    /// Arguments placed before the pipe paths and ratio
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        self
    }

    /// Create pipe workspaces under `root` instead of the system temp dir
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Kill the simplifier if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Pipe `obj` through the simplifier and return its complete output.
    ///
    /// The pipe workspace is removed before this returns, on every path.
    pub fn stream(&self, obj: &[u8], ratio: f64) -> Result<Vec<u8>> {
        validate_ratio(ratio)?;

        let workspace = PipeWorkspace::create(self.temp_root.as_deref())?;
        let started = Instant::now();
        let outcome = self.stream_through(&workspace, obj, ratio);
        let workspace_dir = workspace.path().to_path_buf();

        match (outcome, workspace.close()) {
            (Ok(output), Ok(())) => {
                tracing::info!(
                    input_bytes = obj.len(),
                    output_bytes = output.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "simplified mesh"
                );
                Ok(output)
            }
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Err(e), cleanup) => {
                if let Err(cleanup) = cleanup {
                    tracing::warn!(dir = %workspace_dir.display(), error = %cleanup, "failed to remove pipe workspace");
                }
                Err(e)
            }
        }
    }

    fn stream_through(&self, workspace: &PipeWorkspace, obj: &[u8], ratio: f64) -> Result<Vec<u8>> {
        let abandoned = AtomicBool::new(false);

        thread::scope(|scope| -> Result<Vec<u8>> {
            let request = workspace.request_path();
            let flag = &abandoned;
            let writer = thread::Builder::new()
                .name("volmesh-pipe-writer".to_string())
                .spawn_scoped(scope, move || feed_request(request, obj, flag))?;

            let outcome = self.run_child(workspace, ratio);
            // The child is gone; a writer still waiting in open() will never meet it
            abandoned.store(true, Ordering::Release);
            while !writer.is_finished() {
                release_writer(request);
                thread::sleep(RELEASE_INTERVAL);
            }
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("pipe writer thread panicked")));

            let (status, output) = match outcome {
                Ok(done) => done,
                Err(e) => {
                    if let Err(w) = &written {
                        tracing::debug!(error = %w, "request writer failed");
                    }
                    return Err(e);
                }
            };

            if !status.success() {
                let exit_code = status
                    .code()
                    .or_else(|| status.signal().map(|signal| 128 + signal))
                    .unwrap_or(-1);
                tracing::warn!(exit_code, discarded_bytes = output.len(), "simplifier failed");
                return Err(Error::Simplification {
                    exit_code,
                    writer_error: written.err().map(|e| e.to_string()),
                });
            }

            // The child reported success but never took the whole mesh
            written?;
            Ok(output)
        })
    }

    fn command(&self, workspace: &PipeWorkspace, ratio: f64) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(workspace.request_path())
            .arg(workspace.response_path())
            .arg(ratio.to_string())
            .stdin(Stdio::null());
        command
    }

    fn spawn(&self, mut command: Command) -> Result<ChildGuard> {
        tracing::debug!(?command, "spawning simplifier");
        match command.spawn() {
            Ok(child) => Ok(ChildGuard(child)),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                Err(Error::SimplifierNotFound {
                    program: self.program.display().to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Spawn the child, collect the response pipe, and reap the child
    fn run_child(&self, workspace: &PipeWorkspace, ratio: f64) -> Result<(ExitStatus, Vec<u8>)> {
        let mut child = self.spawn(self.command(workspace, ratio))?;

        let mut response = open_read_nonblocking(workspace.response_path())?;
        let mut response_hold = Some(open_write(workspace.response_path())?);

        let started = Instant::now();
        let mut exited = None;
        let mut output = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK];

        let status = loop {
            if let Some(limit) = self.timeout {
                if started.elapsed() > limit {
                    return Err(Error::SimplificationTimeout {
                        seconds: limit.as_secs_f64(),
                    });
                }
            }

            match response.read(&mut chunk) {
                Ok(0) => {
                    // The hold is a writer until the child is reaped, so EOF implies an exit
                    if let Some(exit) = exited {
                        break exit;
                    }
                }
                Ok(n) => {
                    output.extend_from_slice(&chunk[..n]);
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(e.into()),
            }

            if exited.is_none() {
                if let Some(exit) = child.try_wait()? {
                    tracing::debug!(?exit, "simplifier exited");
                    exited = Some(exit);
                    response_hold = None;
                    continue;
                }
            }

            wait_readable(&response)?;
        };

        debug_assert!(response_hold.is_none());
        Ok((status, output))
    }
}

impl MeshSimplifier for PipeStreamer {
    fn simplify(&self, obj: &[u8], ratio: f64) -> Result<Vec<u8>> {
        self.stream(obj, ratio)
    }
}

/// Write the whole request once the child has opened its end
fn feed_request(path: &Path, obj: &[u8], abandoned: &AtomicBool) -> io::Result<()> {
    let mut request = open_write(path)?;
    // Released by `release_writer` rather than the child: nothing was ever read
    if abandoned.load(Ordering::Acquire) {
        return Err(io::Error::new(
            ErrorKind::BrokenPipe,
            "simplifier exited without opening its input",
        ));
    }
    request.write_all(obj)?;
    request.flush()
}

/// Briefly attach a reader so a writer blocked in `open` can proceed
fn release_writer(path: &Path) {
    if let Err(e) = open_read_nonblocking(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to release request writer");
    }
}

fn wait_readable(file: &File) -> Result<()> {
    let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(POLL_INTERVAL_MS)) {
        Ok(_) | Err(Errno::EINTR) => Ok(()),
        Err(errno) => Err(io::Error::from(errno).into()),
    }
}

/// Kills and reaps a still-running child when dropped
struct ChildGuard(Child);

impl ChildGuard {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.0.try_wait()
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            tracing::warn!(pid = self.0.id(), "killing simplifier");
            let _ = self.0.kill();
            let _ = self.0.wait();
        }
    }
}
