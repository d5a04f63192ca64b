//! Process spawning behind an injectable seam.

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

use tracing::debug;

use super::{LaunchError, PROCESS_TARGET, open_log_file};

/// Where a spawned child writes its standard output and error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutput {
    /// Share the parent's streams.
    Inherit,
    /// Append both streams to this file.
    LogFile(PathBuf),
}

/// Everything needed to start one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments, program name excluded.
    pub args: Vec<String>,
    /// Working directory of the child.
    pub working_dir: PathBuf,
    /// Standard stream handling.
    pub output: SpawnOutput,
}

/// Exit status of a child that was waited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    code: Option<i32>,
}

impl ChildExit {
    /// Builds an exit with `code`; `None` means the child was killed by a
    /// signal.
    #[must_use]
    pub const fn new(code: Option<i32>) -> Self {
        Self { code }
    }

    /// Raw exit code, if the child exited normally.
    #[must_use]
    pub const fn code(self) -> Option<i32> {
        self.code
    }

    /// Whether the child exited with status zero.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Status to propagate as this process's own exit status.
    ///
    /// Codes outside `0..=255` and deaths by signal map to `1`.
    #[must_use]
    pub fn exit_status(self) -> u8 {
        self.code
            .and_then(|code| u8::try_from(code).ok())
            .unwrap_or(1)
    }
}

impl From<ExitStatus> for ChildExit {
    fn from(status: ExitStatus) -> Self {
        Self::new(status.code())
    }
}

/// Starts child processes.
pub trait Spawner: Send + Sync {
    /// Starts the child and returns its process id without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] when the output file cannot be opened or the
    /// child cannot be started.
    fn spawn_detached(&self, request: &SpawnRequest) -> Result<u32, LaunchError>;

    /// Starts the child and blocks until it exits.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] when the child cannot be started or waited on.
    fn spawn_and_wait(&self, request: &SpawnRequest) -> Result<ChildExit, LaunchError>;
}

/// Spawner backed by `std::process`, placing each child in a new process
/// group so terminal signals aimed at the parent do not reach it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpawner;

impl SystemSpawner {
    /// Builds a new system spawner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn command(request: &SpawnRequest) -> Result<Command, LaunchError> {
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .current_dir(&request.working_dir)
            .process_group(0);
        match &request.output {
            SpawnOutput::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            SpawnOutput::LogFile(path) => {
                let stdout = open_log_file(path)?;
                let stderr = stdout.try_clone().map_err(|source| LaunchError::LogFile {
                    path: path.clone(),
                    source,
                })?;
                command
                    .stdin(Stdio::null())
                    .stdout(Stdio::from(stdout))
                    .stderr(Stdio::from(stderr));
            }
        }
        Ok(command)
    }
}

impl Spawner for SystemSpawner {
    fn spawn_detached(&self, request: &SpawnRequest) -> Result<u32, LaunchError> {
        let child = Self::command(request)?
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: request.program.clone(),
                source,
            })?;
        debug!(target: PROCESS_TARGET, pid = child.id(), "detached child spawned");
        Ok(child.id())
    }

    fn spawn_and_wait(&self, request: &SpawnRequest) -> Result<ChildExit, LaunchError> {
        let mut child = Self::command(request)?
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: request.program.clone(),
                source,
            })?;
        debug!(target: PROCESS_TARGET, pid = child.id(), "waiting for daemon launcher child");
        child
            .wait()
            .map(ChildExit::from)
            .map_err(|source| LaunchError::Wait {
                program: request.program.clone(),
                source,
            })
    }
}
