//! Supervises the `start` and internal run launch paths.

use std::env;
use std::path::{self, Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use super::args::{daemon_args, strip_daemon_switches};
use super::spawner::{ChildExit, SpawnOutput, SpawnRequest, Spawner};
use super::{LaunchError, PROCESS_TARGET};

const DETACHED_WORKING_DIR: &str = "/";

/// Config and log files handed to re-executed children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchFiles {
    /// Config file path.
    pub config: PathBuf,
    /// Log file path.
    pub log: PathBuf,
}

impl LaunchFiles {
    /// Builds the pair with both paths made absolute against the current
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::AbsolutePath`] when the current directory is
    /// unavailable.
    pub fn absolute(config: &Path, log: &Path) -> Result<Self, LaunchError> {
        Ok(Self {
            config: absolute(config)?,
            log: absolute(log)?,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf, LaunchError> {
    path::absolute(path).map_err(|source| LaunchError::AbsolutePath {
        path: path.to_path_buf(),
        source,
    })
}

/// Re-executes the current binary for daemon mode.
#[derive(Clone)]
pub struct DaemonLauncher {
    name: String,
    internal_command: String,
    program: Option<PathBuf>,
    spawner: Arc<dyn Spawner>,
}

impl DaemonLauncher {
    /// Builds a launcher for the program called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, spawner: Arc<dyn Spawner>) -> Self {
        let name = name.into();
        Self {
            internal_command: svcboot_config::internal_command_name(&name),
            name,
            program: None,
            spawner,
        }
    }

    /// Re-executes `program` instead of the current executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Name of the hidden internal run command.
    #[must_use]
    pub fn internal_command(&self) -> &str {
        &self.internal_command
    }

    /// Logs the banner shown before the service comes up.
    pub fn announce(&self, files: &LaunchFiles) {
        info!(
            target: PROCESS_TARGET,
            log = %files.log.display(),
            config = %files.config.display(),
            "starting {} service daemon...",
            self.name
        );
    }

    /// Spawns the internal run command for `start --daemon` and waits for it.
    ///
    /// `args` is the full argument vector without the program name.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] when the executable cannot be resolved or the
    /// child cannot be spawned or waited on.
    pub fn spawn_daemon(
        &self,
        args: &[String],
        start: &str,
        files: &LaunchFiles,
    ) -> Result<ChildExit, LaunchError> {
        let request = SpawnRequest {
            program: self.program()?,
            args: daemon_args(args, start, &self.internal_command, files),
            working_dir: PathBuf::from(DETACHED_WORKING_DIR),
            output: SpawnOutput::Inherit,
        };
        self.spawner.spawn_and_wait(&request).inspect_err(|failure| {
            error!(target: PROCESS_TARGET, error = %failure, "{} services fail to start", self.name);
        })
    }

    /// Spawns the detached copy that serves, with output in the log file.
    ///
    /// `args` is the internal run command's full argument vector without the
    /// program name; daemon switches are removed so the copy serves instead
    /// of detaching again.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] when the executable cannot be resolved or the
    /// child cannot be spawned.
    pub fn detach(&self, args: &[String], files: &LaunchFiles) -> Result<u32, LaunchError> {
        let request = SpawnRequest {
            program: self.program()?,
            args: strip_daemon_switches(args),
            working_dir: PathBuf::from(DETACHED_WORKING_DIR),
            output: SpawnOutput::LogFile(files.log.clone()),
        };
        let pid = self.spawner.spawn_detached(&request).inspect_err(|failure| {
            error!(target: PROCESS_TARGET, error = %failure, "{} services fail to start", self.name);
        })?;
        info!(target: PROCESS_TARGET, pid, "{} service daemon detached", self.name);
        Ok(pid)
    }

    fn program(&self) -> Result<PathBuf, LaunchError> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => env::current_exe().map_err(|source| LaunchError::CurrentExe { source }),
        }
    }
}

impl std::fmt::Debug for DaemonLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonLauncher")
            .field("name", &self.name)
            .field("internal_command", &self.internal_command)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::RecordingSpawner;

    fn strings(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|token| (*token).to_owned()).collect()
    }

    fn files() -> LaunchFiles {
        LaunchFiles {
            config: PathBuf::from("/etc/app/config.yaml"),
            log: PathBuf::from("/var/log/app.log"),
        }
    }

    #[test]
    fn start_spawns_internal_command_from_root_and_propagates_status() {
        let spawner = Arc::new(RecordingSpawner::exiting_with(Some(4)));
        let launcher = DaemonLauncher::new("app", spawner.clone()).with_program("/usr/bin/app");

        let exit = launcher
            .spawn_daemon(&strings(&["start", "-d"]), "start", &files())
            .expect("spawn daemon");

        assert_eq!(exit.code(), Some(4));
        let requests = spawner.requests();
        let [request] = requests.as_slice() else {
            panic!("expected one spawn, got {requests:?}");
        };
        assert_eq!(request.program, PathBuf::from("/usr/bin/app"));
        assert_eq!(request.working_dir, PathBuf::from("/"));
        assert_eq!(request.output, SpawnOutput::Inherit);
        assert_eq!(
            request.args,
            strings(&[
                "app-boot-in-daemon",
                "--daemon",
                "--config",
                "/etc/app/config.yaml",
                "--log",
                "/var/log/app.log",
            ])
        );
    }

    #[test]
    fn detach_redirects_output_and_drops_daemon_mode() {
        let spawner = Arc::new(RecordingSpawner::exiting_with(Some(0)));
        let launcher = DaemonLauncher::new("app", spawner.clone()).with_program("/usr/bin/app");
        let args = strings(&["app-boot-in-daemon", "--daemon", "--log", "/var/log/app.log"]);

        launcher.detach(&args, &files()).expect("detach");

        let requests = spawner.requests();
        let [request] = requests.as_slice() else {
            panic!("expected one spawn, got {requests:?}");
        };
        assert_eq!(
            request.args,
            strings(&["app-boot-in-daemon", "--log", "/var/log/app.log"])
        );
        assert_eq!(
            request.output,
            SpawnOutput::LogFile(PathBuf::from("/var/log/app.log"))
        );
    }

    #[test]
    fn spawn_failures_are_returned() {
        let spawner = Arc::new(RecordingSpawner::failing());
        let launcher = DaemonLauncher::new("app", spawner).with_program("/usr/bin/app");
        let error = launcher
            .spawn_daemon(&strings(&["start"]), "start", &files())
            .expect_err("spawn should fail");
        assert!(matches!(error, LaunchError::Spawn { .. }), "{error:?}");
    }

    #[test]
    fn relative_files_become_absolute() {
        let files = LaunchFiles::absolute(Path::new("config.yaml"), Path::new("/var/log/app.log"))
            .expect("absolute paths");
        assert!(files.config.is_absolute());
        assert!(files.config.ends_with("config.yaml"));
        assert_eq!(files.log, PathBuf::from("/var/log/app.log"));
    }
}
