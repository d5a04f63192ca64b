//! Daemon launch sequencing.
//!
//! `start` either serves in the foreground or re-executes the current binary
//! as the hidden internal run command and waits for it. That child moves its
//! logging into the log file and, while daemon mode is still requested,
//! spawns one more detached copy with the log file as standard output and
//! error before returning. The detached grandchild is the process that
//! actually serves.

mod args;
mod errors;
mod files;
mod launcher;
mod spawner;

pub use self::args::{daemon_args, is_daemon_switch, strip_daemon_switches};
pub use self::errors::LaunchError;
pub use self::files::open_log_file;
pub use self::launcher::{DaemonLauncher, LaunchFiles};
pub use self::spawner::{ChildExit, SpawnOutput, SpawnRequest, Spawner, SystemSpawner};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
