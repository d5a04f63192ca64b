//! Shared runtime defaults for svcboot programs.
//!
//! Every command of a program built on svcboot (the `start` launcher, the
//! hidden daemon run command and the `stop` client) derives its control
//! socket, log file and default config file from a [`BootPaths`] value and the
//! program name, so the processes involved in one daemon lifecycle always
//! agree on where to meet.

mod defaults;
mod logging;
mod paths;
mod socket;

pub use defaults::{
    DEFAULT_CONFIG_FILE, DEFAULT_LOG_DIR, DEFAULT_LOG_FILTER, DEFAULT_RUNTIME_DIR,
    INTERNAL_RUN_SUFFIX, default_log_filter, default_log_format, internal_command_name,
    per_user_runtime_dir,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use paths::BootPaths;
pub use socket::{SocketEndpoint, SocketPreparationError};
