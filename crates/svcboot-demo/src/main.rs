//! Demonstration daemon built on `svcboot`.
//!
//! Serves a heartbeat that logs once per interval. `svcboot-demo start`
//! runs it in the foreground, `start --daemon` detaches it and
//! `svcboot-demo stop` shuts it down. Set `SVCBOOT_DEMO_HOME` to keep the
//! socket, log and config file under one directory.

mod heartbeat;

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use svcboot::{ActionError, Boot, BootPaths, Command, CommandConfig};

use crate::heartbeat::{Heartbeat, IntervalSettings};

const NAME: &str = "svcboot-demo";
const HOME_ENV: &str = "SVCBOOT_DEMO_HOME";

fn paths() -> BootPaths {
    match env::var_os(HOME_ENV) {
        Some(home) => {
            let home = PathBuf::from(home);
            BootPaths::default()
                .with_runtime_dir(home.join("run"))
                .with_log_dir(home.join("log"))
                .with_config_dir(home)
        }
        None => BootPaths::per_user(NAME),
    }
}

fn version_command() -> Command {
    Command::new("version")
        .short_help("print the version")
        .action(|_| {
            writeln!(io::stdout(), "{NAME} {}", env!("CARGO_PKG_VERSION"))
                .map_err(ActionError::failed)
        })
}

fn main() -> ExitCode {
    let service = Heartbeat::new();
    let built = Boot::builder(NAME, service.clone())
        .paths(paths())
        .env_prefix("svcboot_demo")
        .root(CommandConfig::new().short_help("heartbeat demonstration daemon"))
        .start(
            CommandConfig::new()
                .long_help("Serves a heartbeat until stopped.")
                .configurator(IntervalSettings::new(service)),
        )
        .command(version_command())
        .build();
    let mut boot = match built {
        Ok(boot) => boot,
        Err(error) => {
            // Status 2 when even the error line could not be written.
            return match writeln!(io::stderr(), "error: {error}") {
                Ok(()) => ExitCode::FAILURE,
                Err(_) => ExitCode::from(2),
            };
        }
    };

    let args: Vec<String> = env::args().collect();
    boot.run(&args, &mut io::stdout(), &mut io::stderr())
}
