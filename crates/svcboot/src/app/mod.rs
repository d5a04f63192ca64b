//! Application context wiring a service into a command-line program.
//!
//! [`Boot`] owns the command tree of one program: the root command, `start`,
//! the hidden internal run command used by daemon mode, `stop`, and any
//! custom commands. Everything the built-in actions need is held by the
//! context itself, so several programs can be assembled in one process.

mod commands;
mod config;
mod errors;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::debug;

use svcboot_config::{BootPaths, LogFormat};

use crate::command::{
    Action, ActionError, Command, CommandError, CommandKind, Invocation, RunContext,
};
use crate::control::{LifecycleReporter, StructuredLifecycleReporter};
use crate::flags::FlagValues;
use crate::process::{DaemonLauncher, Spawner, SystemSpawner, open_log_file};
use crate::resolve::{Environment, ProcessEnvironment};
use crate::service::{Configurator, Service};
use crate::signals::{SignalSource, SystemSignals};
use crate::telemetry::{self, LogSink, TelemetrySettings};

pub use self::commands::{RESERVED_COMMANDS, START_COMMAND, STOP_COMMAND};
pub use self::config::CommandConfig;
pub use self::errors::BootError;

use self::commands::{
    LOG_FILTER_FLAG, LOG_FLAG, LOG_FORMAT_FLAG, Runtime, SignalFactory, daemon_commands,
    environment_options, root_flags, stop_command,
};

const BOOT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::boot");

/// Assembles a [`Boot`].
pub struct BootBuilder {
    name: String,
    service: Arc<dyn Service>,
    paths: BootPaths,
    env_prefix: Option<String>,
    root: CommandConfig,
    root_action: Option<Action>,
    start: CommandConfig,
    stop: CommandConfig,
    commands: Vec<Command>,
    spawner: Arc<dyn Spawner>,
    program: Option<PathBuf>,
    reporter: Option<Arc<dyn LifecycleReporter>>,
    signals: Option<SignalFactory>,
}

impl BootBuilder {
    /// Directory layout for sockets, logs and the default config file.
    #[must_use]
    pub fn paths(mut self, paths: BootPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Reads environment variables as `<PREFIX>_<FLAG>` instead of `<FLAG>`.
    #[must_use]
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.env_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Customises the root command. A configurator registers root flags and
    /// validates them before any command runs.
    #[must_use]
    pub fn root(mut self, config: CommandConfig) -> Self {
        self.root = config;
        self
    }

    /// Runs `action` when the program is invoked without a subcommand.
    #[must_use]
    pub fn root_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.root_action = Some(Arc::new(action));
        self
    }

    /// Customises `start` and the internal run command.
    #[must_use]
    pub fn start(mut self, config: CommandConfig) -> Self {
        self.start = config;
        self
    }

    /// Customises `stop`.
    #[must_use]
    pub fn stop(mut self, config: CommandConfig) -> Self {
        self.stop = config;
        self
    }

    /// Adds a custom subcommand.
    #[must_use]
    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Replaces how daemon-mode children are spawned.
    #[must_use]
    pub fn spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Re-executes `program` in daemon mode instead of the current
    /// executable.
    #[must_use]
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Replaces the lifecycle reporter of the control plane.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn LifecycleReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Replaces the termination signal source used by the control plane and
    /// the stop client.
    #[must_use]
    pub fn signals<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn SignalSource> + Send + Sync + 'static,
    {
        self.signals = Some(Arc::new(factory));
        self
    }

    /// Builds the command tree.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::ReservedCommand`] when a custom command uses a
    /// built-in name.
    pub fn build(self) -> Result<Boot, BootError> {
        let internal = svcboot_config::internal_command_name(&self.name);
        if let Some(command) = self.commands.iter().find(|command| {
            let name = command.name().trim();
            RESERVED_COMMANDS.contains(&name) || name == internal
        }) {
            return Err(BootError::ReservedCommand {
                name: command.name().to_owned(),
            });
        }

        let Self {
            name,
            service,
            paths,
            env_prefix,
            mut root,
            root_action,
            start,
            stop,
            commands,
            spawner,
            program,
            reporter,
            signals,
        } = self;

        let mut launcher = DaemonLauncher::new(name.clone(), spawner);
        if let Some(program) = program {
            launcher = launcher.with_program(program);
        }
        let reporter = reporter.unwrap_or_else(|| {
            let reporter: Arc<dyn LifecycleReporter> =
                Arc::new(StructuredLifecycleReporter::new(name.clone()));
            reporter
        });
        let signals = signals.unwrap_or_else(|| {
            let factory: SignalFactory = Arc::new(system_signals);
            factory
        });
        let runtime = Arc::new(Runtime {
            reporter,
            signals,
            name,
            service,
            paths,
            launcher,
        });

        let prefix = env_prefix.as_deref();
        let root_configurator = root.configurator.take();
        let mut flags = root_flags(&runtime.name);
        if let Some(configurator) = &root_configurator {
            flags = configurator.register(flags);
        }
        let mut tree = Command::new(runtime.name.clone())
            .kind(root_action.map_or(CommandKind::Group, CommandKind::Leaf))
            .short_usage(
                root.short_usage
                    .clone()
                    .unwrap_or_else(|| format!("{} [flags] <subcommand>", runtime.name)),
            )
            .flags(flags)
            .options(
                root.options
                    .clone()
                    .unwrap_or_else(|| environment_options(prefix)),
            );
        if let Some(text) = root.short_help.clone() {
            tree = tree.short_help(text);
        }
        if let Some(text) = root.long_help.clone() {
            tree = tree.long_help(text);
        }
        for command in commands {
            tree = tree.child(command);
        }
        let (start, run) = daemon_commands(&runtime, start, prefix);
        let tree = tree
            .child(start)
            .child(run)
            .child(stop_command(&runtime, stop, prefix));

        Ok(Boot {
            root: tree,
            runtime,
            root_configurator,
        })
    }
}

impl std::fmt::Debug for BootBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootBuilder")
            .field("name", &self.name)
            .field("paths", &self.paths)
            .field("env_prefix", &self.env_prefix)
            .field("commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}

/// A program assembled around one [`Service`].
pub struct Boot {
    root: Command,
    runtime: Arc<Runtime>,
    root_configurator: Option<Box<dyn Configurator>>,
}

impl Boot {
    /// Starts assembling the program called `name` around `service`.
    #[must_use]
    pub fn builder(name: impl Into<String>, service: Arc<dyn Service>) -> BootBuilder {
        BootBuilder {
            name: name.into(),
            service,
            paths: BootPaths::default(),
            env_prefix: None,
            root: CommandConfig::default(),
            root_action: None,
            start: CommandConfig::default(),
            stop: CommandConfig::default(),
            commands: Vec::new(),
            spawner: Arc::new(SystemSpawner::new()),
            program: None,
            reporter: None,
            signals: None,
        }
    }

    /// Program name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.runtime.name
    }

    /// Root of the command tree.
    #[must_use]
    pub const fn command(&self) -> &Command {
        &self.root
    }

    /// Parses, initialises telemetry and runs the selected command.
    ///
    /// `args` is the full argument vector, program name first. Usage goes to
    /// `stdout` when help is requested or the selected command has no action;
    /// failures are reported as one line on `stderr`.
    pub fn run(&mut self, args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> ExitCode {
        ExitCode::from(self.execute(args, &ProcessEnvironment, stdout, stderr))
    }

    /// Like [`Boot::run`], reading variables from `env` and returning the
    /// raw exit status.
    pub fn execute(
        &mut self,
        args: &[String],
        env: &dyn Environment,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> u8 {
        let context = RunContext::new(args.to_vec());
        let tokens = args.split_first().map(|(_, rest)| rest).unwrap_or_default();

        if let Err(error) = self.root.parse_with(tokens, env) {
            return report(&error, stdout, stderr);
        }
        if let Err(error) = self.prepare() {
            return fail(&error, stderr);
        }
        debug!(target: BOOT_TARGET, command = ?self.root.selected_path(), "running command");
        match self.root.run(&context) {
            Ok(()) => 0,
            Err(error) => report(&error, stdout, stderr),
        }
    }

    /// Moves logging into the log file for the internal run command, installs
    /// telemetry and validates root configuration.
    fn prepare(&mut self) -> Result<(), BootError> {
        let internal = self.runtime.launcher.internal_command();
        if self.root.selected_path().last() == Some(&internal)
            && let Some(path) = self
                .root
                .find_child(internal)
                .and_then(Command::values)
                .and_then(|values| values.get_one::<String>(LOG_FLAG))
        {
            LogSink::global().redirect(open_log_file(&PathBuf::from(path))?);
        }

        let values = self.root.values();
        telemetry::initialise(&telemetry_settings(values))?;
        if let (Some(configurator), Some(values)) = (self.root_configurator.as_mut(), values) {
            configurator
                .validate(values)
                .map_err(|source| BootError::Config { source })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Boot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Boot")
            .field("name", &self.runtime.name)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn system_signals() -> Arc<dyn SignalSource> {
    Arc::new(SystemSignals::new())
}

fn telemetry_settings(values: Option<&FlagValues>) -> TelemetrySettings {
    let defaults = TelemetrySettings::default();
    let Some(values) = values else {
        return defaults;
    };
    let filter = values
        .get_one::<String>(LOG_FILTER_FLAG)
        .unwrap_or_else(|| defaults.filter().to_owned());
    let format = values
        .get_one::<String>(LOG_FORMAT_FLAG)
        .and_then(|format| format.parse::<LogFormat>().ok())
        .unwrap_or(defaults.format());
    TelemetrySettings::new(filter, format)
}

fn report(error: &CommandError, stdout: &mut dyn Write, stderr: &mut dyn Write) -> u8 {
    if let Some(usage) = error.usage() {
        if let Err(write_error) = write!(stdout, "{usage}") {
            debug!(target: BOOT_TARGET, error = %write_error, "failed to write usage");
        }
        return 0;
    }
    if let CommandError::Action { source, .. } = error
        && let Some(BootError::ChildExited { code }) = source.downcast_ref::<BootError>()
    {
        return crate::process::ChildExit::new(*code).exit_status();
    }
    fail(error, stderr)
}

fn fail(error: &dyn std::error::Error, stderr: &mut dyn Write) -> u8 {
    let line = error.to_string().replace('\n', " ");
    if let Err(write_error) = writeln!(stderr, "error: {line}") {
        debug!(target: BOOT_TARGET, error = %write_error, "failed to write error line");
    }
    1
}
