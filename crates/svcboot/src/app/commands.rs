//! Built-in commands: the root, `start`, the hidden internal run command and
//! `stop`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction};

use svcboot_config::{BootPaths, default_log_filter, default_log_format};

use crate::command::{ActionError, Command, Invocation};
use crate::control::{ControlPlane, LifecycleReporter};
use crate::flags::{FlagSet, FlagValues, ValueOrigin};
use crate::process::{DaemonLauncher, LaunchFiles};
use crate::resolve::{ResolveOption, parsers};
use crate::service::{Configurator, Service};
use crate::signals::SignalSource;
use crate::stop::{StopClient, StopError, StopOutcome};

use super::config::CommandConfig;
use super::BootError;

/// Name of the command that brings the service up.
pub const START_COMMAND: &str = "start";
/// Name of the command that asks a running daemon to stop.
pub const STOP_COMMAND: &str = "stop";
/// Names custom commands may not take.
pub const RESERVED_COMMANDS: [&str; 3] = [START_COMMAND, STOP_COMMAND, "build"];

pub(crate) const LOG_FILTER_FLAG: &str = "log-filter";
pub(crate) const LOG_FORMAT_FLAG: &str = "log-format";
pub(crate) const CONFIG_FLAG: &str = "config";
pub(crate) const LOG_FLAG: &str = "log";
pub(crate) const DAEMON_FLAG: &str = "daemon";
pub(crate) const FORCE_FLAG: &str = "force";

pub(super) type SignalFactory = Arc<dyn Fn() -> Arc<dyn SignalSource> + Send + Sync>;

type SharedConfigurator = Arc<Mutex<Box<dyn Configurator>>>;

/// State the built-in actions share.
pub(super) struct Runtime {
    pub(super) name: String,
    pub(super) service: Arc<dyn Service>,
    pub(super) paths: BootPaths,
    pub(super) launcher: DaemonLauncher,
    pub(super) reporter: Arc<dyn LifecycleReporter>,
    pub(super) signals: SignalFactory,
}

impl Runtime {
    fn validate(
        configurator: Option<&SharedConfigurator>,
        values: &FlagValues,
    ) -> Result<(), BootError> {
        let Some(configurator) = configurator else {
            return Ok(());
        };
        configurator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .validate(values)
            .map_err(|source| BootError::Config { source })
    }

    fn files(values: &FlagValues) -> Result<LaunchFiles, BootError> {
        let config = values.get_one::<String>(CONFIG_FLAG).unwrap_or_default();
        let log = values.get_one::<String>(LOG_FLAG).unwrap_or_default();
        Ok(LaunchFiles::absolute(&PathBuf::from(config), &PathBuf::from(log))?)
    }

    fn serve(&self) -> Result<(), BootError> {
        ControlPlane::new(
            self.name.clone(),
            self.paths.socket_endpoint(&self.name),
            Arc::clone(&self.service),
            Arc::clone(&self.reporter),
        )
        .with_signals((self.signals)())
        .serve()?;
        Ok(())
    }

    fn start(
        &self,
        invocation: &Invocation<'_>,
        configurator: Option<&SharedConfigurator>,
    ) -> Result<(), BootError> {
        let values = invocation.values();
        let files = Self::files(values)?;
        if values.get_flag(DAEMON_FLAG) {
            let exit = self
                .launcher
                .spawn_daemon(program_args(invocation), START_COMMAND, &files)?;
            return if exit.success() {
                Ok(())
            } else {
                Err(BootError::ChildExited { code: exit.code() })
            };
        }
        self.launcher.announce(&files);
        Self::validate(configurator, values)?;
        self.serve()
    }

    fn run_internal(
        &self,
        invocation: &Invocation<'_>,
        configurator: Option<&SharedConfigurator>,
    ) -> Result<(), BootError> {
        let values = invocation.values();
        let files = Self::files(values)?;
        // Only a command-line request detaches, so an inherited environment
        // cannot make every copy detach again.
        let detach = values.get_flag(DAEMON_FLAG)
            && values.origin(DAEMON_FLAG) == Some(ValueOrigin::CommandLine);
        if detach {
            self.launcher.detach(program_args(invocation), &files)?;
            return Ok(());
        }
        self.launcher.announce(&files);
        Self::validate(configurator, values)?;
        self.serve()
    }

    fn stop(
        &self,
        invocation: &Invocation<'_>,
        configurator: Option<&SharedConfigurator>,
    ) -> Result<(), BootError> {
        let values = invocation.values();
        Self::validate(configurator, values)?;
        let force = values.get_flag(FORCE_FLAG);
        let mut client = StopClient::new(self.paths.socket_endpoint(&self.name));
        if !force {
            client = client.with_signals((self.signals)());
        }
        let summary = client.stop(force)?;
        match summary.outcome {
            StopOutcome::Interrupted(signal) => Err(StopError::Interrupted { signal }.into()),
            StopOutcome::Completed | StopOutcome::Forced => Ok(()),
        }
    }
}

fn program_args<'a>(invocation: &Invocation<'a>) -> &'a [String] {
    invocation
        .context()
        .args()
        .split_first()
        .map(|(_, rest)| rest)
        .unwrap_or_default()
}

/// Resolve options applied when a command has no replacement options.
pub(super) fn environment_options(prefix: Option<&str>) -> Vec<ResolveOption> {
    vec![match prefix {
        Some(prefix) => ResolveOption::env_var_prefix(prefix),
        None => ResolveOption::env_var_no_prefix(),
    }]
}

fn daemon_options(prefix: Option<&str>) -> Vec<ResolveOption> {
    let mut options = environment_options(prefix);
    options.extend([
        ResolveOption::allow_missing_config_file(true),
        ResolveOption::config_file_flag(CONFIG_FLAG),
        ResolveOption::config_file_parser(parsers::yaml),
    ]);
    options
}

pub(super) fn root_flags(name: &str) -> FlagSet {
    FlagSet::new(name.to_owned()).args([
        Arg::new(LOG_FILTER_FLAG)
            .long(LOG_FILTER_FLAG)
            .value_name("filter")
            .default_value(default_log_filter())
            .help("log filter directive"),
        Arg::new(LOG_FORMAT_FLAG)
            .long(LOG_FORMAT_FLAG)
            .value_name("format")
            .value_parser(PossibleValuesParser::new(["compact", "json"]))
            .ignore_case(true)
            .default_value(default_log_format().to_string())
            .help("log output format (compact or json)"),
    ])
}

fn daemon_flags(command: &str, name: &str, paths: &BootPaths) -> FlagSet {
    let config = paths.config_path().display().to_string();
    let log = paths.log_path(name).display().to_string();
    FlagSet::new(command.to_owned())
        .args([
            Arg::new(CONFIG_FLAG)
                .long(CONFIG_FLAG)
                .short('c')
                .value_name("path")
                .default_value(config)
                .help("specify the config file"),
            Arg::new(LOG_FLAG)
                .long(LOG_FLAG)
                .short('l')
                .value_name("path")
                .default_value(log)
                .help("specify the log file"),
            Arg::new(DAEMON_FLAG)
                .long(DAEMON_FLAG)
                .short('d')
                .action(ArgAction::SetTrue)
                .help("run service in daemon mode"),
        ])
}

fn stop_flags(name: &str) -> FlagSet {
    FlagSet::new(STOP_COMMAND).arg(
        Arg::new(FORCE_FLAG)
            .long(FORCE_FLAG)
            .short('f')
            .action(ArgAction::SetTrue)
            .help(format!("force to stop {name} daemon")),
    )
}

fn apply_texts(command: Command, config: &CommandConfig, usage: String, help: String) -> Command {
    let command = command
        .short_usage(config.short_usage.clone().unwrap_or(usage))
        .short_help(config.short_help.clone().unwrap_or(help));
    match &config.long_help {
        Some(text) => command.long_help(text.clone()),
        None => command,
    }
}

fn take_configurator(config: &mut CommandConfig) -> Option<SharedConfigurator> {
    config
        .configurator
        .take()
        .map(|configurator| Arc::new(Mutex::new(configurator)))
}

fn register(flags: FlagSet, configurator: Option<&SharedConfigurator>) -> FlagSet {
    match configurator {
        Some(configurator) => configurator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register(flags),
        None => flags,
    }
}

/// Builds `start` and the hidden internal run command; both share the start
/// configuration.
pub(super) fn daemon_commands(
    runtime: &Arc<Runtime>,
    mut config: CommandConfig,
    prefix: Option<&str>,
) -> (Command, Command) {
    let name = runtime.name.as_str();
    let internal = runtime.launcher.internal_command().to_owned();
    let configurator = take_configurator(&mut config);
    let options = config
        .options
        .clone()
        .unwrap_or_else(|| daemon_options(prefix));

    let start = {
        let runtime = Arc::clone(runtime);
        let configurator = configurator.clone();
        Command::new(START_COMMAND).action(move |invocation| {
            runtime
                .start(invocation, configurator.as_ref())
                .map_err(ActionError::failed)
        })
    };
    let start = apply_texts(
        start,
        &config,
        format!("{name} start [flags]"),
        format!("start {name} services"),
    )
    .flags(register(
        daemon_flags(START_COMMAND, name, &runtime.paths),
        configurator.as_ref(),
    ))
    .options(options.clone());

    let run = {
        let runtime = Arc::clone(runtime);
        let configurator = configurator.clone();
        Command::new(internal.clone()).action(move |invocation| {
            runtime
                .run_internal(invocation, configurator.as_ref())
                .map_err(ActionError::failed)
        })
    };
    let run = run
        .hidden(true)
        .flags(register(
            daemon_flags(&internal, name, &runtime.paths),
            configurator.as_ref(),
        ))
        .options(options);

    (start, run)
}

pub(super) fn stop_command(
    runtime: &Arc<Runtime>,
    mut config: CommandConfig,
    prefix: Option<&str>,
) -> Command {
    let name = runtime.name.as_str();
    let configurator = take_configurator(&mut config);
    let options = config
        .options
        .clone()
        .unwrap_or_else(|| environment_options(prefix));

    let stop = {
        let runtime = Arc::clone(runtime);
        let configurator = configurator.clone();
        Command::new(STOP_COMMAND).action(move |invocation| {
            runtime
                .stop(invocation, configurator.as_ref())
                .map_err(ActionError::failed)
        })
    };
    apply_texts(
        stop,
        &config,
        format!("{name} stop [flags]"),
        format!("stop {name} daemon"),
    )
    .flags(register(stop_flags(name), configurator.as_ref()))
    .options(options)
}
