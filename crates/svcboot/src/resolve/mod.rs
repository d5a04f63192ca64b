//! Layered flag resolution.
//!
//! Values are taken from the command line first, then from environment
//! variables, then from a config file. Each layer only fills flags that no
//! earlier layer set explicitly. The layers never write typed values
//! themselves: they synthesise ordinary flag tokens that are placed ahead of
//! the user's arguments and re-parsed by `clap`, so type conversion and
//! validation behave the same for every source.

mod environment;
mod errors;
pub mod parsers;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches};
use tracing::debug;

pub use self::environment::{Environment, MapEnvironment, ProcessEnvironment, env_key};
pub use self::errors::{ConfigFileError, ResolveError};
pub use self::parsers::ConfigFileParser;

use self::errors::summarise;
use crate::flags::{FlagSet, FlagValues, ValueOrigin};

const RESOLVE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::resolve");

/// A path cell shared between the resolutions of different commands.
///
/// A parent command can export its `--config` value into the cell and a child
/// command can read its config file from it.
#[derive(Debug, Clone, Default)]
pub struct SharedPath(Arc<RwLock<Option<PathBuf>>>);

impl SharedPath {
    /// Builds an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cell holding `path`.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let cell = Self::new();
        cell.set(path);
        cell
    }

    /// Stores a path.
    pub fn set(&self, path: impl Into<PathBuf>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(path.into());
    }

    /// Current path, if any.
    #[must_use]
    pub fn get(&self) -> Option<PathBuf> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// One resolution option; a list of them is folded in order.
#[derive(Clone)]
pub enum ResolveOption {
    /// Read the config file at this path.
    ConfigFile(PathBuf),
    /// Read the config file whose path is in the cell at resolution time.
    ConfigFileVia(SharedPath),
    /// Read the config file named by this flag's resolved value.
    ConfigFileFlag(String),
    /// Format used to parse the config file.
    ConfigFileParser(Arc<dyn ConfigFileParser>),
    /// Whether a missing config file is tolerated.
    AllowMissingConfigFile(bool),
    /// Enable environment lookups with this prefix.
    EnvVarPrefix(String),
    /// Enable environment lookups without a prefix.
    EnvVarNoPrefix,
    /// Split environment values on this delimiter into repeated occurrences.
    EnvVarSplit(String),
    /// Whether undefined config-file keys are skipped instead of rejected.
    IgnoreUndefined(bool),
    /// Publish this flag's resolved value into the cell.
    ExportFlag {
        /// Flag id whose raw value is published.
        flag: String,
        /// Destination cell.
        target: SharedPath,
    },
}

impl ResolveOption {
    /// See [`ResolveOption::ConfigFile`].
    #[must_use]
    pub fn config_file(path: impl Into<PathBuf>) -> Self {
        Self::ConfigFile(path.into())
    }

    /// See [`ResolveOption::ConfigFileVia`].
    #[must_use]
    pub fn config_file_via(cell: &SharedPath) -> Self {
        Self::ConfigFileVia(cell.clone())
    }

    /// See [`ResolveOption::ConfigFileFlag`].
    #[must_use]
    pub fn config_file_flag(flag: impl Into<String>) -> Self {
        Self::ConfigFileFlag(flag.into())
    }

    /// See [`ResolveOption::ConfigFileParser`].
    #[must_use]
    pub fn config_file_parser(parser: impl ConfigFileParser + 'static) -> Self {
        Self::ConfigFileParser(Arc::new(parser))
    }

    /// See [`ResolveOption::AllowMissingConfigFile`].
    #[must_use]
    pub const fn allow_missing_config_file(allow: bool) -> Self {
        Self::AllowMissingConfigFile(allow)
    }

    /// See [`ResolveOption::EnvVarPrefix`].
    #[must_use]
    pub fn env_var_prefix(prefix: impl Into<String>) -> Self {
        Self::EnvVarPrefix(prefix.into())
    }

    /// See [`ResolveOption::EnvVarNoPrefix`].
    #[must_use]
    pub const fn env_var_no_prefix() -> Self {
        Self::EnvVarNoPrefix
    }

    /// See [`ResolveOption::EnvVarSplit`].
    #[must_use]
    pub fn env_var_split(delimiter: impl Into<String>) -> Self {
        Self::EnvVarSplit(delimiter.into())
    }

    /// See [`ResolveOption::IgnoreUndefined`].
    #[must_use]
    pub const fn ignore_undefined(ignore: bool) -> Self {
        Self::IgnoreUndefined(ignore)
    }

    /// See [`ResolveOption::ExportFlag`].
    #[must_use]
    pub fn export_flag(flag: impl Into<String>, target: &SharedPath) -> Self {
        Self::ExportFlag {
            flag: flag.into(),
            target: target.clone(),
        }
    }
}

impl fmt::Debug for ResolveOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigFile(path) => f.debug_tuple("ConfigFile").field(path).finish(),
            Self::ConfigFileVia(cell) => f.debug_tuple("ConfigFileVia").field(cell).finish(),
            Self::ConfigFileFlag(flag) => f.debug_tuple("ConfigFileFlag").field(flag).finish(),
            Self::ConfigFileParser(_) => f.write_str("ConfigFileParser(..)"),
            Self::AllowMissingConfigFile(allow) => {
                f.debug_tuple("AllowMissingConfigFile").field(allow).finish()
            }
            Self::EnvVarPrefix(prefix) => f.debug_tuple("EnvVarPrefix").field(prefix).finish(),
            Self::EnvVarNoPrefix => f.write_str("EnvVarNoPrefix"),
            Self::EnvVarSplit(delimiter) => f.debug_tuple("EnvVarSplit").field(delimiter).finish(),
            Self::IgnoreUndefined(ignore) => f.debug_tuple("IgnoreUndefined").field(ignore).finish(),
            Self::ExportFlag { flag, target } => f
                .debug_struct("ExportFlag")
                .field("flag", flag)
                .field("target", target)
                .finish(),
        }
    }
}

enum ConfigSource {
    Path(PathBuf),
    Shared(SharedPath),
}

/// Settings for one resolution, folded from the option list.
#[derive(Default)]
struct ResolutionContext {
    config_source: Option<ConfigSource>,
    config_flag: Option<String>,
    parser: Option<Arc<dyn ConfigFileParser>>,
    allow_missing: bool,
    env_prefix: Option<String>,
    env_no_prefix: bool,
    env_split: Option<String>,
    ignore_undefined: bool,
    exports: Vec<(String, SharedPath)>,
}

impl ResolutionContext {
    fn from_options(options: &[ResolveOption]) -> Self {
        let mut context = Self::default();
        for option in options {
            match option {
                ResolveOption::ConfigFile(path) => {
                    context.config_source = Some(ConfigSource::Path(path.clone()));
                }
                ResolveOption::ConfigFileVia(cell) => {
                    context.config_source = Some(ConfigSource::Shared(cell.clone()));
                }
                ResolveOption::ConfigFileFlag(flag) => context.config_flag = Some(flag.clone()),
                ResolveOption::ConfigFileParser(parser) => context.parser = Some(Arc::clone(parser)),
                ResolveOption::AllowMissingConfigFile(allow) => context.allow_missing = *allow,
                ResolveOption::EnvVarPrefix(prefix) => context.env_prefix = Some(prefix.clone()),
                ResolveOption::EnvVarNoPrefix => context.env_no_prefix = true,
                ResolveOption::EnvVarSplit(delimiter) => {
                    context.env_split = Some(delimiter.clone());
                }
                ResolveOption::IgnoreUndefined(ignore) => context.ignore_undefined = *ignore,
                ResolveOption::ExportFlag { flag, target } => {
                    context.exports.push((flag.clone(), target.clone()));
                }
            }
        }
        context
    }

    /// `None` when environment lookups are disabled, otherwise the prefix.
    fn env_prefix(&self) -> Option<Option<&str>> {
        if self.env_no_prefix {
            Some(None)
        } else {
            self.env_prefix
                .as_deref()
                .filter(|prefix| !prefix.is_empty())
                .map(Some)
        }
    }

    fn config_path(&self, matches: &ArgMatches) -> Option<PathBuf> {
        let explicit = match &self.config_source {
            Some(ConfigSource::Path(path)) => Some(path.clone()),
            Some(ConfigSource::Shared(cell)) => cell.get(),
            None => None,
        };
        explicit
            .filter(|path| !path.as_os_str().is_empty())
            .or_else(|| {
                let flag = self.config_flag.as_deref()?;
                raw_value(matches, flag).map(PathBuf::from)
            })
            .filter(|path| !path.as_os_str().is_empty())
    }
}

/// Resolves `args` against `flags` using the process environment.
///
/// # Errors
///
/// Returns [`ResolveError`] when any layer fails; later layers are not
/// applied.
pub fn resolve(
    flags: &FlagSet,
    args: &[String],
    options: &[ResolveOption],
) -> Result<FlagValues, ResolveError> {
    resolve_with(flags, args, options, &ProcessEnvironment)
}

/// Resolves `args` against `flags` reading variables from `env`.
///
/// # Errors
///
/// Returns [`ResolveError`] when any layer fails; later layers are not
/// applied.
pub fn resolve_with(
    flags: &FlagSet,
    args: &[String],
    options: &[ResolveOption],
    env: &dyn Environment,
) -> Result<FlagValues, ResolveError> {
    let context = ResolutionContext::from_options(options);
    let mut layers = Layers::new(flags, args);

    let mut matches = layers.parse().map_err(|error| match error.kind() {
        clap::error::ErrorKind::DisplayHelp => ResolveError::HelpRequested,
        _ => ResolveError::Arguments {
            message: summarise(&error),
            source: error,
        },
    })?;
    layers.record_command_line(&matches);

    if let Some(prefix) = context.env_prefix()
        && layers.apply_environment(&context, prefix, env)?
    {
        matches = layers.parse().map_err(|error| ResolveError::Environment {
            message: summarise(&error),
            source: error,
        })?;
    }

    if let Some(parser) = context.parser.as_deref()
        && let Some(path) = context.config_path(&matches)
        && layers.apply_config_file(&context, parser, &path)?
    {
        matches = layers
            .parse()
            .map_err(|error| ResolveError::ConfigValue {
                message: summarise(&error),
                source: error,
                path,
            })?;
    }

    if layers.has_required() {
        matches = layers.parse_strict().map_err(|error| ResolveError::Arguments {
            message: summarise(&error),
            source: error,
        })?;
    }

    layers.record_defaults(&matches);
    for (flag, target) in &context.exports {
        if let Some(value) = raw_value(&matches, flag) {
            target.set(value);
        }
    }
    Ok(FlagValues::new(matches, layers.origins))
}

/// Working state across layers.
///
/// Intermediate parses run against a copy without `required` constraints;
/// those are checked once every layer has contributed.
struct Layers<'a> {
    flags: &'a FlagSet,
    relaxed: FlagSet,
    args: &'a [String],
    synthesised: Vec<String>,
    origins: BTreeMap<String, ValueOrigin>,
}

impl<'a> Layers<'a> {
    fn new(flags: &'a FlagSet, args: &'a [String]) -> Self {
        Self {
            flags,
            relaxed: flags.without_required(),
            args,
            synthesised: Vec::new(),
            origins: BTreeMap::new(),
        }
    }

    fn tokens(&self) -> Vec<String> {
        self.synthesised
            .iter()
            .chain(self.args)
            .cloned()
            .collect()
    }

    fn parse(&self) -> Result<ArgMatches, clap::Error> {
        self.relaxed.parse(&self.tokens())
    }

    fn parse_strict(&self) -> Result<ArgMatches, clap::Error> {
        self.flags.parse(&self.tokens())
    }

    fn has_required(&self) -> bool {
        self.flags.layered_flags().any(Arg::is_required_set)
    }

    fn is_set(&self, id: &str) -> bool {
        self.origins.contains_key(id)
    }

    fn record_command_line(&mut self, matches: &ArgMatches) {
        for arg in self.flags.layered_flags() {
            let id = arg.get_id().as_str();
            if matches.value_source(id) == Some(ValueSource::CommandLine) {
                self.origins.insert(id.to_owned(), ValueOrigin::CommandLine);
            }
        }
    }

    fn record_defaults(&mut self, matches: &ArgMatches) {
        for arg in self.flags.layered_flags() {
            let id = arg.get_id().as_str();
            if !self.is_set(id) && matches.value_source(id) == Some(ValueSource::DefaultValue) {
                self.origins.insert(id.to_owned(), ValueOrigin::Default);
            }
        }
    }

    /// Returns whether any token was synthesised.
    fn apply_environment(
        &mut self,
        context: &ResolutionContext,
        prefix: Option<&str>,
        env: &dyn Environment,
    ) -> Result<bool, ResolveError> {
        let mut applied = false;
        for arg in self.flags.layered_flags() {
            let id = arg.get_id().as_str();
            let Some(long) = arg.get_long() else { continue };
            if self.is_set(id) {
                continue;
            }
            let key = env_key(prefix, long);
            let Some(value) = env.var(&key).filter(|value| !value.is_empty()) else {
                continue;
            };
            let values: Vec<String> = match context.env_split.as_deref() {
                Some(delimiter) if !delimiter.is_empty() => {
                    value.split(delimiter).map(str::to_owned).collect()
                }
                _ => vec![value],
            };
            debug!(target: RESOLVE_TARGET, flag = long, key = %key, "flag taken from environment");
            self.synthesised
                .extend(synthesise(arg, &values, "environment variable")?);
            self.origins.insert(id.to_owned(), ValueOrigin::Environment);
            applied = true;
        }
        Ok(applied)
    }

    /// Returns whether any token was synthesised.
    fn apply_config_file(
        &mut self,
        context: &ResolutionContext,
        parser: &dyn ConfigFileParser,
        path: &Path,
    ) -> Result<bool, ResolveError> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound && context.allow_missing => {
                debug!(target: RESOLVE_TARGET, path = %path.display(), "config file missing; skipped");
                return Ok(false);
            }
            Err(source) => {
                return Err(ResolveError::OpenConfigFile {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let flags = self.flags;
        let mut collected: BTreeMap<String, (&Arg, Vec<String>)> = BTreeMap::new();
        let mut ignored = BTreeSet::new();
        parser
            .parse(&mut file, &mut |key, value| {
                let Some(arg) = flags.lookup(key) else {
                    if context.ignore_undefined {
                        ignored.insert(key.to_owned());
                        return Ok(());
                    }
                    return Err(ConfigFileError::UndefinedKey { key: key.to_owned() });
                };
                let id = arg.get_id().as_str();
                if self.origins.contains_key(id) {
                    return Ok(());
                }
                collected
                    .entry(id.to_owned())
                    .or_insert_with(|| (arg, Vec::new()))
                    .1
                    .push(value.to_owned());
                Ok(())
            })
            .map_err(|source| ResolveError::ConfigFile {
                path: path.to_path_buf(),
                source,
            })?;

        if !ignored.is_empty() {
            debug!(target: RESOLVE_TARGET, keys = ?ignored, "undefined config keys ignored");
        }
        let applied = !collected.is_empty();
        for (id, (arg, values)) in collected {
            self.synthesised
                .extend(synthesise(arg, &values, "config file")?);
            self.origins.insert(id, ValueOrigin::ConfigFile);
        }
        Ok(applied)
    }
}

/// Turns layer values into flag tokens honouring the flag's action.
fn synthesise(arg: &Arg, values: &[String], layer: &'static str) -> Result<Vec<String>, ResolveError> {
    let Some(long) = arg.get_long() else {
        return Ok(Vec::new());
    };
    let flag = format!("--{long}");
    let invalid = |value: &str| ResolveError::InvalidLayerValue {
        flag: long.to_owned(),
        value: value.to_owned(),
        layer,
    };
    let Some(last) = values.last() else {
        return Ok(Vec::new());
    };

    let tokens = match arg.get_action() {
        ArgAction::SetTrue => {
            if parse_switch(last).ok_or_else(|| invalid(last))? {
                vec![flag]
            } else {
                Vec::new()
            }
        }
        ArgAction::SetFalse => {
            if parse_switch(last).ok_or_else(|| invalid(last))? {
                Vec::new()
            } else {
                vec![flag]
            }
        }
        ArgAction::Count => {
            let count: u8 = last.trim().parse().map_err(|_| invalid(last))?;
            vec![flag; usize::from(count)]
        }
        ArgAction::Append => values
            .iter()
            .map(|value| format!("{flag}={value}"))
            .collect(),
        _ => vec![format!("{flag}={last}")],
    };
    Ok(tokens)
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" => Some(true),
        "false" | "0" | "no" | "off" | "f" => Some(false),
        _ => None,
    }
}

fn raw_value(matches: &ArgMatches, id: &str) -> Option<String> {
    matches
        .try_get_raw(id)
        .ok()
        .flatten()
        .and_then(|mut values| values.next())
        .map(|value| value.to_string_lossy().into_owned())
}
