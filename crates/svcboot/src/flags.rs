//! Flag tables backed by `clap`'s builder API.
//!
//! A [`FlagSet`] is one command's flag table. Typed parsing, defaults,
//! shorthands and repeated flags are delegated to `clap`; layering values from
//! the environment and config files is the resolver's job (see
//! [`crate::resolve`]), which produces a [`FlagValues`] snapshot.

use std::any::Any;
use std::collections::BTreeMap;

use clap::{Arg, ArgAction, ArgMatches, ColorChoice};

/// Id of the hidden positional that collects residual arguments.
pub(crate) const REMAINING_ID: &str = "__svcboot_remaining";
/// Id of the help switch registered on every flag set.
pub(crate) const HELP_ID: &str = "help";

/// Flag table owned by a single command.
#[derive(Debug, Clone)]
pub struct FlagSet {
    command: clap::Command,
}

impl FlagSet {
    /// Builds an empty flag table carrying only `-h/--help`.
    ///
    /// A single-valued flag given more than once keeps its last value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let command = clap::Command::new(name.into())
            .no_binary_name(true)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .disable_help_subcommand(true)
            .args_override_self(true)
            .color(ColorChoice::Never)
            .arg(
                Arg::new(HELP_ID)
                    .short('h')
                    .long("help")
                    .help("show help")
                    .action(ArgAction::Help),
            )
            .arg(
                Arg::new(REMAINING_ID)
                    .num_args(0..)
                    .action(ArgAction::Append)
                    .value_parser(clap::value_parser!(String))
                    .hide(true),
            );
        Self { command }
    }

    /// Registers a flag.
    ///
    /// Only flags with a long name take part in environment and config-file
    /// resolution; the long name is the key both layers are matched against.
    #[must_use]
    pub fn arg(mut self, arg: Arg) -> Self {
        self.command = self.command.arg(arg);
        self
    }

    /// Registers several flags.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = Arg>) -> Self {
        self.command = self.command.args(args);
        self
    }


    /// Name of the command owning this table.
    #[must_use]
    pub fn name(&self) -> &str {
        self.command.get_name()
    }

    /// Whether a flag with this long name is registered.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Flags visible in usage output, in registration order.
    pub fn visible_flags(&self) -> impl Iterator<Item = &Arg> {
        self.command
            .get_arguments()
            .filter(|arg| !arg.is_positional() && !arg.is_hide_set())
    }

    /// Flags that can be filled from the environment or a config file.
    pub(crate) fn layered_flags(&self) -> impl Iterator<Item = &Arg> {
        self.command.get_arguments().filter(|arg| {
            arg.get_long().is_some()
                && !matches!(
                    arg.get_action(),
                    ArgAction::Help | ArgAction::HelpShort | ArgAction::HelpLong | ArgAction::Version
                )
        })
    }

    /// Finds a layered flag by long name.
    pub(crate) fn lookup(&self, name: &str) -> Option<&Arg> {
        self.layered_flags()
            .find(|arg| arg.get_long() == Some(name))
    }

    pub(crate) fn parse(&self, tokens: &[String]) -> Result<ArgMatches, clap::Error> {
        self.command.clone().try_get_matches_from(tokens)
    }

    /// Copy of this table with every `required` constraint lifted, so that
    /// a flag missing from one layer can still be supplied by a later one.
    pub(crate) fn without_required(&self) -> Self {
        Self {
            command: self.command.clone().mut_args(|arg| arg.required(false)),
        }
    }
}

/// Where a resolved flag value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrigin {
    /// Given explicitly on the command line.
    CommandLine,
    /// Read from an environment variable.
    Environment,
    /// Read from the config file.
    ConfigFile,
    /// The flag's registered default.
    Default,
}

impl ValueOrigin {
    /// Whether the value was set by one of the resolution layers.
    #[must_use]
    pub const fn is_explicit(self) -> bool {
        !matches!(self, Self::Default)
    }
}

/// Resolved values of one flag set.
#[derive(Debug, Clone)]
pub struct FlagValues {
    matches: ArgMatches,
    origins: BTreeMap<String, ValueOrigin>,
    remaining: Vec<String>,
}

impl FlagValues {
    pub(crate) fn new(matches: ArgMatches, origins: BTreeMap<String, ValueOrigin>) -> Self {
        let remaining = matches
            .get_many::<String>(REMAINING_ID)
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        Self {
            matches,
            origins,
            remaining,
        }
    }

    /// Typed value of a single-valued flag.
    ///
    /// Returns `None` when the flag is unknown, unset without a default, or
    /// registered with a different value type.
    #[must_use]
    pub fn get_one<T>(&self, id: &str) -> Option<T>
    where
        T: Any + Clone + Send + Sync + 'static,
    {
        self.matches.try_get_one::<T>(id).ok().flatten().cloned()
    }

    /// Typed values of a repeated flag, in occurrence order.
    #[must_use]
    pub fn get_many<T>(&self, id: &str) -> Vec<T>
    where
        T: Any + Clone + Send + Sync + 'static,
    {
        self.matches
            .try_get_many::<T>(id)
            .ok()
            .flatten()
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    }

    /// State of a boolean switch; unknown switches read as `false`.
    #[must_use]
    pub fn get_flag(&self, id: &str) -> bool {
        self.get_one::<bool>(id).unwrap_or(false)
    }

    /// Occurrence count of a counter flag.
    #[must_use]
    pub fn get_count(&self, id: &str) -> u8 {
        self.get_one::<u8>(id).unwrap_or(0)
    }

    /// Raw text of a flag's first value, independent of its value type.
    #[must_use]
    pub fn get_raw(&self, id: &str) -> Option<String> {
        self.matches
            .try_get_raw(id)
            .ok()
            .flatten()
            .and_then(|mut values| values.next())
            .map(|value| value.to_string_lossy().into_owned())
    }

    /// Where the flag's value came from, if it has one.
    #[must_use]
    pub fn origin(&self, id: &str) -> Option<ValueOrigin> {
        self.origins.get(id).copied()
    }

    /// Whether a resolution layer set the flag explicitly.
    #[must_use]
    pub fn is_explicit(&self, id: &str) -> bool {
        self.origin(id).is_some_and(ValueOrigin::is_explicit)
    }

    /// Positional arguments left over after flag parsing.
    #[must_use]
    pub fn remaining(&self) -> &[String] {
        &self.remaining
    }
}
