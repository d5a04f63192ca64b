//! Command trees.
//!
//! A [`Command`] owns a flag set, optional children and an optional action.
//! Parsing walks the argument vector left to right: the first token naming a
//! child splits the vector, the prefix is resolved against this command's
//! flags and the suffix is handed to the child. Running dispatches to the
//! action of the command parsing selected.

mod errors;
mod usage;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use self::errors::{ActionError, BoxedError, CommandError};

use crate::flags::{FlagSet, FlagValues};
use crate::resolve::{Environment, ProcessEnvironment, ResolveError, ResolveOption, resolve_with};

/// Action body of a leaf command.
pub type Action = Arc<dyn Fn(&Invocation<'_>) -> Result<(), ActionError> + Send + Sync>;

/// Whether a command does something when selected.
#[derive(Clone)]
pub enum CommandKind {
    /// Pure grouping node; selecting it is a "no action" error.
    Group,
    /// Runs the action when selected.
    Leaf(Action),
}

impl fmt::Debug for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group => f.write_str("Group"),
            Self::Leaf(_) => f.write_str("Leaf(..)"),
        }
    }
}

/// Process-level context handed to every action.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    args: Vec<String>,
}

impl RunContext {
    /// Wraps the full argument vector, program name first.
    #[must_use]
    pub fn new(args: Vec<String>) -> Self {
        Self { args }
    }

    /// Full argument vector, program name first.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Program as invoked.
    #[must_use]
    pub fn program(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

/// What an action sees when it runs.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    command: &'a str,
    values: &'a FlagValues,
    context: &'a RunContext,
}

impl<'a> Invocation<'a> {
    /// Builds an invocation; mostly useful when testing actions directly.
    #[must_use]
    pub const fn new(command: &'a str, values: &'a FlagValues, context: &'a RunContext) -> Self {
        Self {
            command,
            values,
            context,
        }
    }

    /// Name of the running command.
    #[must_use]
    pub const fn command(&self) -> &'a str {
        self.command
    }

    /// Resolved flag values of the running command.
    #[must_use]
    pub const fn values(&self) -> &'a FlagValues {
        self.values
    }

    /// Positional arguments left after flag parsing.
    #[must_use]
    pub fn args(&self) -> &'a [String] {
        self.values.remaining()
    }

    /// Process-level context.
    #[must_use]
    pub const fn context(&self) -> &'a RunContext {
        self.context
    }
}

#[derive(Debug, Clone, Copy)]
enum Selected {
    This,
    Child(usize),
}

#[derive(Debug)]
struct ParseState {
    values: FlagValues,
    selected: Selected,
}

/// Node of a command tree.
pub struct Command {
    name: String,
    short_usage: Option<String>,
    short_help: Option<String>,
    long_help: Option<String>,
    flags: Option<FlagSet>,
    options: Vec<ResolveOption>,
    children: Vec<Command>,
    index: HashMap<String, usize>,
    hidden: bool,
    kind: CommandKind,
    state: Option<ParseState>,
}

impl Command {
    /// Builds a grouping command named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_usage: None,
            short_help: None,
            long_help: None,
            flags: None,
            options: Vec::new(),
            children: Vec::new(),
            index: HashMap::new(),
            hidden: false,
            kind: CommandKind::Group,
            state: None,
        }
    }

    /// Makes this a leaf running `action`.
    #[must_use]
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.kind = CommandKind::Leaf(Arc::new(action));
        self
    }

    /// Replaces the command kind.
    #[must_use]
    pub fn kind(mut self, kind: CommandKind) -> Self {
        self.kind = kind;
        self
    }

    /// One-line usage shown at the top of the help text.
    #[must_use]
    pub fn short_usage(mut self, text: impl Into<String>) -> Self {
        self.short_usage = Some(text.into());
        self
    }

    /// Summary shown in the parent's subcommand table.
    #[must_use]
    pub fn short_help(mut self, text: impl Into<String>) -> Self {
        self.short_help = Some(text.into());
        self
    }

    /// Paragraph shown under the usage line.
    #[must_use]
    pub fn long_help(mut self, text: impl Into<String>) -> Self {
        self.long_help = Some(text.into());
        self
    }

    /// Sets the flag table.
    #[must_use]
    pub fn flags(mut self, flags: FlagSet) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Transforms the flag table, creating it first if absent.
    #[must_use]
    pub fn with_flags(mut self, update: impl FnOnce(FlagSet) -> FlagSet) -> Self {
        let current = self
            .flags
            .take()
            .unwrap_or_else(|| FlagSet::new(self.name.clone()));
        self.flags = Some(update(current));
        self
    }

    /// Appends a resolution option.
    #[must_use]
    pub fn option(mut self, option: ResolveOption) -> Self {
        self.options.push(option);
        self
    }

    /// Appends several resolution options.
    #[must_use]
    pub fn options(mut self, options: impl IntoIterator<Item = ResolveOption>) -> Self {
        self.options.extend(options);
        self
    }

    /// Hides the command from its parent's help.
    #[must_use]
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Adds a child; a child with the same name is replaced.
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        if let Some(&position) = self.index.get(&child.name) {
            if let Some(slot) = self.children.get_mut(position) {
                *slot = child;
            }
        } else {
            self.index.insert(child.name.clone(), self.children.len());
            self.children.push(child);
        }
        self
    }

    /// Command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Custom usage line, if any.
    #[must_use]
    pub fn short_usage_text(&self) -> Option<&str> {
        self.short_usage.as_deref()
    }

    /// Summary shown by the parent.
    #[must_use]
    pub fn short_help_text(&self) -> Option<&str> {
        self.short_help.as_deref()
    }

    /// Whether the command is hidden from help.
    #[must_use]
    pub const fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Whether the command has an action.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self.kind, CommandKind::Leaf(_))
    }

    /// Children in registration order.
    pub fn children(&self) -> impl Iterator<Item = &Self> {
        self.children.iter()
    }

    /// Child named `name`.
    #[must_use]
    pub fn find_child(&self, name: &str) -> Option<&Self> {
        self.index
            .get(name)
            .and_then(|&position| self.children.get(position))
    }

    /// Flag table, if one has been created.
    #[must_use]
    pub const fn flag_set(&self) -> Option<&FlagSet> {
        self.flags.as_ref()
    }

    /// Resolved flag values after a parse.
    #[must_use]
    pub fn values(&self) -> Option<&FlagValues> {
        self.state.as_ref().map(|state| &state.values)
    }

    /// Whether `parse` has completed on this node.
    #[must_use]
    pub const fn is_parsed(&self) -> bool {
        self.state.is_some()
    }

    /// Terminal command chosen by the last parse.
    #[must_use]
    pub fn selected(&self) -> Option<&Self> {
        let state = self.state.as_ref()?;
        match state.selected {
            Selected::This => Some(self),
            Selected::Child(position) => self.children.get(position)?.selected(),
        }
    }

    /// Names from this command down to the selected one.
    #[must_use]
    pub fn selected_path(&self) -> Vec<&str> {
        let mut path = vec![self.name()];
        let mut current = self;
        while let Some(ParseState {
            selected: Selected::Child(position),
            ..
        }) = current.state.as_ref()
        {
            let Some(child) = current.children.get(*position) else {
                break;
            };
            path.push(child.name());
            current = child;
        }
        path
    }

    /// Rendered help text.
    #[must_use]
    pub fn usage(&self) -> String {
        usage::render(self)
    }

    /// Paragraph shown under the usage line, if any.
    #[must_use]
    pub fn long_help_text(&self) -> Option<&str> {
        self.long_help.as_deref()
    }

    /// Parses `args` (program name excluded) using the process environment.
    ///
    /// # Errors
    ///
    /// See [`Command::parse_with`].
    pub fn parse(&mut self, args: &[String]) -> Result<(), CommandError> {
        self.parse_with(args, &ProcessEnvironment)
    }

    /// Parses `args` (program name excluded) reading variables from `env`.
    ///
    /// A second call after a successful parse is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::HelpRequested`] for `-h/--help`,
    /// [`CommandError::Resolve`] when flags fail to resolve, and
    /// [`CommandError::NoAction`] when the selected command is a group.
    pub fn parse_with(&mut self, args: &[String], env: &dyn Environment) -> Result<(), CommandError> {
        if self.state.is_some() {
            return Ok(());
        }
        if self.flags.is_none() {
            self.flags = Some(FlagSet::new(self.name.clone()));
        }

        let split = args
            .iter()
            .position(|token| self.index.contains_key(token));
        let Some(position) = split else {
            let values = self.resolve_own(args, env)?;
            self.state = Some(ParseState {
                values,
                selected: Selected::This,
            });
            return self.check_action();
        };

        let (own, rest) = args.split_at(position);
        let Some((child_name, child_args)) = rest.split_first() else {
            return Ok(());
        };
        let values = self.resolve_own(own, env)?;
        let Some(&child_position) = self.index.get(child_name) else {
            return Ok(());
        };
        let Some(child) = self.children.get_mut(child_position) else {
            return Ok(());
        };
        let outcome = child.parse_with(child_args, env);
        if matches!(outcome, Ok(()) | Err(CommandError::NoAction { .. })) {
            self.state = Some(ParseState {
                values,
                selected: Selected::Child(child_position),
            });
        }
        outcome
    }

    /// Runs the selected command's action.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Unparsed`] before a parse,
    /// [`CommandError::NoAction`] for groups, [`CommandError::HelpRequested`]
    /// when the action asks for help, and [`CommandError::Action`] when it
    /// fails.
    pub fn run(&self, context: &RunContext) -> Result<(), CommandError> {
        let Some(state) = &self.state else {
            return Err(CommandError::Unparsed {
                command: self.name.clone(),
            });
        };
        match state.selected {
            Selected::Child(position) => match self.children.get(position) {
                Some(child) => child.run(context),
                None => Err(CommandError::Unparsed {
                    command: self.name.clone(),
                }),
            },
            Selected::This => match &self.kind {
                CommandKind::Group => Err(self.no_action()),
                CommandKind::Leaf(action) => {
                    action(&Invocation::new(&self.name, &state.values, context)).map_err(
                        |error| match error {
                            ActionError::Help => CommandError::HelpRequested {
                                command: self.name.clone(),
                                usage: self.usage(),
                            },
                            ActionError::Failed(source) => CommandError::Action {
                                command: self.name.clone(),
                                source,
                            },
                        },
                    )
                }
            },
        }
    }

    /// Parses then runs.
    ///
    /// # Errors
    ///
    /// Any error from [`Command::parse`] or [`Command::run`].
    pub fn parse_and_run(&mut self, args: &[String], context: &RunContext) -> Result<(), CommandError> {
        self.parse(args)?;
        self.run(context)
    }

    fn resolve_own(&self, args: &[String], env: &dyn Environment) -> Result<FlagValues, CommandError> {
        let fallback;
        let flags = match &self.flags {
            Some(flags) => flags,
            None => {
                fallback = FlagSet::new(self.name.clone());
                &fallback
            }
        };
        resolve_with(flags, args, &self.options, env).map_err(|error| match error {
            ResolveError::HelpRequested => CommandError::HelpRequested {
                command: self.name.clone(),
                usage: self.usage(),
            },
            source => CommandError::Resolve {
                command: self.name.clone(),
                source,
            },
        })
    }

    fn check_action(&self) -> Result<(), CommandError> {
        match self.kind {
            CommandKind::Group => Err(self.no_action()),
            CommandKind::Leaf(_) => Ok(()),
        }
    }

    fn no_action(&self) -> CommandError {
        CommandError::NoAction {
            command: self.name.clone(),
            usage: self.usage(),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("hidden", &self.hidden)
            .field("children", &self.children)
            .field("parsed", &self.state.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
