//! Errors raised while parsing and running command trees.

use std::error::Error;

use thiserror::Error;

use crate::resolve::ResolveError;

/// Boxed error returned by command actions.
pub type BoxedError = Box<dyn Error + Send + Sync + 'static>;

/// Outcome an action reports instead of success.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action wants its command's usage printed.
    #[error("help requested")]
    Help,
    /// The action failed.
    #[error(transparent)]
    Failed(BoxedError),
}

impl ActionError {
    /// Wraps any error as a failure.
    pub fn failed(error: impl Into<BoxedError>) -> Self {
        Self::Failed(error.into())
    }
}

/// Errors raised by [`crate::command::Command`].
#[derive(Debug, Error)]
pub enum CommandError {
    /// `run` was called before a successful `parse`.
    #[error("command '{command}' has not been parsed")]
    Unparsed {
        /// Command name.
        command: String,
    },
    /// The selected command is a grouping node.
    #[error("no action defined for command '{command}'")]
    NoAction {
        /// Selected command name.
        command: String,
        /// Usage text of the selected command.
        usage: String,
    },
    /// Help was requested on the command line or by the action.
    #[error("help requested for command '{command}'")]
    HelpRequested {
        /// Command whose help was requested.
        command: String,
        /// Usage text of that command.
        usage: String,
    },
    /// Flag resolution failed.
    #[error("{command}: {source}")]
    Resolve {
        /// Command whose flags failed to resolve.
        command: String,
        /// Resolver failure.
        #[source]
        source: ResolveError,
    },
    /// The action failed.
    #[error("{command}: {source}")]
    Action {
        /// Command whose action failed.
        command: String,
        /// Action failure.
        #[source]
        source: BoxedError,
    },
}

impl CommandError {
    /// Usage text to print instead of an error, for help and no-action.
    #[must_use]
    pub fn usage(&self) -> Option<&str> {
        match self {
            Self::NoAction { usage, .. } | Self::HelpRequested { usage, .. } => Some(usage.as_str()),
            _ => None,
        }
    }
}
