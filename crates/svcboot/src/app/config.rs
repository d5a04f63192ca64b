//! Per-command customisation of the built-in commands.

use std::fmt;

use crate::resolve::ResolveOption;
use crate::service::Configurator;

/// Overrides for one built-in command.
///
/// Blank texts are ignored so the generated defaults stay in place. Supplied
/// resolve options replace the command's defaults entirely.
#[derive(Default)]
pub struct CommandConfig {
    pub(super) short_usage: Option<String>,
    pub(super) short_help: Option<String>,
    pub(super) long_help: Option<String>,
    pub(super) options: Option<Vec<ResolveOption>>,
    pub(super) configurator: Option<Box<dyn Configurator>>,
}

impl CommandConfig {
    /// Builds an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the usage line.
    #[must_use]
    pub fn short_usage(mut self, text: impl Into<String>) -> Self {
        self.short_usage = non_blank(text.into());
        self
    }

    /// Sets the one-line summary shown in the parent's usage.
    #[must_use]
    pub fn short_help(mut self, text: impl Into<String>) -> Self {
        self.short_help = non_blank(text.into());
        self
    }

    /// Sets the paragraph shown below the usage line.
    #[must_use]
    pub fn long_help(mut self, text: impl Into<String>) -> Self {
        self.long_help = non_blank(text.into());
        self
    }

    /// Replaces the command's resolve options.
    #[must_use]
    pub fn options(mut self, options: impl IntoIterator<Item = ResolveOption>) -> Self {
        let options: Vec<_> = options.into_iter().collect();
        self.options = (!options.is_empty()).then_some(options);
        self
    }

    /// Binds a configuration object to the command's flags.
    #[must_use]
    pub fn configurator(mut self, configurator: impl Configurator + 'static) -> Self {
        self.configurator = Some(Box::new(configurator));
        self
    }
}

impl fmt::Debug for CommandConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandConfig")
            .field("short_usage", &self.short_usage)
            .field("short_help", &self.short_help)
            .field("long_help", &self.long_help)
            .field("options", &self.options)
            .field("configurator", &self.configurator.is_some())
            .finish()
    }
}

fn non_blank(text: String) -> Option<String> {
    (!text.trim().is_empty()).then_some(text)
}
