//! Error types raised while resolving flag values.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by config-file parsers and the setter they drive.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Reading the file failed.
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),
    /// The file is not valid for the parser's format.
    #[error("invalid {format} syntax: {message}")]
    Syntax {
        /// Format name reported by the parser.
        format: &'static str,
        /// Parser diagnostic.
        message: String,
    },
    /// A key names a flag that is not registered.
    #[error("config file flag '{key}' is not defined")]
    UndefinedKey {
        /// Key as it appeared in the file.
        key: String,
    },
}

/// Errors raised while layering command line, environment and config file.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// `-h` or `--help` was given.
    #[error("help requested")]
    HelpRequested,
    /// The command-line arguments did not parse.
    #[error("{message}")]
    Arguments {
        /// First line of the parser diagnostic.
        message: String,
        /// Underlying parser error.
        #[source]
        source: clap::Error,
    },
    /// A value taken from the environment was rejected.
    #[error("invalid environment value: {message}")]
    Environment {
        /// First line of the parser diagnostic.
        message: String,
        /// Underlying parser error.
        #[source]
        source: clap::Error,
    },
    /// A switch or counter read from a layer could not be interpreted.
    #[error("invalid value '{value}' for flag '{flag}' from {layer}")]
    InvalidLayerValue {
        /// Long name of the flag.
        flag: String,
        /// Offending text.
        value: String,
        /// Layer the value was read from.
        layer: &'static str,
    },
    /// The config file could not be opened.
    #[error("failed to open config file '{path}': {source}")]
    OpenConfigFile {
        /// Path that was opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The config file parser or setter failed.
    #[error("error parsing config file '{path}': {source}")]
    ConfigFile {
        /// Path that was parsed.
        path: PathBuf,
        /// Parser failure.
        #[source]
        source: ConfigFileError,
    },
    /// A value taken from the config file was rejected.
    #[error("invalid value in config file '{path}': {message}")]
    ConfigValue {
        /// Path that was parsed.
        path: PathBuf,
        /// First line of the parser diagnostic.
        message: String,
        /// Underlying parser error.
        #[source]
        source: clap::Error,
    },
}

/// Reduces a `clap` diagnostic to one line without the `error:` tag.
///
/// Only the first paragraph is kept; continuation lines, such as the list of
/// missing required flags, are joined onto it.
pub(crate) fn summarise(error: &clap::Error) -> String {
    let rendered = error.render().to_string();
    let paragraph: Vec<&str> = rendered
        .lines()
        .map(str::trim)
        .take_while(|line| !line.is_empty())
        .collect();
    let joined = paragraph.join(" ");
    joined
        .strip_prefix("error: ")
        .unwrap_or(&joined)
        .trim()
        .to_owned()
}
