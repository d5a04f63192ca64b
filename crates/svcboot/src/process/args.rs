//! Argument vectors for re-executed daemon processes.

use super::LaunchFiles;

const END_OF_FLAGS: &str = "--";

/// Whether `token` requests daemon mode.
#[must_use]
pub fn is_daemon_switch(token: &str) -> bool {
    token == "-d" || token == "--daemon" || token.starts_with("--daemon=")
}

/// Removes daemon switches, leaving anything after `--` untouched.
#[must_use]
pub fn strip_daemon_switches(args: &[String]) -> Vec<String> {
    let (flags, tail) = split_at_end_of_flags(args);
    flags
        .iter()
        .filter(|token| !is_daemon_switch(token))
        .chain(tail)
        .cloned()
        .collect()
}

/// Arguments for the child that `start` spawns in daemon mode.
///
/// `args` excludes the program name. Tokens before the first `start` token
/// are kept, `start` itself becomes `internal --daemon`, daemon switches are
/// dropped from the rest and the absolute config and log paths are appended
/// ahead of any `--` so the child, running from `/`, opens the same files.
#[must_use]
pub fn daemon_args(args: &[String], start: &str, internal: &str, files: &LaunchFiles) -> Vec<String> {
    let (prefix, rest) = match args.iter().position(|token| token == start) {
        Some(position) => {
            let (prefix, rest) = args.split_at(position);
            (prefix, rest.split_first().map_or(rest, |(_, rest)| rest))
        }
        None => (&args[..0], args),
    };
    let (flags, tail) = split_at_end_of_flags(rest);

    let mut out = prefix.to_vec();
    out.push(internal.to_owned());
    out.push("--daemon".to_owned());
    out.extend(flags.iter().filter(|token| !is_daemon_switch(token)).cloned());
    out.push("--config".to_owned());
    out.push(files.config.display().to_string());
    out.push("--log".to_owned());
    out.push(files.log.display().to_string());
    out.extend(tail.iter().cloned());
    out
}

fn split_at_end_of_flags(args: &[String]) -> (&[String], &[String]) {
    match args.iter().position(|token| token == END_OF_FLAGS) {
        Some(position) => args.split_at(position),
        None => (args, &args[args.len()..]),
    }
}
