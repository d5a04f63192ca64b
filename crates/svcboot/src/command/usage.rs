//! Usage text rendering.

use clap::Arg;
use unicode_width::UnicodeWidthStr;

use super::Command;

const INDENT: &str = "  ";
const GAP: usize = 4;

pub(super) fn render(command: &Command) -> String {
    let mut out = String::new();
    out.push_str("USAGE\n");
    out.push_str(&format!(
        "{INDENT}{}\n",
        command.short_usage_text().unwrap_or(command.name())
    ));

    if let Some(long_help) = command.long_help_text() {
        out.push_str(&format!("\n{}\n", long_help.trim_end()));
    }

    let children: Vec<(String, String)> = command
        .children()
        .filter(|child| !child.is_hidden())
        .map(|child| {
            (
                child.name().to_owned(),
                child.short_help_text().unwrap_or_default().to_owned(),
            )
        })
        .collect();
    if !children.is_empty() {
        out.push_str("\nSUBCOMMANDS\n");
        write_table(&mut out, &children);
    }

    let flags: Vec<(String, String)> = command
        .flag_set()
        .map(|set| set.visible_flags().map(flag_row).collect())
        .unwrap_or_default();
    if !flags.is_empty() {
        out.push_str("\nFLAGS\n");
        write_table(&mut out, &flags);
    }
    out
}

fn flag_row(arg: &Arg) -> (String, String) {
    let mut names = match (arg.get_short(), arg.get_long()) {
        (Some(short), Some(long)) => format!("-{short}, --{long}"),
        (Some(short), None) => format!("-{short}"),
        (None, Some(long)) => format!("    --{long}"),
        (None, None) => format!("    {}", arg.get_id()),
    };
    if arg.get_action().takes_values() {
        let value_name = arg
            .get_value_names()
            .and_then(|names| names.first())
            .map_or_else(|| arg.get_id().as_str().to_owned(), ToString::to_string);
        names.push_str(&format!(" <{value_name}>"));
    }

    let mut help = arg.get_help().map(ToString::to_string).unwrap_or_default();
    let defaults: Vec<String> = arg
        .get_default_values()
        .iter()
        .map(|value| value.to_string_lossy().into_owned())
        .filter(|value| !value.is_empty())
        .collect();
    if arg.get_action().takes_values() && !defaults.is_empty() {
        if !help.is_empty() {
            help.push(' ');
        }
        help.push_str(&format!("(default: {})", defaults.join(", ")));
    }
    (names, help)
}

fn write_table(out: &mut String, rows: &[(String, String)]) {
    let width = rows
        .iter()
        .map(|(left, _)| UnicodeWidthStr::width(left.as_str()))
        .max()
        .unwrap_or(0);
    for (left, right) in rows {
        if right.is_empty() {
            out.push_str(&format!("{INDENT}{left}\n"));
            continue;
        }
        let padding = width - UnicodeWidthStr::width(left.as_str()) + GAP;
        out.push_str(&format!("{INDENT}{left}{:padding$}{right}\n", ""));
    }
}
