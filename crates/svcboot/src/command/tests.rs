//! Unit tests for command trees.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::{Arg, ArgAction, value_parser};
use rstest::{fixture, rstest};

use super::*;
use crate::resolve::MapEnvironment;

fn args(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|token| (*token).to_owned()).collect()
}

fn serve() -> Command {
    Command::new("serve")
        .short_help("serve requests")
        .flags(
            FlagSet::new("serve").arg(
                Arg::new("port")
                    .long("port")
                    .help("listen port")
                    .value_parser(value_parser!(i64))
                    .default_value("8080"),
            ),
        )
        .action(|_| Ok(()))
}

#[fixture]
fn tree() -> Command {
    Command::new("app")
        .flags(
            FlagSet::new("app").arg(
                Arg::new("verbose")
                    .long("verbose")
                    .short('v')
                    .action(ArgAction::SetTrue),
            ),
        )
        .action(|_| Ok(()))
        .child(serve())
        .child(Command::new("secret").hidden(true).action(|_| Ok(())))
}

fn parse(command: &mut Command, tokens: &[&str]) -> Result<(), CommandError> {
    command.parse_with(&args(tokens), &MapEnvironment::new())
}

#[rstest]
fn child_token_selects_child(mut tree: Command) {
    parse(&mut tree, &["serve", "--port=9090"]).expect("parse");
    let selected = tree.selected().expect("selection");
    assert_eq!(selected.name(), "serve");
    assert_eq!(
        selected.values().and_then(|values| values.get_one::<i64>("port")),
        Some(9090)
    );
    assert_eq!(tree.selected_path(), ["app", "serve"]);
}

#[rstest]
#[case::empty(&[])]
#[case::flags_only(&["--verbose"])]
#[case::positional(&["other", "-v"])]
fn without_child_token_root_is_terminal(mut tree: Command, #[case] tokens: &[&str]) {
    parse(&mut tree, tokens).expect("parse");
    assert_eq!(tree.selected().map(Command::name), Some("app"));
}

#[rstest]
fn flags_do_not_leak_between_levels(mut tree: Command) {
    parse(&mut tree, &["--verbose", "serve", "--port", "1"]).expect("parse");
    let root = tree.values().expect("root values");
    assert!(root.get_flag("verbose"));
    assert_eq!(root.get_one::<i64>("port"), None);
    let child = tree.find_child("serve").and_then(Command::values).expect("child values");
    assert_eq!(child.get_one::<i64>("port"), Some(1));
    assert!(!child.get_flag("verbose"));
}

#[rstest]
fn parent_flag_after_child_token_is_rejected(mut tree: Command) {
    let error = parse(&mut tree, &["serve", "--verbose"]).expect_err("child has no verbose");
    assert!(
        matches!(error, CommandError::Resolve { ref command, .. } if command == "serve"),
        "{error:?}"
    );
}

#[rstest]
fn second_parse_is_a_no_op(mut tree: Command) {
    parse(&mut tree, &["serve", "--port=1"]).expect("first parse");
    parse(&mut tree, &["--bogus"]).expect("second parse is ignored");
    assert_eq!(tree.selected().map(Command::name), Some("serve"));
}

#[rstest]
fn grouping_node_reports_no_action() {
    let mut group = Command::new("tools").child(serve());
    let error = parse(&mut group, &[]).expect_err("group has no action");
    assert!(matches!(error, CommandError::NoAction { .. }), "{error:?}");
    assert!(error.usage().is_some_and(|usage| usage.contains("serve")));
    assert!(group.is_parsed());
}

#[rstest]
fn help_flag_yields_usage_of_the_right_level(mut tree: Command) {
    let error = parse(&mut tree, &["serve", "-h"]).expect_err("help");
    let CommandError::HelpRequested { command, usage } = error else {
        panic!("expected help, got {error:?}");
    };
    assert_eq!(command, "serve");
    assert!(usage.contains("--port"), "{usage}");
}

#[rstest]
fn run_requires_parse(tree: Command) {
    let error = tree.run(&RunContext::default()).expect_err("unparsed");
    assert!(matches!(error, CommandError::Unparsed { .. }));
}

#[test]
fn run_passes_residual_arguments_and_context() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let mut command = Command::new("echo").action(move |invocation| {
        assert_eq!(invocation.command(), "echo");
        assert_eq!(invocation.args(), ["a", "b"]);
        assert_eq!(invocation.context().program(), Some("prog"));
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let context = RunContext::new(args(&["prog", "a", "b"]));
    command
        .parse_with(&args(&["a", "b"]), &MapEnvironment::new())
        .expect("parse");
    command.run(&context).expect("run");
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[rstest]
#[case::help(ActionError::Help, true)]
#[case::failure(ActionError::failed("boom"), false)]
fn action_errors_are_classified(#[case] outcome: ActionError, #[case] is_help: bool) {
    let outcome = std::sync::Mutex::new(Some(outcome));
    let mut command = Command::new("job").action(move |_| {
        outcome
            .lock()
            .expect("lock outcome")
            .take()
            .map_or(Ok(()), Err)
    });
    command.parse_with(&[], &MapEnvironment::new()).expect("parse");
    let error = command.run(&RunContext::default()).expect_err("action fails");
    assert_eq!(matches!(error, CommandError::HelpRequested { .. }), is_help);
    if !is_help {
        assert_eq!(error.to_string(), "job: boom");
    }
}

#[rstest]
fn usage_lists_visible_children_and_flags(tree: Command) {
    let tree = tree.short_usage("app [flags] <subcommand>").long_help("Runs the app.");
    let usage = tree.usage();
    assert!(usage.starts_with("USAGE\n  app [flags] <subcommand>\n"), "{usage}");
    assert!(usage.contains("Runs the app."));
    assert!(usage.contains("SUBCOMMANDS\n  serve    serve requests\n"), "{usage}");
    assert!(!usage.contains("secret"));
    assert!(usage.contains("-v, --verbose"));
    assert!(usage.contains("-h, --help"));
}

#[test]
fn usage_shows_defaults_and_value_names() {
    let usage = serve().usage();
    assert!(
        usage.contains("    --port <port>    listen port (default: 8080)"),
        "{usage}"
    );
}

#[test]
fn later_child_with_same_name_replaces_earlier() {
    let tree = Command::new("root")
        .child(Command::new("x").short_help("first"))
        .child(Command::new("x").short_help("second"));
    assert_eq!(tree.children().count(), 1);
    assert_eq!(
        tree.find_child("x").and_then(Command::short_help_text),
        Some("second")
    );
}
