//! Crate-level test suites and shared doubles.

pub(crate) mod support;

mod control_plane;
mod stop_client;
