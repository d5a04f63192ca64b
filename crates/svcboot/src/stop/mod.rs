//! Client side of the `Stop` RPC.
//!
//! The client dials the daemon's control socket, sends one [`StopRequest`]
//! and reports each [`StopResponse`] as a log line whose severity follows the
//! response code. While a graceful stop is pending, a termination signal makes
//! the client escalate on the same stream and give up waiting.
//!
//! [`StopRequest`]: svcboot_wire::StopRequest
//! [`StopResponse`]: svcboot_wire::StopResponse

mod client;
mod errors;
mod transport;

pub use self::client::{StopClient, StopOutcome, StopSummary};
pub use self::errors::StopError;
pub use self::transport::CONNECTION_TIMEOUT;

pub(crate) const STOP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::stop");
