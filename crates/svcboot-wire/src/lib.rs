//! Wire messages exchanged over the svcboot control socket.
//!
//! The control plane exposes a single bidirectional stream, `Stop`: the client
//! writes [`StopRequest`] frames and the daemon answers with [`StopResponse`]
//! frames. Frames are newline-terminated JSON documents (see [`frame`]).

pub mod frame;
mod messages;

pub use frame::{FrameError, FrameReader, MAX_FRAME_BYTES, write_frame};
pub use messages::{
    COMPLETED_CODE, FORCED_CODE, GRACEFUL_CODE, ResponseKind, StopRequest, StopResponse,
};
