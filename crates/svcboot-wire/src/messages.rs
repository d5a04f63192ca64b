//! `Stop` request and response messages.

use serde::{Deserialize, Serialize};

/// Response code acknowledging an authoritative forced stop.
pub const FORCED_CODE: i32 = -1;
/// Response code acknowledging that a graceful stop was accepted.
pub const GRACEFUL_CODE: i32 = 0;
/// Response code the daemon uses when its shutdown sequence has finished.
pub const COMPLETED_CODE: i32 = 1;

/// Request written by the `stop` client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRequest {
    /// Skip the service's shutdown hook and close the control socket at once.
    #[serde(default)]
    pub force: bool,
}

impl StopRequest {
    /// Request for a graceful stop.
    #[must_use]
    pub const fn graceful() -> Self {
        Self { force: false }
    }

    /// Request for a forced stop.
    #[must_use]
    pub const fn forced() -> Self {
        Self { force: true }
    }
}

/// Response written by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResponse {
    /// Status code; see [`ResponseKind::from_code`].
    pub code: i32,
    /// Operator-facing message.
    pub message: String,
}

impl StopResponse {
    /// Acknowledges a forced stop.
    #[must_use]
    pub fn forced(message: impl Into<String>) -> Self {
        Self {
            code: FORCED_CODE,
            message: message.into(),
        }
    }

    /// Acknowledges a graceful stop request.
    #[must_use]
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            code: GRACEFUL_CODE,
            message: message.into(),
        }
    }

    /// Reports that the shutdown sequence has finished.
    #[must_use]
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            code: COMPLETED_CODE,
            message: message.into(),
        }
    }

    /// Classification of this response.
    #[must_use]
    pub const fn kind(&self) -> ResponseKind {
        ResponseKind::from_code(self.code)
    }
}

/// Meaning of a [`StopResponse`] code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// `-1`: the daemon is stopping without running the service's shutdown hook.
    Forced,
    /// `0`: the daemon accepted a graceful stop and is running the shutdown hook.
    Accepted,
    /// Any other code: the shutdown sequence has finished.
    Completed,
}

impl ResponseKind {
    /// Classifies a raw response code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            FORCED_CODE => Self::Forced,
            GRACEFUL_CODE => Self::Accepted,
            _ => Self::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-1, ResponseKind::Forced)]
    #[case(0, ResponseKind::Accepted)]
    #[case(1, ResponseKind::Completed)]
    #[case(42, ResponseKind::Completed)]
    #[case(-7, ResponseKind::Completed)]
    fn classifies_response_codes(#[case] code: i32, #[case] expected: ResponseKind) {
        assert_eq!(ResponseKind::from_code(code), expected);
    }

    #[test]
    fn request_force_defaults_to_false() {
        let request: StopRequest = serde_json::from_str("{}").expect("decode empty request");
        assert_eq!(request, StopRequest::graceful());
    }
}
