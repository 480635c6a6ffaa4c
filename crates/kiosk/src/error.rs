//! Error types for the kiosk controller.
//!
//! Only resource faults are errors here. Protocol errors and policy
//! violations never leave the controller: the former decode to
//! [`SessionEvent::Unrecognized`](crate::SessionEvent::Unrecognized), the
//! latter are no-op transitions.

use thiserror::Error;

/// Fatal controller faults. These surface to the operator.
#[derive(Debug, Error)]
pub enum KioskError {
    /// The session timer could not be armed because no tokio runtime is
    /// running on the current thread.
    #[error("no tokio runtime available to arm the session timer")]
    NoRuntime,

    /// The dispatcher queue is gone; events can no longer be delivered.
    #[error("dispatcher queue closed")]
    QueueClosed,

    /// The dispatcher queue is full and the caller asked not to wait.
    #[error("dispatcher queue full")]
    QueueFull,

    /// The controller loop has already stopped.
    #[error("controller stopped before replying")]
    ControllerStopped,

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON for [`ControllerConfig`](crate::ControllerConfig).
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Why an inbound bus message could not be decoded into a session event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("message carries neither `msg` nor `message`")]
    MissingTag,

    #[error("unknown message tag `{0}`")]
    UnknownTag(String),

    #[error("`{tag}` is missing required field `{field}`")]
    MissingField { tag: String, field: &'static str },

    #[error("`{tag}` field `{field}` has invalid value `{value}`")]
    InvalidField {
        tag: String,
        field: &'static str,
        value: String,
    },

    #[error("frame `{0}` is not routed to the session controller")]
    UnroutedFrame(String),
}

pub type Result<T, E = KioskError> = std::result::Result<T, E>;
