use thiserror::Error;

/// The closed error taxonomy for the streaming engine.
///
/// Every variant names one failure kind from the error-handling design;
/// callers match on variants rather than inspecting message strings.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A codec received input violating its precondition.
    #[error("invalid audio format: {0}")]
    InvalidFormat(String),

    /// Ingress was pushed, or an upstream send was attempted, while the
    /// upstream connection is not in the `Open` state.
    #[error("upstream is not connected")]
    NotConnected,

    /// A text frame from the upstream was not valid JSON or lacked `type`.
    #[error("upstream protocol violation: {0}")]
    UpstreamProtocol(String),

    /// Socket error, unexpected close, or handshake failure on the
    /// upstream connection.
    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    /// The reconnect attempt ceiling was reached.
    #[error("reconnect attempts exhausted after {0} tries")]
    BackoffExhausted(u32),

    /// An operation was attempted on a session past its terminal status.
    #[error("session {0} is gone")]
    SessionGone(String),

    /// A `PipelineConfig` invariant was violated at construction.
    #[error("invalid pipeline configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
