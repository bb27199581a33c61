//! The single typed event stream a [`crate::orchestrator::PipelineOrchestrator`]
//! emits to its caller, replacing ad-hoc per-kind callbacks.

/// One orchestrator-level event, delivered in order over one
/// `tokio::sync::mpsc` channel per call.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    Started,
    Stopped,
    Connected,
    Disconnected { code: Option<u16>, reason: String },
    Transcript(String),
    LlmToken(String),
    LlmDone(String),
    /// Egress audio ready for the carrier adapter, already encoded to
    /// the carrier's wire format.
    Audio(Vec<u8>),
    Error { kind: String, message: String },
}
