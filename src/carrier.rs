//! The seam between this engine and a telephony carrier's media stream.
//! Carrier signaling and transport are out of scope here — this trait
//! is the narrow interface a concrete carrier integration implements;
//! the orchestrator depends on it instead of a specific transport.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::PipelineError;
use crate::frame::AudioFrame;

/// Implemented once per carrier integration. All methods are
/// call-scoped: one adapter instance per active call.
#[async_trait]
pub trait CarrierAdapter: Send + Sync {
    /// The carrier-side driver's own entry point for an inbound frame;
    /// a concrete implementation is expected to forward it into the
    /// orchestrator's `push_ingress`. The orchestrator never calls this
    /// itself — it's invoked by whatever drives the real carrier
    /// transport.
    async fn on_ingress(&mut self, frame: AudioFrame) -> Result<(), PipelineError>;

    /// A sender the orchestrator uses to push narrow-band egress audio
    /// back toward the carrier, one frame per playback tick.
    fn egress_sink(&self) -> mpsc::Sender<AudioFrame>;

    /// Called once by the orchestrator when the call is torn down.
    async fn on_teardown(&mut self) -> Result<(), PipelineError>;
}

/// An in-process loopback adapter for local exercise without a real
/// carrier transport: egress frames are handed to whoever holds the
/// receiver returned from `new`, which typically feeds them straight
/// back in as ingress through `OrchestratorHandle::push_ingress`.
pub struct LoopbackAdapter {
    egress_tx: mpsc::Sender<AudioFrame>,
}

impl LoopbackAdapter {
    /// Construct a loopback adapter and the receiving end of its egress
    /// channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AudioFrame>) {
        let (egress_tx, egress_rx) = mpsc::channel(capacity);
        (Self { egress_tx }, egress_rx)
    }
}

#[async_trait]
impl CarrierAdapter for LoopbackAdapter {
    async fn on_ingress(&mut self, _frame: AudioFrame) -> Result<(), PipelineError> {
        // Loopback has no separate carrier-side driver to notify from;
        // ingress is fed directly through `OrchestratorHandle::push_ingress`.
        Ok(())
    }

    fn egress_sink(&self) -> mpsc::Sender<AudioFrame> {
        self.egress_tx.clone()
    }

    async fn on_teardown(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::AudioFormat;

    #[tokio::test]
    async fn loopback_egress_sink_is_clonable_and_sendable() {
        let (adapter, mut egress_rx) = LoopbackAdapter::new(8);
        let sink = adapter.egress_sink();
        sink.send(AudioFrame::new(vec![1, 2, 3], AudioFormat::CompandedNarrow8kHz)).await.unwrap();
        let received = egress_rx.recv().await.unwrap();
        assert_eq!(received.payload, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn on_teardown_succeeds() {
        let (mut adapter, _egress_rx) = LoopbackAdapter::new(8);
        assert!(adapter.on_teardown().await.is_ok());
    }
}
