//! Owns one call's full pipeline and drives it from a pair of spawned
//! tasks, communicating with the rest of the process only over
//! channels — the same shape the teacher uses for its UDP/WebSocket
//! transport loops.
//!
//! Ingress (carrier → upstream) and egress (upstream → carrier) are two
//! independently progressing paths. Ingress is unbuffered: the carrier
//! is authoritative on rate, so every inbound frame is transcoded and
//! forwarded upstream immediately, with no sequencer or jitter buffer
//! in its way. Egress is buffered: the upstream-receive path stamps
//! and enqueues audio as it arrives, and a fixed-tick playback loop is
//! the only reader, gated on buffer readiness and falling back to
//! concealment on underrun.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::breathing::BreathingGenerator;
use crate::carrier::CarrierAdapter;
use crate::chunk_manager::ChunkManager;
use crate::codec;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::events::OrchestratorEvent;
use crate::frame::{AudioFormat, AudioFrame, FrameFlags};
use crate::jitter_buffer::{JitterBuffer, JitterBufferStats};
use crate::pause_manager::{PauseManager, PausePoint};
use crate::playback::PlaybackController;
use crate::sequencer::{Sequencer, SequencerStats};
use crate::upstream::{UpstreamClient, UpstreamSender};

/// Nominal playback tick period before rate adaptation.
const NOMINAL_TICK_MS: u32 = 20;
/// Bytes per millisecond of 16-bit linear PCM at 16 kHz.
const BYTES_PER_MS_WIDE: f64 = 32.0;
/// A pause this long or longer, even mid-sentence, earns a breathing burst.
const LONG_PAUSE_MS: u32 = 400;

/// Point-in-time snapshot of the whole pipeline's counters, cheap to
/// clone for a stats/metrics consumer.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub sequencer: SequencerStats,
    pub jitter_buffer: JitterBufferStats,
    /// Ingress frames transcoded but dropped because the upstream
    /// connection wasn't open.
    pub dropped_ingress_frames: u64,
}

/// Handle returned by [`PipelineOrchestrator::start`]. The orchestrator
/// itself lives inside spawned tasks; all interaction happens through
/// this handle.
pub struct OrchestratorHandle {
    ingress_tx: mpsc::Sender<AudioFrame>,
    events_rx: Option<mpsc::Receiver<OrchestratorEvent>>,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<RwLock<PipelineStats>>,
    task_handle: tokio::task::JoinHandle<()>,
    ingress_task_handle: tokio::task::JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Push one carrier-ingress frame. Never blocks: if the ingress
    /// task's queue is full the frame is rejected outright rather than
    /// stalling the carrier-driven caller.
    pub fn push_ingress(&self, frame: AudioFrame) -> Result<(), PipelineError> {
        self.ingress_tx
            .try_send(frame)
            .map_err(|_| PipelineError::SessionGone("ingress channel closed".to_string()))
    }

    /// Take ownership of the event stream. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<OrchestratorEvent>> {
        self.events_rx.take()
    }

    pub async fn stats(&self) -> PipelineStats {
        self.stats.read().await.clone()
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.ingress_task_handle.abort();
    }

    pub async fn join(self) {
        let _ = self.task_handle.await;
    }
}

pub struct PipelineOrchestrator;

impl PipelineOrchestrator {
    /// Start a new call pipeline. `carrier` is the concrete carrier
    /// integration for this call; the returned handle drives everything
    /// else.
    pub fn start(config: PipelineConfig, carrier: Box<dyn CarrierAdapter>) -> OrchestratorHandle {
        let (ingress_tx, ingress_rx) = mpsc::channel::<AudioFrame>(256);
        let (external_tx, external_rx) = mpsc::channel::<OrchestratorEvent>(256);
        let (upstream_events_tx, upstream_events_rx) = mpsc::channel::<OrchestratorEvent>(256);

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(RwLock::new(PipelineStats::default()));
        let dropped_ingress = Arc::new(AtomicU64::new(0));

        let upstream = UpstreamClient::spawn(config.upstream.clone(), upstream_events_tx);

        let ingress_task_handle = tokio::spawn(run_ingress(ingress_rx, upstream.sender(), dropped_ingress.clone()));

        let task_handle = tokio::spawn(run_pipeline(
            config,
            upstream_events_rx,
            external_tx,
            carrier,
            upstream,
            stop_flag.clone(),
            stats.clone(),
            dropped_ingress,
        ));

        OrchestratorHandle {
            ingress_tx,
            events_rx: Some(external_rx),
            stop_flag,
            stats,
            task_handle,
            ingress_task_handle,
        }
    }
}

/// The ingress task: fires on every inbound carrier frame, transcodes
/// narrow→wide, and forwards upstream without blocking or retrying.
/// Never touches the Sequencer or Jitter Buffer — the carrier is
/// authoritative on rate and this path is intentionally unbuffered.
async fn run_ingress(mut ingress_rx: mpsc::Receiver<AudioFrame>, upstream: UpstreamSender, dropped: Arc<AtomicU64>) {
    while let Some(frame) = ingress_rx.recv().await {
        let wide = codec::decode_narrow_to_wide(&frame.payload);
        if upstream.try_send(wide).is_err() {
            dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_pipeline(
    config: PipelineConfig,
    mut upstream_events_rx: mpsc::Receiver<OrchestratorEvent>,
    external_tx: mpsc::Sender<OrchestratorEvent>,
    mut carrier: Box<dyn CarrierAdapter>,
    upstream: UpstreamClient,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<RwLock<PipelineStats>>,
    dropped_ingress: Arc<AtomicU64>,
) {
    let carrier_egress = carrier.egress_sink();

    let mut sequencer = Sequencer::new();
    let mut jitter_buffer = JitterBuffer::new(config.jitter.clone());
    let mut playback = PlaybackController::new(config.playback.clone());
    let mut chunk_manager = ChunkManager::new(config.chunk.clone());
    let breathing = BreathingGenerator::new(config.breathing.clone());
    let pauses = PauseManager::new(config.pauses.clone());

    let mut pending_pauses: Vec<PausePoint> = Vec::new();
    let mut pending_breathing: Option<Vec<u8>> = None;
    let mut last_sample: i16 = 0;
    let mut audio_started = false;

    playback.start();
    let _ = external_tx.send(OrchestratorEvent::Started).await;
    info!("pipeline started");

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }

        let period_ms = playback.tick_period_ms(NOMINAL_TICK_MS);
        let period = Duration::from_millis(period_ms.round() as u64);

        tokio::select! {
            biased;

            Some(event) = upstream_events_rx.recv() => {
                handle_upstream_event(
                    event,
                    &mut chunk_manager,
                    &mut sequencer,
                    &mut jitter_buffer,
                    &breathing,
                    &pauses,
                    &mut pending_pauses,
                    &mut pending_breathing,
                    &external_tx,
                ).await;
            }

            _ = tokio::time::sleep(period) => {
                let jb_stats = jitter_buffer.stats();
                let level = if jb_stats.target_depth_ms > 0.0 {
                    (jb_stats.current_depth_ms / jb_stats.target_depth_ms).clamp(0.0, 1.0) as f32
                } else {
                    0.0
                };
                playback.update_buffer_level(level);

                if playback.is_playing() {
                    if let Some(stamped) = jitter_buffer.dequeue() {
                        audio_started = true;
                        if let Some(sample) = last_sample_of(&stamped.frame.payload) {
                            last_sample = sample;
                        }
                        emit_to_carrier(stamped.frame.payload, &mut playback, &carrier_egress).await;
                    } else if audio_started {
                        let gap_ms = period_ms.round() as u32;
                        let concealment = playback.conceal_now(last_sample, gap_ms);
                        debug!(gap_ms, "playback underrun, emitting concealment");
                        encode_and_emit(concealment, &carrier_egress).await;
                    }
                }
            }
        }

        let mut snapshot = stats.write().await;
        snapshot.sequencer = sequencer.stats();
        snapshot.jitter_buffer = jitter_buffer.stats();
        snapshot.dropped_ingress_frames = dropped_ingress.load(Ordering::Relaxed);
    }

    upstream.stop();
    let _ = carrier.on_teardown().await;
    let _ = external_tx.send(OrchestratorEvent::Stopped).await;
    info!("pipeline stopped");
}

/// Last 16-bit LE sample in a linear PCM buffer, if it holds any.
fn last_sample_of(pcm: &[u8]) -> Option<i16> {
    if pcm.len() < 2 {
        return None;
    }
    Some(i16::from_le_bytes([pcm[pcm.len() - 2], pcm[pcm.len() - 1]]))
}

#[allow(clippy::too_many_arguments)]
async fn handle_upstream_event(
    event: OrchestratorEvent,
    chunk_manager: &mut ChunkManager,
    sequencer: &mut Sequencer,
    jitter_buffer: &mut JitterBuffer,
    breathing: &BreathingGenerator,
    pauses: &PauseManager,
    pending_pauses: &mut Vec<PausePoint>,
    pending_breathing: &mut Option<Vec<u8>>,
    external_tx: &mpsc::Sender<OrchestratorEvent>,
) {
    match event {
        OrchestratorEvent::Audio(bytes) => {
            let jb_stats = jitter_buffer.stats();
            chunk_manager.observe(jb_stats.mean_gap_ms, jb_stats.jitter_ms);

            let mut chunks = chunk_manager.split(&bytes, BYTES_PER_MS_WIDE);
            if !pending_pauses.is_empty() {
                chunks = pauses.insert_pauses(chunks, pending_pauses);
                pending_pauses.clear();
            }
            if let Some(burst) = pending_breathing.take() {
                chunks.insert(0, burst);
            }

            for chunk in chunks {
                let duration_samples = (chunk.len() / 2) as u32;
                let stamped = sequencer.create(
                    AudioFrame::new(chunk, AudioFormat::LinearWide16kHz),
                    duration_samples,
                    FrameFlags::default(),
                );
                jitter_buffer.enqueue(stamped);
            }
        }
        OrchestratorEvent::LlmDone(ref text) => {
            let points = pauses.analyze(text);
            debug!(pause_points = points.len(), "analyzed pause points in completed utterance");

            let word_count = text.split_whitespace().count();
            let at_sentence_end = text.trim_end().ends_with(['.', '?', '!']);
            let at_long_pause = points.iter().any(|p| p.duration_ms >= LONG_PAUSE_MS);

            *pending_pauses = points;

            let (insert, kind) = breathing.should_insert(word_count, at_sentence_end, at_long_pause);
            if insert {
                if let Some(kind) = kind {
                    debug!(?kind, "scheduling breathing burst for next egress audio");
                    *pending_breathing = Some(breathing.generate(kind, None));
                }
            }

            let _ = external_tx.send(event).await;
        }
        OrchestratorEvent::Disconnected { .. } | OrchestratorEvent::Error { .. } => {
            // Forwarded for observability; never treated as fatal here.
            let _ = external_tx.send(event).await;
        }
        other => {
            let _ = external_tx.send(other).await;
        }
    }
}

async fn emit_to_carrier(linear_pcm: Vec<u8>, playback: &mut PlaybackController, carrier_egress: &mpsc::Sender<AudioFrame>) {
    if let Some(spliced) = playback.splice_next(linear_pcm) {
        encode_and_emit(spliced, carrier_egress).await;
    }
}

async fn encode_and_emit(linear_pcm: Vec<u8>, carrier_egress: &mpsc::Sender<AudioFrame>) {
    match codec::encode_wide_to_narrow(&linear_pcm) {
        Ok(narrow) => {
            let _ = carrier_egress.send(AudioFrame::new(narrow, AudioFormat::CompandedNarrow8kHz)).await;
        }
        Err(e) => warn!(error = %e, "failed to encode egress audio for carrier"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::LoopbackAdapter;
    use crate::config::UpstreamConfig;

    #[tokio::test]
    async fn start_emits_started_then_stop_emits_stopped() {
        let (adapter, _egress_rx) = LoopbackAdapter::new(8);
        let config = PipelineConfig {
            upstream: UpstreamConfig { base_url: "wss://127.0.0.1:1/ws".to_string(), ..UpstreamConfig::default() },
            ..PipelineConfig::default()
        };
        let mut handle = PipelineOrchestrator::start(config, Box::new(adapter));
        let mut events = handle.take_events().unwrap();

        let first = events.recv().await.unwrap();
        assert!(matches!(first, OrchestratorEvent::Started));

        handle.stop();
        // Draining until Stopped bounds the test; the select loop checks
        // stop_flag once per tick.
        loop {
            match events.recv().await {
                Some(OrchestratorEvent::Stopped) => break,
                Some(_) => continue,
                None => break,
            }
        }
    }

    #[tokio::test]
    async fn push_ingress_after_start_does_not_error() {
        let (adapter, _egress_rx) = LoopbackAdapter::new(8);
        let config = PipelineConfig {
            upstream: UpstreamConfig { base_url: "wss://127.0.0.1:1/ws".to_string(), ..UpstreamConfig::default() },
            ..PipelineConfig::default()
        };
        let handle = PipelineOrchestrator::start(config, Box::new(adapter));
        let frame = AudioFrame::new(vec![crate::codec::COMPANDED_SILENCE; 160], AudioFormat::CompandedNarrow8kHz);
        assert!(handle.push_ingress(frame).is_ok());
        handle.stop();
    }

    #[tokio::test]
    async fn upstream_audio_flows_through_sequencer_and_jitter_buffer_not_directly_to_carrier() {
        let mut sequencer = Sequencer::new();
        let mut jitter_buffer = JitterBuffer::new(crate::config::JitterConfig { min_ms: 20, max_ms: 200, target_ms: 20 });
        let mut chunk_manager = ChunkManager::new(crate::config::ChunkConfig::default());
        let breathing = BreathingGenerator::new(crate::config::BreathingConfig { enabled: false, intensity: 0.3 });
        let pauses = PauseManager::new(crate::config::PauseConfig { enabled: false, ..crate::config::PauseConfig::default() });
        let (external_tx, _external_rx) = mpsc::channel(8);
        let mut pending_pauses = Vec::new();
        let mut pending_breathing = None;

        let payload = vec![0u8; 640]; // 20ms @ 16kHz 16-bit linear
        handle_upstream_event(
            OrchestratorEvent::Audio(payload),
            &mut chunk_manager,
            &mut sequencer,
            &mut jitter_buffer,
            &breathing,
            &pauses,
            &mut pending_pauses,
            &mut pending_breathing,
            &external_tx,
        )
        .await;

        assert!(jitter_buffer.len() > 0, "audio chunks must land in the jitter buffer, not bypass it");
        assert_eq!(sequencer.stats().total, 0, "create() stamps outgoing frames without running classification");
    }
}
