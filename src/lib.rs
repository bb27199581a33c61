pub mod breathing;
pub mod carrier;
pub mod chunk_manager;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod jitter_buffer;
pub mod orchestrator;
pub mod pause_manager;
pub mod playback;
pub mod registry;
pub mod sequencer;
pub mod session;
pub mod upstream;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use events::OrchestratorEvent;
pub use frame::{AudioFormat, AudioFrame};
pub use orchestrator::{OrchestratorHandle, PipelineOrchestrator};
pub use registry::SessionRegistry;
pub use session::{CallSession, Direction, SessionStatus};
