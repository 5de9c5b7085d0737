pub mod communication;
pub mod orchestrator;
pub mod runner;
pub mod session;
pub mod synthesizer;

pub use communication::AgentCommunicationBus;
pub use orchestrator::{OrchestratorConfig, ReviewError, ReviewOrchestrator};
pub use runner::{AgentRunner, RunError, RunnerConfig, SettledRun};
pub use session::{PrimeOutcome, SessionBridge, SessionConfig, SessionError};
pub use synthesizer::{SynthesisError, Synthesizer, SynthesizerConfig};
