pub mod bridge;
pub mod guard;
pub mod orchestrator;
pub mod stage;
pub mod traits;

pub use bridge::PipelineRunner;
pub use guard::{GuardError, StageTimeoutGuard};
pub use orchestrator::PipelineOrchestrator;
pub use stage::{Stage, StageContext, StageFailure};
