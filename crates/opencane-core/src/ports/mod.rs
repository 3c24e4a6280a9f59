//! Port traits (spec §6.4): the capability-set interfaces the runtime
//! consumes from pluggable, infrastructure-specific adapters. Defined by
//! capability, not by type hierarchy (spec §9 design notes).

mod dialogue;
mod store;
mod tool_executor;
mod transcription;
mod tts;
mod vector_index;
mod vision;

pub use dialogue::{DialogueEngine, DialogueError, DialogueReply};
pub use store::{
    LifelogContext, LifelogImageRecord, ObservabilitySample, SafetyAudit, SessionSnapshot, Store,
    StoreError, TaskPush,
};
pub use tool_executor::{StepResult, ToolExecutor, ToolExecutorError};
pub use transcription::{TranscriptionError, TranscriptionProvider, TranscriptionResult};
pub use tts::{TtsError, TtsProvider};
pub use vector_index::{VectorIndex, VectorIndexError, VectorMatch};
pub use vision::{RiskLevel, VisionError, VisionProvider, VisionResult};
