//! Connection Runtime workspace: Session Manager (C4), Ingest Queue (C7),
//! Vision Pipeline (C8), the Digital Task Executor's infra half (C9), and
//! the top-level Connection Runtime (C6) that ties them together with the
//! Safety/Interaction Gate (C10).

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod ingest;
pub mod session;
pub mod task;
pub mod vision;

pub use dispatcher::ConnectionRuntime;
pub use ingest::{ImageJobProcessor, IngestError, IngestMetrics, IngestQueue};
pub use session::{SeqDecision, SessionManager};
pub use task::{TaskError, TaskExecutor, TaskExecutorConfig, TaskPushSink};
pub use vision::{VisionPipeline, VisionPipelineConfig, VisionPipelineError, VisionReplySink};
