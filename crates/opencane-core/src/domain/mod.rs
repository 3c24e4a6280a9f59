//! Domain types (spec §3): the data model shared by every component, owned
//! by whichever component the ownership rules in §3 name.

mod audio_segment;
mod digital_task;
mod image_job;
mod operation;
mod session;

pub use audio_segment::{AudioPacket, AudioSegment};
pub use digital_task::{DigitalTask, DigitalTaskStatus, TaskStep};
pub use image_job::{ImageJob, ImageJobStatus};
pub use operation::{Operation, OperationStatus};
pub use session::{Session, SessionState};
