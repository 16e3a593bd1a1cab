//! Session orchestration: persistence and the pipeline driver.

mod pipeline;
mod state;
mod storage;

pub use pipeline::{PipelineConfig, PipelineEvent, PipelineOrchestrator};
pub use state::{SessionState, SessionStore, StageCounts, new_session_id};
pub use storage::{FileStorage, MemoryStorage, Storage};
