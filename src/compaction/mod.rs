//! Context compaction between stages.
//!
//! Workers never see each other's raw output. Each settled result is appended
//! to a bounded [`SummaryStore`] owned by the session, and the next stage gets
//! the most recent entries rendered as one-line summaries.
//!
//! ## Configuration
//!
//! Both limits can be set in `.swarm.yaml`:
//!
//! ```yaml
//! orchestrator:
//!   summary_window: 20   # entries retained per session
//!   recent_context: 5    # entries handed to the next worker
//! ```

mod store;
mod summary;

pub use store::SummaryStore;
pub use summary::{MAX_LISTED_FILES, merge_file_hints, render_context, summary_line};

/// Default number of results retained per session.
pub const DEFAULT_SUMMARY_WINDOW: usize = 20;

/// Default number of recent results handed to a worker.
pub const DEFAULT_RECENT_CONTEXT: usize = 5;
