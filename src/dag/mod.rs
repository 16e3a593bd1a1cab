//! Stage graph, scheduling and execution.
//!
//! ## Architecture
//!
//! 1. **Builder** - validates stage declarations into a [`StageGraph`]
//! 2. **Scheduler** - pure functions deciding which stages may run next
//! 3. **Executor** - fans a stage out to its workers and settles it
//!
//! ## Example
//!
//! ```
//! use swarm::dag::{DagBuilder, StageSpec, compute_waves};
//!
//! let graph = DagBuilder::new(vec![
//!     StageSpec::new("a", ["coder"]),
//!     StageSpec::new("b", ["security"]).depends_on(["a"]),
//!     StageSpec::new("c", ["reviewer"]).depends_on(["a"]),
//!     StageSpec::new("d", ["tester"]).depends_on(["b", "c"]),
//! ])
//! .build()
//! .unwrap();
//!
//! // Wave 0: [a]; wave 1: [b, c]; wave 2: [d]
//! assert_eq!(compute_waves(&graph).len(), 3);
//! ```

mod builder;
mod executor;
mod scheduler;
mod stage;
mod state;

pub use builder::{DagBuilder, StageGraph, StageIndex};
pub use executor::StageExecutor;
pub use scheduler::{compute_waves, halted, runnable};
pub use stage::StageSpec;
pub use state::{RunStatus, StageRun, StageStatus};
