//! CLI command implementations.
//!
//! | Module    | Commands handled                     |
//! |-----------|--------------------------------------|
//! | `project` | `Init`, `Agents`, `Config`           |
//! | `run`     | `Run`, `Plan`, `Resume`              |
//! | `session` | `Status`, `Sessions`, `Summaries`    |

pub mod project;
pub mod run;
pub mod session;

pub use project::{cmd_agents, cmd_config, cmd_init};
pub use run::{RunMode, cmd_plan, cmd_resume, cmd_run};
pub use session::{cmd_sessions, cmd_status, cmd_summaries};
