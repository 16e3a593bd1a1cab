//! Multi-agent coding pipelines.
//!
//! A task is run through a graph of stages. Each stage fans out to one or more
//! workers, settles through an optional gate and persists its outcome so an
//! interrupted session can be resumed.

pub mod compaction;
pub mod config;
pub mod dag;
pub mod errors;
pub mod gates;
pub mod logging;
pub mod orchestrator;
pub mod planner;
pub mod util;
pub mod worker;
