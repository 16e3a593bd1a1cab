use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::DEFAULT_SUMMARY_WINDOW;
use crate::worker::WorkerResult;

/// Append-only ledger of recent results, bounded by `window`.
///
/// Appending beyond the window evicts the oldest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStore {
    window: usize,
    #[serde(default)]
    entries: VecDeque<WorkerResult>,
}

impl Default for SummaryStore {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_WINDOW)
    }
}

impl SummaryStore {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            entries: VecDeque::with_capacity(window.min(64)),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn append(&mut self, result: WorkerResult) {
        self.entries.push_back(result);
        while self.entries.len() > self.window {
            self.entries.pop_front();
        }
    }

    /// Up to `n` most recent entries, oldest first and newest last.
    pub fn recent(&self, n: usize) -> Vec<WorkerResult> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Every retained entry, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &WorkerResult> {
        self.entries.iter()
    }

    pub(crate) fn is_within_window(&self) -> bool {
        self.entries.len() <= self.window
    }
}
