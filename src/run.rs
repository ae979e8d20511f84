//! Run bookkeeping: generation numbers and the per-run state machine.
//!
//! ```text
//! Idle ─▶ Splitting ─▶ Dispatching ─▶ Collecting ─▶ Reassembling ─▶ Done
//!                                                        │
//!                                                        └─▶ Superseded
//! ```
//!
//! A session hands out strictly increasing generations. Only the run holding
//! the newest generation may publish; an older run that reaches publish time
//! ends `Superseded` and its result is dropped.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Splitting,
    Dispatching,
    Collecting,
    Reassembling,
    Done,
    Superseded,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Superseded)
    }

    fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Splitting)
                | (Splitting, Dispatching)
                | (Dispatching, Collecting)
                | (Collecting, Reassembling)
                | (Reassembling, Done)
                | (Reassembling, Superseded)
        )
    }
}

/// Monotonic generation source shared by a session.
#[derive(Debug, Default)]
pub struct Generations {
    current: AtomicU64,
}

impl Generations {
    /// Start a new generation and return it.
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

/// One submission of one document.
#[derive(Debug)]
pub struct ProcessingRun {
    pub generation: u64,
    state: RunState,
    started: Instant,
    pub total_segments: usize,
    pub candidates: usize,
}

impl ProcessingRun {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            state: RunState::Idle,
            started: Instant::now(),
            total_segments: 0,
            candidates: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `next`. Out-of-order transitions are ignored and return `false`.
    pub fn advance(&mut self, next: RunState) -> bool {
        if !self.state.can_advance_to(next) {
            debug!(
                "Run #{}: ignoring transition {:?} → {:?}",
                self.generation, self.state, next
            );
            return false;
        }
        debug!("Run #{}: {:?} → {:?}", self.generation, self.state, next);
        self.state = next;
        true
    }
}
