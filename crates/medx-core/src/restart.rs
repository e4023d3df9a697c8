//! # Restart Budget
//!
//! Sliding-window limiter for automatic restarts of a crashing service.
//!
//! ## Window Behaviour
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  time ──►   0s   2s   4s   6s   8s   9s           70s                   │
//! │  exit       ✗    ✗    ✗    ✗    ✗    ✗             ✗                    │
//! │  decision   ok   ok   ok   ok   ok   EXHAUSTED     ok (0s..8s aged out) │
//! │                                      (notify once)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each role owns one budget. Nothing is persisted; a fresh process starts
//! with an empty window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Length of the sliding window.
pub const RESTART_WINDOW: Duration = Duration::from_secs(60);

/// Restarts permitted inside one window.
pub const MAX_RESTARTS_PER_WINDOW: usize = 5;

/// Outcome of asking the budget for a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    /// The restart may proceed; `attempts` includes this one.
    Allowed { attempts: usize },

    /// The window is full. `notify` is true only for the first refusal of
    /// an exceed event so the crash-loop dialog is shown once.
    Exhausted { notify: bool },
}

/// Per-role restart budget.
#[derive(Debug, Clone)]
pub struct RestartBudget {
    window: Duration,
    max_attempts: usize,
    attempts: VecDeque<Instant>,
    exhausted_notified: bool,
}

impl Default for RestartBudget {
    fn default() -> Self {
        Self::new(RESTART_WINDOW, MAX_RESTARTS_PER_WINDOW)
    }
}

impl RestartBudget {
    /// Creates a budget allowing `max_attempts` per `window`.
    pub fn new(window: Duration, max_attempts: usize) -> Self {
        RestartBudget {
            window,
            max_attempts,
            attempts: VecDeque::with_capacity(max_attempts + 1),
            exhausted_notified: false,
        }
    }

    /// Records a restart attempt at `now` if the window has room.
    pub fn try_acquire(&mut self, now: Instant) -> BudgetDecision {
        self.prune(now);

        if self.attempts.len() < self.max_attempts {
            self.attempts.push_back(now);
            self.exhausted_notified = false;
            return BudgetDecision::Allowed {
                attempts: self.attempts.len(),
            };
        }

        let notify = !self.exhausted_notified;
        self.exhausted_notified = true;
        BudgetDecision::Exhausted { notify }
    }

    /// Number of attempts still inside the window at `now`.
    pub fn attempts_in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.attempts.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.attempts.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
    }
}
