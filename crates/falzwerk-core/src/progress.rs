// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress reporting and cooperative cancellation for long-running operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{FalzwerkError, Result};
use crate::types::OperationId;

/// Percentage callback. Receives values in `0..=100`.
pub type ProgressFn = Box<dyn FnMut(u8) + Send>;

/// Cloneable cancellation flag, checked between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Work stops at the next unit boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(FalzwerkError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Turns "one more unit done" into monotonic percentages.
///
/// Intermediate reports are capped at 99; `100` is emitted exactly once, by
/// [`ProgressTracker::finish`]. Totals may grow as work is discovered; the
/// reported value never goes backwards.
pub struct ProgressTracker {
    callback: Option<ProgressFn>,
    cancel: CancelToken,
    total: usize,
    done: usize,
    last: Option<u8>,
}

impl ProgressTracker {
    pub fn new(callback: Option<ProgressFn>, cancel: CancelToken) -> Self {
        Self {
            callback,
            cancel,
            total: 0,
            done: 0,
            last: None,
        }
    }

    /// A tracker with no callback and a token nobody holds.
    pub fn silent() -> Self {
        Self::new(None, CancelToken::new())
    }

    /// Announce `units` more units of work.
    pub fn add_units(&mut self, units: usize) {
        self.total += units;
    }

    /// Fail with `Cancelled` if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        self.cancel.check()
    }

    /// Record one finished unit, report, then honour cancellation.
    pub fn step(&mut self) -> Result<()> {
        self.advance();
        self.check()
    }

    /// Record one finished unit and report, without checking cancellation.
    /// For callers whose units observe the token themselves.
    pub fn advance(&mut self) {
        self.done += 1;
        let total = self.total.max(self.done);
        let percent = ((self.done * 100) / total).min(99) as u8;
        self.emit(percent);
    }

    /// Report completion. Safe to call more than once.
    pub fn finish(&mut self) {
        self.emit(100);
    }

    fn emit(&mut self, percent: u8) {
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        if let Some(callback) = self.callback.as_mut() {
            callback(percent);
        }
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("total", &self.total)
            .field("done", &self.done)
            .field("last", &self.last)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Per-invocation context: log correlation id, progress and cancellation.
#[derive(Debug)]
pub struct OperationContext {
    pub id: OperationId,
    pub progress: ProgressTracker,
}

impl OperationContext {
    pub fn new() -> Self {
        Self {
            id: OperationId::new(),
            progress: ProgressTracker::silent(),
        }
    }

    /// Context reporting to `callback` and observing `cancel`.
    pub fn with(callback: Option<ProgressFn>, cancel: CancelToken) -> Self {
        Self {
            id: OperationId::new(),
            progress: ProgressTracker::new(callback, cancel),
        }
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
