// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Progress reporting and cancellation.

use std::fmt;

type Callback = Box<dyn FnMut(f64) -> bool + Send>;

/// Tracks completed work against a total and asks an optional callback
/// whether to continue.
///
/// The callback receives the completed fraction in `[0.0, 1.0]` and returns
/// `false` to cancel. Once cancelled, a progress stays cancelled.
///
/// ```
/// use op_graph::Progress;
///
/// let mut p = Progress::with_callback(|done| done < 0.5);
/// p.start(4);
/// assert!(p.update(1));
/// assert!(!p.update(1)); // 50% reached, callback cancels
/// assert!(p.is_cancelled());
/// ```
#[derive(Default)]
pub struct Progress {
    callback: Option<Callback>,
    total: usize,
    done: usize,
    cancelled: bool,
}

impl Progress {
    /// A progress without a callback; never cancels.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: impl FnMut(f64) -> bool + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            ..Self::default()
        }
    }

    /// Resets the counters for a run of `total` work units.
    pub fn start(&mut self, total: usize) {
        self.total = total;
        self.done = 0;
        self.cancelled = false;
    }

    /// Records `amount` completed units. Returns `false` if the run should stop.
    pub fn update(&mut self, amount: usize) -> bool {
        if self.cancelled {
            return false;
        }
        self.done += amount;
        let fraction = self.fraction();
        if let Some(cb) = self.callback.as_mut() {
            if !cb(fraction) {
                self.cancelled = true;
            }
        }
        !self.cancelled
    }

    /// Completed fraction; 1.0 when there is no work.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.done as f64 / self.total as f64).min(1.0)
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("done", &self.done)
            .field("total", &self.total)
            .field("cancelled", &self.cancelled)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_without_callback() {
        let mut p = Progress::new();
        p.start(3);
        assert!(p.update(1));
        assert!(p.update(2));
        assert_eq!(p.fraction(), 1.0);
        assert!(!p.is_cancelled());
    }

    #[test]
    fn test_callback_sees_fractions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let mut p = Progress::with_callback(move |f| {
            s.lock().unwrap().push(f);
            true
        });
        p.start(4);
        for _ in 0..4 {
            p.update(1);
        }
        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_cancel_is_sticky_until_restart() {
        let mut p = Progress::with_callback(|_| false);
        p.start(10);
        assert!(!p.update(1));
        assert!(!p.update(1));
        assert_eq!(p.done(), 1);
        p.start(10);
        assert!(!p.is_cancelled());
    }

    #[test]
    fn test_zero_total() {
        let p = Progress::new();
        assert_eq!(p.fraction(), 1.0);
    }
}
