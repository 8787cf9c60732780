//! # cancellable_loops
//!
//! A small utility crate for running loops that can be stopped early, both sequentially and
//! in parallel.
//!
//! Cancellation is expressed with a [`CancellationToken`]: a shared flag that any holder can
//! raise, optionally combined with a deadline. Deadlines make it possible to give each unit of
//! work its own time budget while still honoring a run-wide cancel request:
//!
//! - Long-running batch computations that need cancellation support
//! - Per-task timeouts without killing worker threads
//! - Parallel fan-out over independent items with early exit
//!
//! ## Features
//!
//! - Sequential loop with cancellation support
//! - Parallel loop with cancellation support using Rayon
//! - Parallel loop with both cancellation and reduction
//!
//! ## Example
//!
//! ```
//! use cancellable_loops::{for_each_cancellable, CancellationToken};
//!
//! let token = CancellationToken::new();
//! let mut visited = Vec::new();
//!
//! let completed = for_each_cancellable(0..100, &token, |i| {
//!     visited.push(i);
//!     if i == 9 {
//!         token.cancel();
//!     }
//! });
//!
//! assert!(!completed);
//! assert_eq!(visited.len(), 10);
//! ```

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cloneable cancellation handle with an optional deadline.
///
/// Clones and children share the same cancellation flag, so calling [`cancel`](Self::cancel)
/// on any of them stops every loop observing the flag. Deadlines are per handle: a child made
/// with [`with_timeout`](Self::with_timeout) expires on its own without affecting its parent.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Creates a token that is neither cancelled nor bounded in time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the shared cancellation flag.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called on this token or any clone.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Returns `true` if this handle carries a deadline that has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Returns `true` if work observing this token should stop.
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// The deadline of this handle, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Creates a child handle sharing the cancellation flag and expiring after `timeout`.
    ///
    /// The earlier of the parent's deadline and the new one wins. `None` keeps the parent's
    /// deadline.
    ///
    /// # Examples
    ///
    /// ```
    /// use cancellable_loops::CancellationToken;
    /// use std::time::Duration;
    ///
    /// let run = CancellationToken::new();
    /// let task = run.with_timeout(Some(Duration::ZERO));
    ///
    /// assert!(task.is_expired());
    /// assert!(!run.should_stop());
    ///
    /// task.cancel();
    /// assert!(run.is_cancelled());
    /// ```
    pub fn with_timeout(&self, timeout: Option<Duration>) -> Self {
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own) {
            (Some(parent), Some(child)) => Some(parent.min(child)),
            (parent, child) => parent.or(child),
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline,
        }
    }
}

/// Executes a sequential loop that can be cancelled via a token.
///
/// The token is checked before each item. Returns `true` if every item was processed.
///
/// # Arguments
///
/// * `iter` - Any iterator to process
/// * `token` - Cancellation handle observed before each item
/// * `func` - A function to apply to each element in the iterator
///
/// # Examples
///
/// ```
/// use cancellable_loops::{for_each_cancellable, CancellationToken};
///
/// let token = CancellationToken::new();
/// let mut sum = 0;
///
/// let completed = for_each_cancellable(1..=10, &token, |i| sum += i);
///
/// assert!(completed);
/// assert_eq!(sum, 55);
/// ```
pub fn for_each_cancellable<I, F, T>(iter: I, token: &CancellationToken, mut func: F) -> bool
where
    I: IntoIterator<Item = T>,
    F: FnMut(T),
{
    for item in iter {
        if token.should_stop() {
            return false;
        }
        func(item);
    }
    true
}

/// Executes a parallel loop that can be cancelled via a token.
///
/// Work is spread over the current Rayon pool. Once the token stops, remaining items are
/// skipped; items already running finish normally. Returns `true` if no item was skipped.
///
/// # Examples
///
/// ```
/// use cancellable_loops::{par_for_each_cancellable, CancellationToken};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let token = CancellationToken::new();
/// let counter = AtomicUsize::new(0);
///
/// let completed = par_for_each_cancellable(0..100, &token, |_| {
///     counter.fetch_add(1, Ordering::Relaxed);
/// });
///
/// assert!(completed);
/// assert_eq!(counter.load(Ordering::Relaxed), 100);
/// ```
pub fn par_for_each_cancellable<I, F>(iter: I, token: &CancellationToken, func: F) -> bool
where
    I: IntoParallelIterator,
    F: Fn(I::Item) + Sync + Send,
    I::Item: Send,
{
    iter.into_par_iter()
        .try_for_each(|item| {
            if token.should_stop() {
                Err(())
            } else {
                func(item);
                Ok(())
            }
        })
        .is_ok()
}

/// Executes a parallel loop with reduction that can be cancelled via a token.
///
/// Items seen after the token stops are dropped from the reduction, so the result only covers
/// processed items. Returns `init` if nothing was processed.
///
/// # Examples
///
/// ```
/// use cancellable_loops::{par_for_each_cancellable_reduce, CancellationToken};
///
/// let token = CancellationToken::new();
/// let sum = par_for_each_cancellable_reduce(1..=100u64, &token, Some, |a, b| a + b, 0);
///
/// assert_eq!(sum, 5050);
/// ```
pub fn par_for_each_cancellable_reduce<I, F, R>(
    iter: I,
    token: &CancellationToken,
    func: F,
    reducer: impl Fn(R, R) -> R + Sync + Send,
    init: R,
) -> R
where
    I: IntoParallelIterator,
    F: Fn(I::Item) -> Option<R> + Sync + Send,
    I::Item: Send,
    R: Send + Sync + Clone,
{
    iter.into_par_iter()
        .filter_map(|item| {
            if token.should_stop() {
                None
            } else {
                func(item)
            }
        })
        .reduce(|| init.clone(), reducer)
}
