//
// Copyright 2025 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! The blocking range lock manager.

use crate::handle::{ExclusiveLock, Registration, SharedLock};
use crate::interval::Interval;
use crate::result::{LockerError, LockerResult};
use crate::tree::{IntervalTree, Mode, ModeFilter, NodeId};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// A lock manager granting shared or exclusive access to half-open intervals
/// `[start, end)` over a `u64` coordinate space.
///
/// Any number of threads may call into one `Locker` concurrently. Requests
/// over non-overlapping intervals never block each other, overlapping shared
/// requests coexist, and a request that conflicts with a held lock blocks
/// until every conflicting holder releases. Granted locks are returned as
/// move-only RAII handles ([`ExclusiveLock`] / [`SharedLock`]) that release
/// on drop.
///
/// Each `Locker` is fully independent state: locks held in one instance are
/// never visible to, and never block, requests on another.
///
/// # Compatibility
///
/// | requester \ held (overlapping) | Shared | Exclusive |
/// |---|---|---|
/// | Shared | granted | blocks |
/// | Exclusive | blocks | blocks |
///
/// There is no lock upgrade: a holder that needs a different mode releases
/// and re-requests, racing with any other waiters.
///
/// # Examples
///
/// ```rust
/// use rangelocker::Locker;
///
/// let locker = Locker::new();
///
/// // Touching endpoints do not overlap, so neither request blocks.
/// let a = locker.lock_exclusive(0, 10).unwrap();
/// let b = locker.lock_exclusive(10, 20).unwrap();
///
/// // Overlapping shared locks coexist.
/// let c = locker.lock_shared(20, 30).unwrap();
/// let d = locker.lock_shared(20, 30).unwrap();
///
/// drop((a, b, c, d));
/// assert_eq!(locker.lock_count(), 0);
/// ```
#[derive(Default)]
pub struct Locker {
    shared: Arc<Shared>,
}

/// State shared between a [`Locker`] and every handle it has issued.
///
/// Classic monitor: the tree is only touched under the mutex, and waiters
/// blocked on a conflict release the mutex while parked on the condvar. A
/// release broadcast-wakes all waiters because one removed record can
/// unblock waiters on completely unrelated ranges; every waiter re-validates
/// against the current tree state on wake.
#[derive(Default)]
pub(crate) struct Shared {
    tree: Mutex<IntervalTree>,
    released: Condvar,
}

impl Shared {
    fn tree(&self) -> MutexGuard<'_, IntervalTree> {
        // A panic while holding the mutex leaves the tree in an unknown
        // state; nothing sensible can be recovered.
        self.tree.lock().expect("locker mutex poisoned")
    }

    /// Removes a granted record and wakes every waiter.
    ///
    /// Invoked by handle unlock/drop only; the handle discipline guarantees
    /// the identity is live exactly once.
    pub(crate) fn release(&self, node: NodeId) {
        let mut tree = self.tree();
        tree.remove(node);
        drop(tree);
        trace!(?node, "lock released");
        self.released.notify_all();
    }
}

impl Locker {
    /// Creates a new, independent lock manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires an exclusive lock over `[start, end)`, blocking until no
    /// holder of any mode overlaps the interval.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::InvalidInterval`] if `start >= end`; nothing
    /// is mutated and the call does not block.
    pub fn lock_exclusive(&self, start: u64, end: u64) -> LockerResult<ExclusiveLock> {
        let interval = validated(start, end)?;
        let node = self.acquire(interval, Mode::Exclusive, None)?;
        Ok(ExclusiveLock::grant(Registration::new(
            Arc::clone(&self.shared),
            node,
        )))
    }

    /// Acquires a shared lock over `[start, end)`, blocking until no
    /// exclusive holder overlaps the interval. Overlapping shared holders
    /// never block a shared request.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::InvalidInterval`] if `start >= end`.
    pub fn lock_shared(&self, start: u64, end: u64) -> LockerResult<SharedLock> {
        let interval = validated(start, end)?;
        let node = self.acquire(interval, Mode::Shared, None)?;
        Ok(SharedLock::grant(Registration::new(
            Arc::clone(&self.shared),
            node,
        )))
    }

    /// Non-blocking variant of [`lock_exclusive`](Locker::lock_exclusive).
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::Conflict`] if any overlapping holder exists,
    /// and [`LockerError::InvalidInterval`] if `start >= end`.
    pub fn try_lock_exclusive(&self, start: u64, end: u64) -> LockerResult<ExclusiveLock> {
        let interval = validated(start, end)?;
        let node = self.try_acquire(interval, Mode::Exclusive)?;
        Ok(ExclusiveLock::grant(Registration::new(
            Arc::clone(&self.shared),
            node,
        )))
    }

    /// Non-blocking variant of [`lock_shared`](Locker::lock_shared).
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::Conflict`] if an overlapping exclusive holder
    /// exists, and [`LockerError::InvalidInterval`] if `start >= end`.
    pub fn try_lock_shared(&self, start: u64, end: u64) -> LockerResult<SharedLock> {
        let interval = validated(start, end)?;
        let node = self.try_acquire(interval, Mode::Shared)?;
        Ok(SharedLock::grant(Registration::new(
            Arc::clone(&self.shared),
            node,
        )))
    }

    /// Bounded-wait variant of [`lock_exclusive`](Locker::lock_exclusive).
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::Timeout`] if the conflict is still live when
    /// `timeout` elapses, and [`LockerError::InvalidInterval`] if
    /// `start >= end`.
    pub fn lock_exclusive_timeout(
        &self,
        start: u64,
        end: u64,
        timeout: Duration,
    ) -> LockerResult<ExclusiveLock> {
        let interval = validated(start, end)?;
        let node = self.acquire(interval, Mode::Exclusive, Some(timeout))?;
        Ok(ExclusiveLock::grant(Registration::new(
            Arc::clone(&self.shared),
            node,
        )))
    }

    /// Bounded-wait variant of [`lock_shared`](Locker::lock_shared).
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::Timeout`] if the conflict is still live when
    /// `timeout` elapses, and [`LockerError::InvalidInterval`] if
    /// `start >= end`.
    pub fn lock_shared_timeout(
        &self,
        start: u64,
        end: u64,
        timeout: Duration,
    ) -> LockerResult<SharedLock> {
        let interval = validated(start, end)?;
        let node = self.acquire(interval, Mode::Shared, Some(timeout))?;
        Ok(SharedLock::grant(Registration::new(
            Arc::clone(&self.shared),
            node,
        )))
    }

    /// Returns the number of currently held locks.
    pub fn lock_count(&self) -> usize {
        self.shared.tree().len()
    }

    /// Monitor loop shared by the blocking and bounded-wait paths.
    ///
    /// Holds the mutex while checking for conflicts and inserting; parks on
    /// the condvar (mutex released) while a conflict is live. Wakes are
    /// broadcast and may be spurious, so compatibility is re-validated
    /// against the current tree state on every iteration.
    fn acquire(
        &self,
        interval: Interval,
        mode: Mode,
        timeout: Option<Duration>,
    ) -> LockerResult<NodeId> {
        let filter = conflict_filter(mode);
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut tree = self.shared.tree();
        loop {
            if !tree.any_overlap(interval, filter) {
                let node = tree.insert(interval, mode);
                trace!(%interval, ?mode, ?node, "lock granted");
                return Ok(node);
            }
            debug!(%interval, ?mode, "waiting for conflicting holders");
            tree = match deadline {
                None => self
                    .shared
                    .released
                    .wait(tree)
                    .expect("locker mutex poisoned"),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        debug!(%interval, ?mode, "lock wait timed out");
                        return Err(LockerError::Timeout {
                            start: interval.start,
                            end: interval.end,
                        });
                    }
                    let (tree, _timed_out) = self
                        .shared
                        .released
                        .wait_timeout(tree, remaining)
                        .expect("locker mutex poisoned");
                    tree
                }
            };
        }
    }

    fn try_acquire(&self, interval: Interval, mode: Mode) -> LockerResult<NodeId> {
        let mut tree = self.shared.tree();
        if tree.any_overlap(interval, conflict_filter(mode)) {
            return Err(LockerError::Conflict {
                start: interval.start,
                end: interval.end,
            });
        }
        let node = tree.insert(interval, mode);
        trace!(%interval, ?mode, ?node, "lock granted");
        Ok(node)
    }
}

impl std::fmt::Debug for Locker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Locker {{ .. }}")
    }
}

/// Which held modes conflict with a request of the given mode.
///
/// An exclusive request conflicts with any overlapping holder; a shared
/// request conflicts only with overlapping exclusive holders.
fn conflict_filter(mode: Mode) -> ModeFilter {
    match mode {
        Mode::Exclusive => ModeFilter::Any,
        Mode::Shared => ModeFilter::ExclusiveOnly,
    }
}

fn validated(start: u64, end: u64) -> LockerResult<Interval> {
    if start >= end {
        return Err(LockerError::InvalidInterval { start, end });
    }
    Ok(Interval::new(start, end))
}
