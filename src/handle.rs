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

//! Move-only RAII lock handles.

use crate::locker::Shared;
use crate::tree::NodeId;
use std::sync::Arc;

/// Ownership of one granted record in some locker's tree.
///
/// Exactly one live `Registration` exists per granted lock. Dropping it
/// removes the record and wakes all waiters. The `Arc` keeps the locker's
/// shared state alive for as long as the registration exists, so a handle
/// can always release into the tree it was granted from.
pub(crate) struct Registration {
    shared: Arc<Shared>,
    node: NodeId,
}

impl Registration {
    pub(crate) fn new(shared: Arc<Shared>, node: NodeId) -> Self {
        Self { shared, node }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.shared.release(self.node);
    }
}

/// A move-only RAII handle for a granted exclusive lock.
///
/// Created by [`Locker::lock_exclusive`](crate::Locker::lock_exclusive) and
/// its try/timeout variants; a default-constructed handle is empty. The lock
/// is released exactly once, on the first of [`unlock`](ExclusiveLock::unlock)
/// or drop, on every exit path. Handles transfer ownership by move (including
/// `std::mem::swap`); the source is left empty. Copying is not possible:
/// ownership of a granted record belongs to one handle at a time.
///
/// # Examples
///
/// ```rust
/// use rangelocker::{ExclusiveLock, Locker};
///
/// let locker = Locker::new();
///
/// let mut a = locker.lock_exclusive(0, 10).unwrap();
/// let mut b = ExclusiveLock::new();
/// assert!(a.is_held() && !b.is_held());
///
/// // Swapping moves the registration; nothing is duplicated or leaked.
/// std::mem::swap(&mut a, &mut b);
/// assert!(!a.is_held() && b.is_held());
///
/// // Unlock is idempotent.
/// b.unlock();
/// b.unlock();
/// assert_eq!(locker.lock_count(), 0);
/// ```
#[derive(Default)]
pub struct ExclusiveLock {
    registration: Option<Registration>,
}

impl ExclusiveLock {
    /// Creates an empty handle holding no lock.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn grant(registration: Registration) -> Self {
        Self {
            registration: Some(registration),
        }
    }

    /// Returns `true` if this handle currently owns a granted lock.
    pub fn is_held(&self) -> bool {
        self.registration.is_some()
    }

    /// Releases the lock if held, leaving the handle empty.
    ///
    /// Idempotent: calling it again, or letting the handle drop afterwards,
    /// is a no-op.
    pub fn unlock(&mut self) {
        self.registration.take();
    }
}

impl std::fmt::Debug for ExclusiveLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExclusiveLock {{ held: {} }}", self.is_held())
    }
}

/// A move-only RAII handle for a granted shared lock.
///
/// Identical in contract to [`ExclusiveLock`] apart from the mode it was
/// granted for; the two are distinct types so a handle can never be confused
/// with one of the other mode.
#[derive(Default)]
pub struct SharedLock {
    registration: Option<Registration>,
}

impl SharedLock {
    /// Creates an empty handle holding no lock.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn grant(registration: Registration) -> Self {
        Self {
            registration: Some(registration),
        }
    }

    /// Returns `true` if this handle currently owns a granted lock.
    pub fn is_held(&self) -> bool {
        self.registration.is_some()
    }

    /// Releases the lock if held, leaving the handle empty.
    ///
    /// Idempotent: calling it again, or letting the handle drop afterwards,
    /// is a no-op.
    pub fn unlock(&mut self) {
        self.registration.take();
    }
}

impl std::fmt::Debug for SharedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedLock {{ held: {} }}", self.is_held())
    }
}
