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

//! # Rangelocker
//!
//! A blocking, in-process range lock manager. A [`Locker`] grants shared or
//! exclusive access to half-open numeric intervals `[start, end)` over a
//! `u64` coordinate space, analogous to POSIX record locks but tree-based:
//! held locks live in an augmented interval tree, so memory and lookup cost
//! depend only on the number of held locks, never on how wide the intervals
//! are or how far apart they sit (coordinate spans of 10^9 and beyond cost
//! the same as tiny ones).
//!
//! ## Key Features
//!
//! - **Shared/exclusive modes**: overlapping shared locks coexist; an
//!   exclusive lock conflicts with any overlapping holder
//! - **Half-open semantics**: `[0, 10)` and `[10, 20)` touch but never
//!   conflict
//! - **Blocking acquisition**: conflicting requests park on a monitor and
//!   are re-checked after every release; non-blocking (`try_lock_*`) and
//!   bounded-wait (`lock_*_timeout`) variants are available
//! - **Move-only RAII handles**: [`ExclusiveLock`] / [`SharedLock`] release
//!   on drop, support idempotent [`unlock`](ExclusiveLock::unlock), and
//!   transfer ownership by move or `std::mem::swap`
//! - **Independent instances**: every `Locker` owns its own tree and
//!   synchronization state; there is no global state of any kind
//!
//! ## Usage
//!
//! ```rust
//! use rangelocker::Locker;
//!
//! let locker = Locker::new();
//!
//! // Disjoint exclusive locks are granted immediately.
//! let a = locker.lock_exclusive(0, 10).unwrap();
//! let b = locker.lock_exclusive(10, 20).unwrap();
//!
//! // Overlapping shared locks coexist.
//! let c = locker.lock_shared(100, 200).unwrap();
//! let d = locker.lock_shared(150, 250).unwrap();
//!
//! // An overlapping exclusive request would block; the try variant
//! // reports the conflict instead.
//! assert!(locker.try_lock_exclusive(5, 15).is_err());
//!
//! // Handles release on drop (or explicitly via unlock()).
//! drop((a, b, c, d));
//! assert_eq!(locker.lock_count(), 0);
//! ```
//!
//! ## Blocking Across Threads
//!
//! ```rust
//! use rangelocker::Locker;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let locker = Arc::new(Locker::new());
//! let held = locker.lock_exclusive(0, 10).unwrap();
//!
//! let waiter = thread::spawn({
//!     let locker = Arc::clone(&locker);
//!     // Blocks until `held` is released.
//!     move || locker.lock_exclusive(5, 15).unwrap()
//! });
//!
//! drop(held);
//! let granted = waiter.join().unwrap();
//! assert!(granted.is_held());
//! ```
//!
//! ## Error Handling
//!
//! Operations return [`LockerResult<T>`], failing with:
//!
//! - [`LockerError::InvalidInterval`]: `start >= end`, rejected before any
//!   state is touched
//! - [`LockerError::Conflict`]: a `try_lock_*` call found a conflicting
//!   holder
//! - [`LockerError::Timeout`]: a `lock_*_timeout` call gave up with the
//!   conflict still live
//!
//! A well-formed blocking request has no failure mode: it succeeds as soon
//! as all conflicts clear.
//!
//! ## License
//!
//! Licensed under the Apache License, Version 2.0.

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(clippy::option_if_let_else, clippy::module_name_repetitions)]

mod handle;
mod interval;
mod locker;
mod result;
pub mod tree;

pub use self::handle::{ExclusiveLock, SharedLock};
pub use self::interval::Interval;
pub use self::locker::Locker;
pub use self::result::{LockerError, LockerResult};
