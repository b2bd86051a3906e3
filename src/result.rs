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

//! Error types and results for the rangelocker library.

/// A specialized Result type for lock manager operations.
pub type LockerResult<T> = Result<T, LockerError>;

/// Errors that can occur during lock manager operations.
///
/// Internal consistency failures (for example releasing a node identity that
/// is not in the tree) are programming errors in the manager itself and panic
/// rather than surfacing here.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LockerError {
    /// The requested interval is empty or inverted (`start >= end`).
    ///
    /// Reported synchronously before any state is touched; the request never
    /// blocks.
    #[error("invalid interval [{start}, {end}): start must be less than end")]
    InvalidInterval {
        /// Requested inclusive lower bound.
        start: u64,
        /// Requested exclusive upper bound.
        end: u64,
    },

    /// A non-blocking request found a conflicting holder.
    ///
    /// Only returned by the `try_lock_*` operations; the blocking operations
    /// wait instead.
    #[error("range [{start}, {end}) conflicts with a held lock")]
    Conflict {
        /// Requested inclusive lower bound.
        start: u64,
        /// Requested exclusive upper bound.
        end: u64,
    },

    /// A bounded-wait request timed out with the conflict still live.
    ///
    /// Only returned by the `lock_*_timeout` operations.
    #[error("timed out waiting to lock range [{start}, {end})")]
    Timeout {
        /// Requested inclusive lower bound.
        start: u64,
        /// Requested exclusive upper bound.
        end: u64,
    },
}
