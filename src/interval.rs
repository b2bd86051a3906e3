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

//! Half-open coordinate intervals.

/// A half-open interval `[start, end)` over a `u64` coordinate space.
///
/// The interval includes `start` and excludes `end`. All lock operations work
/// on intervals with `start < end`; zero-length and inverted intervals are
/// rejected at the [`Locker`](crate::Locker) boundary.
///
/// # Examples
///
/// ```rust
/// use rangelocker::Interval;
///
/// let a = Interval::new(0, 10);
/// let b = Interval::new(10, 20);
///
/// // Touching endpoints do not overlap.
/// assert!(!a.overlaps(b));
/// assert!(a.overlaps(Interval::new(9, 11)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    /// Inclusive lower bound.
    pub start: u64,
    /// Exclusive upper bound.
    pub end: u64,
}

impl Interval {
    /// Creates a new interval `[start, end)`.
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Returns `true` if `start < end`.
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// Returns the width of the interval, saturating for inverted input.
    pub fn width(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` if the two intervals share at least one coordinate.
    ///
    /// Intervals that merely touch at a boundary (`a.end == b.start`) do not
    /// overlap.
    pub fn overlaps(&self, other: Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl From<std::ops::Range<u64>> for Interval {
    fn from(range: std::ops::Range<u64>) -> Self {
        Self::new(range.start, range.end)
    }
}
