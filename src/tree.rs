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

//! Augmented interval tree tracking currently-held lock intervals.
//!
//! The tree is an AVL tree keyed by `(interval.start, NodeId)` and augmented
//! with a per-node `max_end` field (the maximum end coordinate in the node's
//! subtree), which lets overlap queries prune entire subtrees. Insert and
//! remove are `O(log n)` in the number of held locks; cost never depends on
//! how wide the intervals are or how far apart they sit in the coordinate
//! space.
//!
//! Nodes live in a `Vec`-based arena and are addressed by [`NodeId`] indices.
//! The arena gives every inserted record a stable identity that survives
//! rebalancing, which is what the lock handles hold on to for release.

use crate::interval::Interval;

/// Access mode of a held lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Read-like access; overlapping shared holders coexist.
    Shared,
    /// Write-like access; conflicts with any overlapping holder.
    Exclusive,
}

/// Mode predicate for overlap queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeFilter {
    /// Match records of any mode.
    Any,
    /// Match only exclusive records.
    ExclusiveOnly,
}

impl ModeFilter {
    /// Returns `true` if a record with the given mode matches this filter.
    pub fn matches(self, mode: Mode) -> bool {
        match self {
            ModeFilter::Any => true,
            ModeFilter::ExclusiveOnly => mode == Mode::Exclusive,
        }
    }
}

/// The payload stored per tree node: one granted lock.
///
/// Every granted lock is its own record, even when its interval is identical
/// to another holder's; records are never merged, so each can be released
/// independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockRecord {
    /// The locked interval.
    pub interval: Interval,
    /// The mode the interval is held in.
    pub mode: Mode,
}

/// Stable identity of a record in the tree's node arena.
///
/// Returned by [`IntervalTree::insert`] and consumed by
/// [`IntervalTree::remove`]. An id is valid only between those two calls;
/// freed slots are recycled for later insertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct Node {
    record: LockRecord,
    /// Maximum end coordinate over this node and its subtree.
    max_end: u64,
    height: u32,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

/// An augmented interval tree over half-open `u64` intervals.
///
/// Duplicate and overlapping intervals insert independent records; the tree
/// itself enforces no compatibility rules. The [`Locker`](crate::Locker)
/// layers the shared/exclusive compatibility matrix on top by querying
/// [`any_overlap`](IntervalTree::any_overlap) before inserting.
///
/// # Examples
///
/// ```rust
/// use rangelocker::tree::{IntervalTree, Mode, ModeFilter};
/// use rangelocker::Interval;
///
/// let mut tree = IntervalTree::new();
/// let id = tree.insert(Interval::new(0, 10), Mode::Exclusive);
///
/// assert!(tree.any_overlap(Interval::new(5, 15), ModeFilter::Any));
/// assert!(!tree.any_overlap(Interval::new(10, 20), ModeFilter::Any));
///
/// tree.remove(id);
/// assert!(tree.is_empty());
/// ```
#[derive(Default)]
pub struct IntervalTree {
    slots: Vec<Option<Node>>,
    free: Vec<u32>,
    root: Option<NodeId>,
    len: usize,
}

impl IntervalTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no records are held.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a new record and returns its stable identity.
    ///
    /// The interval must satisfy `start < end`; the caller validates before
    /// reaching the tree.
    pub fn insert(&mut self, interval: Interval, mode: Mode) -> NodeId {
        debug_assert!(interval.is_valid(), "insert requires start < end");
        let id = self.alloc(Node {
            record: LockRecord { interval, mode },
            max_end: interval.end,
            height: 1,
            left: None,
            right: None,
        });
        self.root = Some(self.insert_rec(self.root, id));
        self.len += 1;
        id
    }

    /// Removes the record with the given identity.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a live record. Under the handle discipline this
    /// is unreachable, so it is treated as a fatal internal-consistency
    /// assertion rather than a recoverable error.
    pub fn remove(&mut self, id: NodeId) {
        let start = self
            .slots
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .expect("interval tree: removing an identity that is not live")
            .record
            .interval
            .start;
        self.root = self.remove_rec(self.root, (start, id.0));
        self.slots[id.index()] = None;
        self.free.push(id.0);
        self.len -= 1;
    }

    /// Returns the record with the given identity, if it is live.
    pub fn record(&self, id: NodeId) -> Option<&LockRecord> {
        self.slots
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .map(|node| &node.record)
    }

    /// Returns a lazy iterator over all live records overlapping `interval`
    /// whose mode matches `filter`.
    ///
    /// Traversal prunes every subtree whose `max_end` does not reach past
    /// `interval.start` and skips right subtrees once a node's start is at or
    /// beyond `interval.end`, so enumerating `k` matches costs
    /// `O(log n + k)`. The iterator is lazy: callers that only need to know
    /// whether any overlap exists stop after the first item.
    pub fn overlaps(&self, interval: Interval, filter: ModeFilter) -> Overlaps<'_> {
        Overlaps {
            tree: self,
            query: interval,
            filter,
            stack: self.root.into_iter().collect(),
        }
    }

    /// Returns `true` if any live record overlapping `interval` matches
    /// `filter`.
    pub fn any_overlap(&self, interval: Interval, filter: ModeFilter) -> bool {
        self.overlaps(interval, filter).next().is_some()
    }

    /// Returns an in-order iterator over all live records.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tree: self,
            stack: Vec::new(),
            current: self.root,
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(node);
            NodeId(slot)
        } else {
            let slot = u32::try_from(self.slots.len()).expect("interval tree arena exhausted");
            self.slots.push(Some(node));
            NodeId(slot)
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        self.slots[id.index()]
            .as_ref()
            .expect("interval tree: dangling node identity")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id.index()]
            .as_mut()
            .expect("interval tree: dangling node identity")
    }

    /// Ordering key. The id tie-breaker makes the order strict even when
    /// identical intervals are held simultaneously.
    fn key(&self, id: NodeId) -> (u64, u32) {
        (self.node(id).record.interval.start, id.0)
    }

    fn height(&self, link: Option<NodeId>) -> u32 {
        link.map_or(0, |id| self.node(id).height)
    }

    fn max_end(&self, link: Option<NodeId>) -> u64 {
        link.map_or(0, |id| self.node(id).max_end)
    }

    /// Recomputes `height` and `max_end` from the children.
    fn update(&mut self, id: NodeId) {
        let (left, right) = {
            let node = self.node(id);
            (node.left, node.right)
        };
        let height = 1 + self.height(left).max(self.height(right));
        let max_end = self
            .node(id)
            .record
            .interval
            .end
            .max(self.max_end(left))
            .max(self.max_end(right));
        let node = self.node_mut(id);
        node.height = height;
        node.max_end = max_end;
    }

    fn balance_factor(&self, id: NodeId) -> i64 {
        let node = self.node(id);
        i64::from(self.height(node.left)) - i64::from(self.height(node.right))
    }

    fn rotate_left(&mut self, id: NodeId) -> NodeId {
        let pivot = self.node(id).right.expect("rotate_left without right child");
        let inner = self.node(pivot).left;
        self.node_mut(id).right = inner;
        self.node_mut(pivot).left = Some(id);
        self.update(id);
        self.update(pivot);
        pivot
    }

    fn rotate_right(&mut self, id: NodeId) -> NodeId {
        let pivot = self.node(id).left.expect("rotate_right without left child");
        let inner = self.node(pivot).right;
        self.node_mut(id).left = inner;
        self.node_mut(pivot).right = Some(id);
        self.update(id);
        self.update(pivot);
        pivot
    }

    /// Restores the AVL height invariant at `id`, returning the subtree's
    /// new root. Rotations re-augment `max_end` as they go.
    fn rebalance(&mut self, id: NodeId) -> NodeId {
        self.update(id);
        let balance = self.balance_factor(id);
        if balance > 1 {
            let left = self.node(id).left.expect("left-heavy node without left child");
            if self.balance_factor(left) < 0 {
                let new_left = self.rotate_left(left);
                self.node_mut(id).left = Some(new_left);
            }
            self.rotate_right(id)
        } else if balance < -1 {
            let right = self.node(id).right.expect("right-heavy node without right child");
            if self.balance_factor(right) > 0 {
                let new_right = self.rotate_right(right);
                self.node_mut(id).right = Some(new_right);
            }
            self.rotate_left(id)
        } else {
            id
        }
    }

    fn insert_rec(&mut self, link: Option<NodeId>, new: NodeId) -> NodeId {
        let Some(id) = link else {
            return new;
        };
        if self.key(new) < self.key(id) {
            let left = self.insert_rec(self.node(id).left, new);
            self.node_mut(id).left = Some(left);
        } else {
            let right = self.insert_rec(self.node(id).right, new);
            self.node_mut(id).right = Some(right);
        }
        self.rebalance(id)
    }

    fn remove_rec(&mut self, link: Option<NodeId>, key: (u64, u32)) -> Option<NodeId> {
        let id = link.expect("interval tree: identity not reachable from root");
        match key.cmp(&self.key(id)) {
            std::cmp::Ordering::Less => {
                let left = self.remove_rec(self.node(id).left, key);
                self.node_mut(id).left = left;
                Some(self.rebalance(id))
            }
            std::cmp::Ordering::Greater => {
                let right = self.remove_rec(self.node(id).right, key);
                self.node_mut(id).right = right;
                Some(self.rebalance(id))
            }
            std::cmp::Ordering::Equal => {
                let (left, right) = {
                    let node = self.node(id);
                    (node.left, node.right)
                };
                match (left, right) {
                    (None, child) | (child, None) => child,
                    (Some(left), Some(right)) => {
                        // Relink the in-order successor into the removed
                        // node's position instead of moving payloads, so
                        // every other live NodeId stays valid.
                        let (successor, rest) = self.extract_min(right);
                        self.node_mut(successor).left = Some(left);
                        self.node_mut(successor).right = rest;
                        Some(self.rebalance(successor))
                    }
                }
            }
        }
    }

    /// Unlinks the minimum node of the subtree rooted at `id`, returning it
    /// along with the rebalanced remainder.
    fn extract_min(&mut self, id: NodeId) -> (NodeId, Option<NodeId>) {
        let left = self.node(id).left;
        match left {
            None => (id, self.node(id).right),
            Some(left) => {
                let (min, new_left) = self.extract_min(left);
                self.node_mut(id).left = new_left;
                (min, Some(self.rebalance(id)))
            }
        }
    }
}

impl std::fmt::Debug for IntervalTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn recurse(
            tree: &IntervalTree,
            link: Option<NodeId>,
            depth: usize,
            f: &mut std::fmt::Formatter<'_>,
        ) -> std::fmt::Result {
            if let Some(id) = link {
                let node = tree.node(id);
                recurse(tree, node.left, depth + 1, f)?;
                writeln!(
                    f,
                    "{:indent$}{} {:?} (h={}, max_end={})",
                    "",
                    node.record.interval,
                    node.record.mode,
                    node.height,
                    node.max_end,
                    indent = depth * 2
                )?;
                recurse(tree, node.right, depth + 1, f)?;
            }
            Ok(())
        }
        recurse(self, self.root, 0, f)
    }
}

/// Lazy iterator over records overlapping a query interval.
///
/// Created by [`IntervalTree::overlaps`]. Yield order is unspecified.
pub struct Overlaps<'a> {
    tree: &'a IntervalTree,
    query: Interval,
    filter: ModeFilter,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Overlaps<'a> {
    type Item = &'a LockRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        while let Some(id) = self.stack.pop() {
            let node = tree.node(id);
            // Nothing in this subtree reaches past the query start.
            if node.max_end <= self.query.start {
                continue;
            }
            if let Some(left) = node.left {
                self.stack.push(left);
            }
            if node.record.interval.start < self.query.end {
                if let Some(right) = node.right {
                    self.stack.push(right);
                }
                if node.record.interval.overlaps(self.query)
                    && self.filter.matches(node.record.mode)
                {
                    return Some(&node.record);
                }
            }
        }
        None
    }
}

/// An in-order iterator over all live records.
///
/// Created by [`IntervalTree::iter`].
pub struct Iter<'a> {
    tree: &'a IntervalTree,
    stack: Vec<NodeId>,
    current: Option<NodeId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a LockRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        let mut current = self.current;
        while let Some(id) = current {
            self.stack.push(id);
            current = tree.node(id).left;
        }
        let id = self.stack.pop()?;
        let node = tree.node(id);
        self.current = node.right;
        Some(&node.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: u64, end: u64) -> Interval {
        Interval::new(start, end)
    }

    fn intervals(tree: &IntervalTree) -> Vec<(u64, u64)> {
        tree.iter()
            .map(|r| (r.interval.start, r.interval.end))
            .collect()
    }

    /// Walks the whole tree checking the BST order, the AVL height bound and
    /// the max_end augmentation, and that reachable count matches len().
    fn check_invariants(tree: &IntervalTree) {
        fn recurse(tree: &IntervalTree, link: Option<NodeId>, count: &mut usize) -> (u32, u64) {
            let Some(id) = link else {
                return (0, 0);
            };
            *count += 1;
            let node = tree.node(id);
            if let Some(left) = node.left {
                assert!(tree.key(left) < tree.key(id), "BST order violated");
            }
            if let Some(right) = node.right {
                assert!(tree.key(id) < tree.key(right), "BST order violated");
            }
            let (lh, lm) = recurse(tree, node.left, count);
            let (rh, rm) = recurse(tree, node.right, count);
            assert!(
                lh.abs_diff(rh) <= 1,
                "AVL balance violated at {}",
                node.record.interval
            );
            let height = 1 + lh.max(rh);
            assert_eq!(node.height, height, "stale height");
            let max_end = node.record.interval.end.max(lm).max(rm);
            assert_eq!(node.max_end, max_end, "stale max_end");
            (height, max_end)
        }
        let mut count = 0;
        recurse(tree, tree.root, &mut count);
        assert_eq!(count, tree.len(), "len() out of sync with reachable nodes");
    }

    #[test]
    fn test_empty_tree() {
        let tree = IntervalTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert!(!tree.any_overlap(iv(0, 100), ModeFilter::Any));
    }

    #[test]
    fn test_single_insert_and_remove() {
        let mut tree = IntervalTree::new();
        let id = tree.insert(iv(10, 20), Mode::Exclusive);
        assert_eq!(tree.len(), 1);
        assert_eq!(
            tree.record(id),
            Some(&LockRecord {
                interval: iv(10, 20),
                mode: Mode::Exclusive
            })
        );
        check_invariants(&tree);

        tree.remove(id);
        assert!(tree.is_empty());
        assert_eq!(tree.record(id), None);
        check_invariants(&tree);
    }

    #[test]
    fn test_overlap_queries() {
        let mut tree = IntervalTree::new();
        tree.insert(iv(10, 20), Mode::Exclusive);

        assert!(tree.any_overlap(iv(15, 25), ModeFilter::Any)); // right overlap
        assert!(tree.any_overlap(iv(5, 15), ModeFilter::Any)); // left overlap
        assert!(tree.any_overlap(iv(12, 18), ModeFilter::Any)); // contained
        assert!(tree.any_overlap(iv(5, 25), ModeFilter::Any)); // containing

        assert!(!tree.any_overlap(iv(0, 10), ModeFilter::Any)); // touching before
        assert!(!tree.any_overlap(iv(20, 30), ModeFilter::Any)); // touching after
        assert!(!tree.any_overlap(iv(0, 5), ModeFilter::Any));
        assert!(!tree.any_overlap(iv(25, 30), ModeFilter::Any));
    }

    #[test]
    fn test_mode_filter() {
        let mut tree = IntervalTree::new();
        tree.insert(iv(10, 20), Mode::Shared);

        assert!(tree.any_overlap(iv(15, 25), ModeFilter::Any));
        assert!(!tree.any_overlap(iv(15, 25), ModeFilter::ExclusiveOnly));

        tree.insert(iv(18, 30), Mode::Exclusive);
        assert!(tree.any_overlap(iv(15, 25), ModeFilter::ExclusiveOnly));
        // Query overlapping only the shared record still sees nothing
        // exclusive.
        assert!(!tree.any_overlap(iv(10, 18), ModeFilter::ExclusiveOnly));
    }

    #[test]
    fn test_identical_intervals_are_independent_records() {
        let mut tree = IntervalTree::new();
        let a = tree.insert(iv(20, 30), Mode::Shared);
        let b = tree.insert(iv(20, 30), Mode::Shared);
        assert_ne!(a, b);
        assert_eq!(tree.len(), 2);
        check_invariants(&tree);

        assert_eq!(tree.overlaps(iv(20, 30), ModeFilter::Any).count(), 2);

        tree.remove(a);
        assert_eq!(tree.len(), 1);
        assert!(tree.any_overlap(iv(20, 30), ModeFilter::Any));
        tree.remove(b);
        assert!(tree.is_empty());
        check_invariants(&tree);
    }

    #[test]
    fn test_overlaps_enumerates_all_matches() {
        let mut tree = IntervalTree::new();
        tree.insert(iv(0, 10), Mode::Shared);
        tree.insert(iv(5, 15), Mode::Exclusive);
        tree.insert(iv(20, 30), Mode::Shared);
        tree.insert(iv(8, 25), Mode::Shared);

        let mut hits: Vec<_> = tree
            .overlaps(iv(9, 21), ModeFilter::Any)
            .map(|r| (r.interval.start, r.interval.end))
            .collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![(0, 10), (5, 15), (8, 25), (20, 30)]);

        let exclusive: Vec<_> = tree
            .overlaps(iv(9, 21), ModeFilter::ExclusiveOnly)
            .map(|r| (r.interval.start, r.interval.end))
            .collect();
        assert_eq!(exclusive, vec![(5, 15)]);
    }

    #[test]
    fn test_in_order_iteration() {
        let mut tree = IntervalTree::new();
        tree.insert(iv(50, 60), Mode::Exclusive);
        tree.insert(iv(10, 20), Mode::Exclusive);
        tree.insert(iv(30, 40), Mode::Exclusive);
        assert_eq!(intervals(&tree), vec![(10, 20), (30, 40), (50, 60)]);
    }

    #[test]
    fn test_sequential_inserts_stay_balanced() {
        let mut tree = IntervalTree::new();
        let ids: Vec<_> = (0..1000)
            .map(|k| tree.insert(iv(k * 10, k * 10 + 10), Mode::Exclusive))
            .collect();
        assert_eq!(tree.len(), 1000);
        check_invariants(&tree);

        for id in ids {
            tree.remove(id);
        }
        assert!(tree.is_empty());
        check_invariants(&tree);
    }

    #[test]
    fn test_sparse_giant_span_node_count() {
        // 1000 locks spread over a ~10^9-wide space; the tree must stay at
        // exactly 1000 nodes, independent of the coordinate span.
        let width = 1_000_000u64;
        let mut tree = IntervalTree::new();
        for k in 0..1000 {
            tree.insert(iv(k * width, k * width + width), Mode::Exclusive);
        }
        assert_eq!(tree.len(), 1000);
        check_invariants(&tree);

        assert!(tree.any_overlap(iv(500 * width + 1, 500 * width + 2), ModeFilter::Any));
        assert!(!tree.any_overlap(iv(1000 * width, 1001 * width), ModeFilter::Any));
    }

    #[test]
    fn test_interleaved_remove_keeps_other_ids_valid() {
        let mut tree = IntervalTree::new();
        let ids: Vec<_> = (0..100)
            .map(|k| tree.insert(iv(k * 5, k * 5 + 5), Mode::Shared))
            .collect();

        // Remove every other record; the survivors' identities must still
        // resolve even though removal relinks successor nodes.
        for (k, id) in ids.iter().enumerate() {
            if k % 2 == 0 {
                tree.remove(*id);
                check_invariants(&tree);
            }
        }
        for (k, id) in ids.iter().enumerate() {
            if k % 2 == 1 {
                let record = tree.record(*id).expect("surviving id went dead");
                assert_eq!(record.interval, iv(k as u64 * 5, k as u64 * 5 + 5));
            }
        }
        assert_eq!(tree.len(), 50);
    }

    #[test]
    fn test_slot_recycling() {
        let mut tree = IntervalTree::new();
        for _ in 0..100 {
            let a = tree.insert(iv(0, 10), Mode::Exclusive);
            let b = tree.insert(iv(10, 20), Mode::Exclusive);
            tree.remove(a);
            tree.remove(b);
        }
        assert!(tree.is_empty());
        // Freed slots are reused instead of growing the arena.
        assert!(tree.slots.len() <= 2);
    }

    #[test]
    fn test_pseudorandom_churn() {
        // Deterministic LCG-driven insert/remove churn with invariant checks.
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut step = move || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            state >> 33
        };
        let mut tree = IntervalTree::new();
        let mut live = Vec::new();
        for _ in 0..500 {
            if live.len() < 20 || step() % 3 != 0 {
                let start = step() % 10_000;
                let width = 1 + step() % 5_000;
                let mode = if step() % 2 == 0 {
                    Mode::Shared
                } else {
                    Mode::Exclusive
                };
                live.push(tree.insert(iv(start, start + width), mode));
            } else {
                let victim = live.swap_remove((step() as usize) % live.len());
                tree.remove(victim);
            }
        }
        check_invariants(&tree);
        while let Some(id) = live.pop() {
            tree.remove(id);
        }
        assert!(tree.is_empty());
        check_invariants(&tree);
    }

    #[test]
    #[should_panic(expected = "removing an identity that is not live")]
    fn test_double_remove_is_fatal() {
        let mut tree = IntervalTree::new();
        let id = tree.insert(iv(0, 10), Mode::Exclusive);
        tree.remove(id);
        tree.remove(id);
    }
}
