// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A generic, arena-backed fibonacci heap.
//!
//! Used wherever the spec calls for fibonacci-heap scheduling: the
//! timed-event executor (§4.1), the lease heap (§4.2), and the
//! per-cache lifespan admin (§4.8). Exposes `insert`/`decrease_key`/
//! `delete`/`peek_min`/`extract_min` in amortized O(1) (`extract_min`
//! and `delete` are amortized O(log n)), matching the operations the
//! spec's invariants (§8, property 2 and 7) are phrased against.
//!
//! Nodes are addressed by a stable [`NodeId`] handle rather than a Rust
//! reference, since the heap is intrusively shared between a scheduler
//! and the owner of the node's payload (e.g. a [`super::lease::Lease`]
//! needs to know whether it is currently on the heap).

use std::collections::HashMap;

/// Stable handle to a node in a [`FibHeap`]. Remains valid until the
/// node is removed via `extract_min` or `delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

struct Node<K, V> {
    key: K,
    value: Option<V>,
    parent: Option<usize>,
    child: Option<usize>,
    left: usize,
    right: usize,
    degree: usize,
    mark: bool,
}

/// A fibonacci heap keyed by `K`, storing an arbitrary payload `V`.
pub struct FibHeap<K: Ord + Copy, V> {
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    min: Option<usize>,
    len: usize,
}

impl<K: Ord + Copy, V> Default for FibHeap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Copy, V> FibHeap<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            min: None,
            len: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        if let Some(idx) = self.free.pop() {
            self.nodes[idx] = Some(node);
            idx
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn get(&self, idx: usize) -> &Node<K, V> {
        self.nodes[idx].as_ref().expect("dangling fibheap index")
    }

    fn get_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        self.nodes[idx].as_mut().expect("dangling fibheap index")
    }

    /// Splice `idx`'s right-neighbor linkage so it sits in the circular
    /// list containing `into`, just to `into`'s right.
    fn splice_into_list(&mut self, idx: usize, into: usize) {
        let into_right = self.get(into).right;
        self.get_mut(into).right = idx;
        self.get_mut(idx).left = into;
        self.get_mut(idx).right = into_right;
        self.get_mut(into_right).left = idx;
    }

    /// Remove `idx` from whatever circular list it is currently linked
    /// into, leaving it self-linked.
    fn unlink(&mut self, idx: usize) {
        let (l, r) = {
            let n = self.get(idx);
            (n.left, n.right)
        };
        self.get_mut(l).right = r;
        self.get_mut(r).left = l;
        let n = self.get_mut(idx);
        n.left = idx;
        n.right = idx;
    }

    /// Insert `(key, value)`, returning a handle usable with
    /// `decrease_key`/`delete`.
    pub fn insert(&mut self, key: K, value: V) -> NodeId {
        let idx = self.alloc(Node {
            key,
            value: Some(value),
            parent: None,
            child: None,
            left: 0,
            right: 0,
            degree: 0,
            mark: false,
        });
        self.get_mut(idx).left = idx;
        self.get_mut(idx).right = idx;

        match self.min {
            None => self.min = Some(idx),
            Some(min_idx) => {
                self.splice_into_list(idx, min_idx);
                if key < self.get(min_idx).key {
                    self.min = Some(idx);
                }
            }
        }
        self.len += 1;
        NodeId(idx)
    }

    /// Peek the minimum key without removing it.
    #[must_use]
    pub fn peek_min(&self) -> Option<&K> {
        self.min.map(|idx| &self.get(idx).key)
    }

    /// The current key of a still-resident node.
    #[must_use]
    pub fn key(&self, id: NodeId) -> K {
        self.get(id.0).key
    }

    /// Shared access to a still-resident node's payload.
    #[must_use]
    pub fn value(&self, id: NodeId) -> &V {
        self.get(id.0).value.as_ref().expect("value present")
    }

    /// Mutable access to a still-resident node's payload.
    pub fn value_mut(&mut self, id: NodeId) -> &mut V {
        self.get_mut(id.0).value.as_mut().expect("value present")
    }

    fn link_as_child(&mut self, child: usize, parent: usize) {
        self.unlink(child);
        self.get_mut(child).parent = Some(parent);
        self.get_mut(child).mark = false;
        match self.get(parent).child {
            None => {
                self.get_mut(child).left = child;
                self.get_mut(child).right = child;
                self.get_mut(parent).child = Some(child);
            }
            Some(existing) => self.splice_into_list(child, existing),
        }
        self.get_mut(parent).degree += 1;
    }

    fn consolidate(&mut self) {
        let Some(min_idx) = self.min else { return };

        let mut roots = Vec::new();
        let mut cur = min_idx;
        loop {
            roots.push(cur);
            cur = self.get(cur).right;
            if cur == min_idx {
                break;
            }
        }

        let mut degree_table: HashMap<usize, usize> = HashMap::new();
        for root in roots {
            let mut x = root;
            let mut d = self.get(x).degree;
            while let Some(&y) = degree_table.get(&d) {
                let (x_key, y_key) = (self.get(x).key, self.get(y).key);
                let (winner, loser) = if y_key < x_key { (y, x) } else { (x, y) };
                degree_table.remove(&d);
                self.link_as_child(loser, winner);
                x = winner;
                d = self.get(x).degree;
            }
            degree_table.insert(d, x);
        }

        self.min = None;
        for (_, idx) in degree_table {
            self.get_mut(idx).left = idx;
            self.get_mut(idx).right = idx;
            self.get_mut(idx).parent = None;
            match self.min {
                None => self.min = Some(idx),
                Some(min_idx) => {
                    self.splice_into_list(idx, min_idx);
                    if self.get(idx).key < self.get(min_idx).key {
                        self.min = Some(idx);
                    }
                }
            }
        }
    }

    /// Remove and return the minimum `(key, value)` pair.
    pub fn extract_min(&mut self) -> Option<(K, V)> {
        let min_idx = self.min?;

        // Promote each child of the min node to a root.
        if let Some(first_child) = self.get(min_idx).child {
            let mut children = Vec::new();
            let mut c = first_child;
            loop {
                children.push(c);
                c = self.get(c).right;
                if c == first_child {
                    break;
                }
            }
            for child in children {
                self.unlink(child);
                self.get_mut(child).parent = None;
                self.splice_into_list(child, min_idx);
            }
            self.get_mut(min_idx).child = None;
        }

        let right = self.get(min_idx).right;
        self.unlink(min_idx);
        self.min = if right == min_idx { None } else { Some(right) };

        let node = self.nodes[min_idx].take().expect("min node present");
        self.free.push(min_idx);
        self.len -= 1;

        if self.min.is_some() {
            self.consolidate();
        }

        Some((node.key, node.value.expect("value present until extraction")))
    }

    /// Lower `id`'s key. Panics (via an internal assertion) if
    /// `new_key` is greater than the current key - this operation only
    /// ever moves a node earlier, matching the contract every caller in
    /// this crate relies on (§4.1 `reschedule_earlier`, §4.2 lease
    /// `set_expiry`).
    pub fn decrease_key(&mut self, id: NodeId, new_key: K) {
        let idx = id.0;
        assert!(
            new_key <= self.get(idx).key,
            "decrease_key called with a larger key"
        );
        self.get_mut(idx).key = new_key;

        if let Some(parent) = self.get(idx).parent {
            if new_key < self.get(parent).key {
                self.cut(idx, parent);
                self.cascading_cut(parent);
            }
        }

        if let Some(min_idx) = self.min {
            if new_key < self.get(min_idx).key {
                self.min = Some(idx);
            }
        }
    }

    fn cut(&mut self, child: usize, parent: usize) {
        if self.get(parent).degree > 0 {
            self.get_mut(parent).degree -= 1;
        }
        let child_is_only = self.get(child).right == child;
        if self.get(parent).child == Some(child) {
            self.get_mut(parent).child = if child_is_only {
                None
            } else {
                Some(self.get(child).right)
            };
        }
        self.unlink(child);
        self.get_mut(child).parent = None;
        self.get_mut(child).mark = false;
        if let Some(min_idx) = self.min {
            self.splice_into_list(child, min_idx);
        }
    }

    fn cascading_cut(&mut self, idx: usize) {
        if let Some(parent) = self.get(idx).parent {
            if !self.get(idx).mark {
                self.get_mut(idx).mark = true;
            } else {
                self.cut(idx, parent);
                self.cascading_cut(parent);
            }
        }
    }

    /// Remove an arbitrary node from the heap before it becomes the
    /// minimum, by decreasing it to a sentinel-minimal key and
    /// extracting. `key_min` must be a value no other key in the heap
    /// will ever compare less than or equal to after this call (the
    /// callers in this crate pass their domain's "negative infinity",
    /// e.g. `i64::MIN`).
    pub fn delete(&mut self, id: NodeId, key_min: K) -> Option<V> {
        self.decrease_key(id, key_min);
        self.extract_min().map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_min_returns_non_decreasing_order() {
        let mut heap = FibHeap::new();
        let mut ids = Vec::new();
        for i in (0..1000i64).rev() {
            ids.push(heap.insert(fastrand_like(i), i));
        }
        let mut last = i64::MIN;
        let mut count = 0;
        while let Some((key, _)) = heap.extract_min() {
            assert!(key >= last);
            last = key;
            count += 1;
        }
        assert_eq!(count, 1000);
    }

    /// Deterministic pseudo-shuffle so the insertion order isn't sorted
    /// (exercising consolidate's merging), without pulling in an RNG
    /// dependency for this internal test helper.
    fn fastrand_like(i: i64) -> i64 {
        (i.wrapping_mul(2654435761) ^ (i >> 3)).wrapping_rem_euclid(1_000_000)
    }

    #[test]
    fn decrease_key_below_current_min_becomes_next_extraction() {
        let mut heap = FibHeap::new();
        heap.insert(10, "a");
        heap.insert(20, "b");
        let c = heap.insert(30, "c");
        assert_eq!(heap.peek_min(), Some(&10));

        heap.decrease_key(c, 1);
        assert_eq!(heap.peek_min(), Some(&1));
        assert_eq!(heap.extract_min(), Some((1, "c")));
        assert_eq!(heap.extract_min(), Some((10, "a")));
        assert_eq!(heap.extract_min(), Some((20, "b")));
        assert_eq!(heap.extract_min(), None);
    }

    #[test]
    fn delete_removes_arbitrary_node() {
        let mut heap = FibHeap::new();
        let a = heap.insert(10, "a");
        heap.insert(20, "b");
        heap.insert(5, "c");

        let removed = heap.delete(a, i64::MIN);
        assert_eq!(removed, Some("a"));
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.extract_min(), Some((5, "c")));
        assert_eq!(heap.extract_min(), Some((20, "b")));
    }

    #[test]
    fn randomized_matches_a_sorted_reference() {
        let mut heap = FibHeap::new();
        let mut keys: Vec<i64> = (0..500).map(|_| fastrand::i64(0..100_000)).collect();
        for &k in &keys {
            heap.insert(k, k);
        }
        keys.sort_unstable();
        for expected in keys {
            assert_eq!(heap.extract_min(), Some((expected, expected)));
        }
    }
}
