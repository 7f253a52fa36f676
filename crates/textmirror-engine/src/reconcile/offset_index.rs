//! Fenwick tree over node locations.
//!
//! Slots are nodes in document order. Each slot keeps a base location and the
//! tree stores pending shifts as a difference array, so "shift every slot from
//! `p` on by `d`" is a single point update and reading a location is a prefix
//! sum. Both are O(log n).

use crate::model::NodeKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetIndex {
    keys: Vec<NodeKey>,
    base: Vec<i64>,
    /// 1-based Fenwick array; `tree[0]` is unused.
    tree: Vec<i64>,
}

fn lowbit(i: usize) -> usize {
    i & i.wrapping_neg()
}

impl Default for OffsetIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl OffsetIndex {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            base: Vec::new(),
            tree: vec![0],
        }
    }

    /// Build from `(key, location)` pairs in document order. O(n).
    pub fn from_locations(entries: impl IntoIterator<Item = (NodeKey, usize)>) -> Self {
        let mut index = Self::new();
        for (key, location) in entries {
            index.keys.push(key);
            index.base.push(location as i64);
            index.tree.push(0);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_at(&self, slot: usize) -> Option<NodeKey> {
        self.keys.get(slot).copied()
    }

    pub fn keys(&self) -> &[NodeKey] {
        &self.keys
    }

    fn prefix(&self, mut i: usize) -> i64 {
        let mut sum = 0;
        while i > 0 {
            sum += self.tree[i];
            i -= lowbit(i);
        }
        sum
    }

    /// Location of the node in `slot`.
    pub fn location(&self, slot: usize) -> Option<usize> {
        let base = *self.base.get(slot)?;
        let location = base + self.prefix(slot + 1);
        usize::try_from(location).ok()
    }

    /// Shift the location of every slot at or after `slot` by `delta`.
    pub fn add_from(&mut self, slot: usize, delta: i64) {
        if delta == 0 {
            return;
        }
        let mut i = slot + 1;
        while i < self.tree.len() {
            self.tree[i] += delta;
            i += lowbit(i);
        }
    }

    /// Append a slot at the end. O(log n).
    pub fn push(&mut self, key: NodeKey, location: usize) {
        let i = self.keys.len() + 1;
        // The new difference entry is zero, so its Fenwick cell only has to
        // cover the entries below it: prefix(i - 1) - prefix(i - lowbit(i)).
        let before = self.prefix(i - 1);
        let cell = before - self.prefix(i - lowbit(i));
        self.keys.push(key);
        self.base.push(location as i64 - before);
        self.tree.push(cell);
    }

    /// Insert slots before `slot`. Appending at the end stays O(log n) per
    /// entry; anywhere else the index is rebuilt in O(n).
    pub fn insert(&mut self, slot: usize, entries: &[(NodeKey, usize)]) {
        if slot >= self.keys.len() {
            for &(key, location) in entries {
                self.push(key, location);
            }
            return;
        }
        let mut all = self.entries();
        all.splice(slot..slot, entries.iter().copied());
        *self = Self::from_locations(all);
    }

    /// Every `(key, location)` in slot order.
    pub fn entries(&self) -> Vec<(NodeKey, usize)> {
        (0..self.keys.len())
            .filter_map(|slot| Some((self.keys[slot], self.location(slot)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn index(locations: &[usize]) -> OffsetIndex {
        OffsetIndex::from_locations(
            locations
                .iter()
                .enumerate()
                .map(|(i, &loc)| (NodeKey(i as u32), loc)),
        )
    }

    fn locations(index: &OffsetIndex) -> Vec<usize> {
        index.entries().into_iter().map(|(_, loc)| loc).collect()
    }

    #[test]
    fn test_add_from_shifts_suffix() {
        let mut index = index(&[0, 2, 4, 6, 8]);
        index.add_from(2, 3);
        assert_eq!(locations(&index), vec![0, 2, 7, 9, 11]);
        index.add_from(1, -1);
        assert_eq!(locations(&index), vec![0, 1, 6, 8, 10]);
    }

    #[test]
    fn test_add_past_end_is_noop() {
        let mut index = index(&[0, 1]);
        index.add_from(5, 10);
        assert_eq!(locations(&index), vec![0, 1]);
    }

    #[test]
    fn test_push_after_shifts() {
        let mut index = index(&[0, 2, 4]);
        index.add_from(1, 5);
        index.push(NodeKey(10), 20);
        index.push(NodeKey(11), 25);
        assert_eq!(locations(&index), vec![0, 7, 9, 20, 25]);

        index.add_from(3, 1);
        assert_eq!(locations(&index), vec![0, 7, 9, 21, 26]);
        assert_eq!(index.key_at(4), Some(NodeKey(11)));
    }

    #[test]
    fn test_insert_in_the_middle_rebuilds() {
        let mut index = index(&[0, 2, 4]);
        index.add_from(2, 1);
        index.insert(1, &[(NodeKey(7), 1), (NodeKey(8), 2)]);
        assert_eq!(locations(&index), vec![0, 1, 2, 2, 5]);
        assert_eq!(
            index.keys(),
            &[NodeKey(0), NodeKey(7), NodeKey(8), NodeKey(1), NodeKey(2)]
        );
    }

    #[test]
    fn test_many_pushes_match_naive_model() {
        let mut index = OffsetIndex::new();
        let mut naive: Vec<usize> = Vec::new();
        for i in 0..100usize {
            index.push(NodeKey(i as u32), i * 3);
            naive.push(i * 3);
            if i % 7 == 0 {
                let from = i / 2;
                index.add_from(from, 2);
                for loc in &mut naive[from..] {
                    *loc += 2;
                }
            }
        }
        assert_eq!(locations(&index), naive);
    }
}
