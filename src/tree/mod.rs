// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A persistent ordered map.
//!
//! [`PersistentMap`] is an AVL tree whose nodes are immutable and shared through
//! `Arc`. An update copies only the path from the root to the changed node, so
//! it costs `O(log n)` and every clone taken before the update keeps seeing the
//! old content. A clone is therefore a snapshot: cheap, `Send + Sync`, and never
//! invalidated.

mod range_iter;

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

pub use range_iter::RangeIter;

use crate::condition::Direction;

type Link<K, V> = Option<Arc<Node<K, V>>>;

pub(crate) struct Node<K, V> {
    key: K,
    value: V,
    height: u32,
    left: Link<K, V>,
    right: Link<K, V>,
}

pub struct PersistentMap<K, V> {
    root: Link<K, V>,
    len: usize,
}

impl<K, V> Clone for PersistentMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for PersistentMap<K, V> {
    fn default() -> Self {
        Self { root: None, len: 0 }
    }
}

impl<K, V> fmt::Debug for PersistentMap<K, V>
where
    K: Ord + Clone + fmt::Debug,
    V: Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> PersistentMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cur = self.root.as_ref();
        while let Some(n) = cur {
            cur = match key.cmp(n.key.borrow()) {
                Ordering::Less => n.left.as_ref(),
                Ordering::Greater => n.right.as_ref(),
                Ordering::Equal => return Some(&n.value),
            };
        }
        None
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Insert or replace. Only this handle observes the change.
    pub fn insert(&mut self, key: K, value: V) {
        let (root, added) = insert_rec(&self.root, key, value);
        self.root = Some(root);
        if added {
            self.len += 1;
        }
    }

    /// Remove a key and return its value. Only this handle observes the change.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let (root, removed) = remove_rec(&self.root, key)?;
        self.root = root;
        self.len -= 1;
        Some(removed)
    }

    /// Iterate over all entries in ascending key order.
    pub fn iter(&self) -> RangeIter<K, V> {
        self.range(Bound::Unbounded, Bound::Unbounded, Direction::Forward)
    }

    /// Iterate over entries within `(lower, upper)` in the given direction.
    ///
    /// The iterator owns references to the nodes it visits, it is not tied to
    /// the lifetime of `self` and keeps iterating this version even if the map
    /// is updated meanwhile.
    pub fn range(&self, lower: Bound<K>, upper: Bound<K>, direction: Direction) -> RangeIter<K, V> {
        RangeIter::new(self.root.clone(), lower, upper, direction)
    }

    /// Returns `true` if both maps share the same root node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<K, V> FromIterator<(K, V)> for PersistentMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut m = Self::new();
        for (k, v) in iter {
            m.insert(k, v);
        }
        m
    }
}

fn height<K, V>(link: &Link<K, V>) -> u32 {
    link.as_ref().map(|n| n.height).unwrap_or(0)
}

fn make<K, V>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>> {
    let height = 1 + height(&left).max(height(&right));
    Arc::new(Node {
        key,
        value,
        height,
        left,
        right,
    })
}

/// Build a node from its parts, rotating once or twice if the heights of the
/// two subtrees differ by more than one.
fn balance<K, V>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>>
where
    K: Clone,
    V: Clone,
{
    let hl = height(&left);
    let hr = height(&right);

    if hl > hr + 1 {
        if let Some(l) = left.as_ref() {
            if height(&l.left) >= height(&l.right) {
                let new_right = make(key, value, l.right.clone(), right);
                return make(
                    l.key.clone(),
                    l.value.clone(),
                    l.left.clone(),
                    Some(new_right),
                );
            }
            if let Some(lr) = l.right.as_ref() {
                let new_left = make(l.key.clone(), l.value.clone(), l.left.clone(), lr.left.clone());
                let new_right = make(key, value, lr.right.clone(), right);
                return make(
                    lr.key.clone(),
                    lr.value.clone(),
                    Some(new_left),
                    Some(new_right),
                );
            }
        }
    } else if hr > hl + 1 {
        if let Some(r) = right.as_ref() {
            if height(&r.right) >= height(&r.left) {
                let new_left = make(key, value, left, r.left.clone());
                return make(
                    r.key.clone(),
                    r.value.clone(),
                    Some(new_left),
                    r.right.clone(),
                );
            }
            if let Some(rl) = r.left.as_ref() {
                let new_left = make(key, value, left, rl.left.clone());
                let new_right =
                    make(r.key.clone(), r.value.clone(), rl.right.clone(), r.right.clone());
                return make(
                    rl.key.clone(),
                    rl.value.clone(),
                    Some(new_left),
                    Some(new_right),
                );
            }
        }
    }

    make(key, value, left, right)
}

fn insert_rec<K, V>(link: &Link<K, V>, key: K, value: V) -> (Arc<Node<K, V>>, bool)
where
    K: Ord + Clone,
    V: Clone,
{
    let Some(n) = link else {
        return (make(key, value, None, None), true);
    };

    match key.cmp(&n.key) {
        Ordering::Less => {
            let (l, added) = insert_rec(&n.left, key, value);
            let node = balance(n.key.clone(), n.value.clone(), Some(l), n.right.clone());
            (node, added)
        }
        Ordering::Greater => {
            let (r, added) = insert_rec(&n.right, key, value);
            let node = balance(n.key.clone(), n.value.clone(), n.left.clone(), Some(r));
            (node, added)
        }
        Ordering::Equal => {
            let node = make(key, value, n.left.clone(), n.right.clone());
            (node, false)
        }
    }
}

/// Returns the new subtree and the removed value, or `None` if `key` is absent.
fn remove_rec<K, V, Q>(link: &Link<K, V>, key: &Q) -> Option<(Link<K, V>, V)>
where
    K: Ord + Clone + Borrow<Q>,
    V: Clone,
    Q: Ord + ?Sized,
{
    let n = link.as_ref()?;

    match key.cmp(n.key.borrow()) {
        Ordering::Less => {
            let (l, v) = remove_rec(&n.left, key)?;
            let node = balance(n.key.clone(), n.value.clone(), l, n.right.clone());
            Some((Some(node), v))
        }
        Ordering::Greater => {
            let (r, v) = remove_rec(&n.right, key)?;
            let node = balance(n.key.clone(), n.value.clone(), n.left.clone(), r);
            Some((Some(node), v))
        }
        Ordering::Equal => {
            let replaced = match (&n.left, &n.right) {
                (None, right) => right.clone(),
                (left, None) => left.clone(),
                (left, Some(right)) => {
                    let (k, v, rest) = remove_min(right);
                    Some(balance(k, v, left.clone(), rest))
                }
            };
            Some((replaced, n.value.clone()))
        }
    }
}

fn remove_min<K, V>(n: &Arc<Node<K, V>>) -> (K, V, Link<K, V>)
where
    K: Clone,
    V: Clone,
{
    match &n.left {
        None => (n.key.clone(), n.value.clone(), n.right.clone()),
        Some(l) => {
            let (k, v, rest) = remove_min(l);
            let node = balance(n.key.clone(), n.value.clone(), rest, n.right.clone());
            (k, v, Some(node))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;

    /// Verify the AVL invariant and return the height.
    fn check<K: Ord, V>(link: &Link<K, V>) -> u32 {
        let Some(n) = link else {
            return 0;
        };
        if let Some(l) = &n.left {
            assert!(l.key < n.key);
        }
        if let Some(r) = &n.right {
            assert!(r.key > n.key);
        }
        let hl = check(&n.left);
        let hr = check(&n.right);
        assert!(hl.abs_diff(hr) <= 1, "unbalanced: {} vs {}", hl, hr);
        assert_eq!(n.height, 1 + hl.max(hr));
        n.height
    }

    fn keys(it: RangeIter<u32, u32>) -> Vec<u32> {
        it.map(|(k, _)| k).collect()
    }

    #[test]
    fn test_insert_get() {
        let mut m = PersistentMap::new();
        for i in 0..100u32 {
            m.insert(i, i * 10);
        }
        check(&m.root);

        assert_eq!(m.len(), 100);
        assert_eq!(m.get(&7), Some(&70));
        assert_eq!(m.get(&100), None);

        m.insert(7, 1);
        assert_eq!(m.len(), 100);
        assert_eq!(m.get(&7), Some(&1));
    }

    #[test]
    fn test_remove() {
        let mut m: PersistentMap<u32, u32> = (0..64).map(|i| (i, i)).collect();

        for i in (0..64).step_by(3) {
            assert_eq!(m.remove(&i), Some(i));
            check(&m.root);
        }
        assert_eq!(m.remove(&0), None);
        assert_eq!(m.len(), 64 - 22);

        let want: Vec<u32> = (0..64).filter(|i| i % 3 != 0).collect();
        assert_eq!(keys(m.iter()), want);
    }

    #[test]
    fn test_clone_is_snapshot() {
        let mut m: PersistentMap<u32, &str> = [(1, "a"), (2, "b"), (3, "c")].into_iter().collect();
        let snap = m.clone();
        assert!(snap.ptr_eq(&m));

        m.insert(2, "x");
        m.remove(&3);
        m.insert(4, "d");

        assert!(!snap.ptr_eq(&m));
        assert_eq!(snap.get(&2), Some(&"b"));
        assert_eq!(snap.get(&3), Some(&"c"));
        assert_eq!(snap.get(&4), None);
        assert_eq!(snap.len(), 3);

        assert_eq!(m.get(&2), Some(&"x"));
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn test_iterator_outlives_update() {
        let mut m: PersistentMap<u32, u32> = (0..5).map(|i| (i, i)).collect();
        let it = m.iter();
        m.insert(10, 10);
        m.remove(&0);
        assert_eq!(keys(it), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_range_forward() {
        let m: PersistentMap<u32, u32> = (1..=5).map(|i| (i, i)).collect();

        let got = keys(m.range(Bound::Included(2), Bound::Unbounded, Direction::Forward));
        assert_eq!(got, vec![2, 3, 4, 5]);

        let got = keys(m.range(Bound::Excluded(2), Bound::Excluded(5), Direction::Forward));
        assert_eq!(got, vec![3, 4]);

        let got = keys(m.range(Bound::Excluded(5), Bound::Unbounded, Direction::Forward));
        assert!(got.is_empty());
    }

    #[test]
    fn test_range_backward() {
        let m: PersistentMap<u32, u32> = (1..=5).map(|i| (i, i)).collect();

        let got = keys(m.range(Bound::Unbounded, Bound::Excluded(3), Direction::Backward));
        assert_eq!(got, vec![2, 1]);

        let got = keys(m.range(Bound::Included(2), Bound::Included(4), Direction::Backward));
        assert_eq!(got, vec![4, 3, 2]);

        let got = keys(m.range(Bound::Unbounded, Bound::Excluded(1), Direction::Backward));
        assert!(got.is_empty());
    }

    #[test]
    fn test_against_btreemap() {
        let mut m = PersistentMap::new();
        let mut expected = BTreeMap::new();

        // A deterministic pseudo random sequence of inserts and removes.
        let mut x: u64 = 17;
        for _ in 0..2000 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let k = ((x >> 33) % 200) as u32;
            if (x >> 20) % 3 == 0 {
                assert_eq!(m.remove(&k), expected.remove(&k));
            } else {
                m.insert(k, k + 1);
                expected.insert(k, k + 1);
            }
        }
        check(&m.root);

        assert_eq!(m.len(), expected.len());
        let got: Vec<_> = m.iter().collect();
        let want: Vec<_> = expected.into_iter().collect();
        assert_eq!(got, want);
    }
}
