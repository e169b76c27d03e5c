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

use std::ops::Bound;
use std::sync::Arc;

use crate::condition::Direction;
use crate::tree::Link;
use crate::tree::Node;

/// An owning in-order iterator over a range of a [`PersistentMap`](crate::tree::PersistentMap).
pub struct RangeIter<K, V> {
    /// Nodes yet to be yielded, the next one on top.
    stack: Vec<Arc<Node<K, V>>>,
    lower: Bound<K>,
    upper: Bound<K>,
    direction: Direction,
}

impl<K, V> RangeIter<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    pub(crate) fn new(root: Link<K, V>, lower: Bound<K>, upper: Bound<K>, direction: Direction) -> Self {
        let mut it = Self {
            stack: vec![],
            lower,
            upper,
            direction,
        };
        it.seek(root);
        it
    }

    /// Push the path to the first node in scan order that is within the
    /// starting bound.
    fn seek(&mut self, mut cur: Link<K, V>) {
        while let Some(n) = cur {
            match self.direction {
                Direction::Forward => {
                    if above_lower(&n.key, &self.lower) {
                        cur = n.left.clone();
                        self.stack.push(n);
                    } else {
                        cur = n.right.clone();
                    }
                }
                Direction::Backward => {
                    if below_upper(&n.key, &self.upper) {
                        cur = n.right.clone();
                        self.stack.push(n);
                    } else {
                        cur = n.left.clone();
                    }
                }
            }
        }
    }

    /// Push the leftmost (or rightmost) chain of a subtree.
    fn descend(&mut self, mut cur: Link<K, V>) {
        while let Some(n) = cur {
            cur = match self.direction {
                Direction::Forward => n.left.clone(),
                Direction::Backward => n.right.clone(),
            };
            self.stack.push(n);
        }
    }
}

impl<K, V> Iterator for RangeIter<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.stack.pop()?;

        let within = match self.direction {
            Direction::Forward => below_upper(&n.key, &self.upper),
            Direction::Backward => above_lower(&n.key, &self.lower),
        };

        if !within {
            // Every remaining node is further away in scan order.
            self.stack.clear();
            return None;
        }

        match self.direction {
            Direction::Forward => self.descend(n.right.clone()),
            Direction::Backward => self.descend(n.left.clone()),
        }

        Some((n.key.clone(), n.value.clone()))
    }
}

fn above_lower<K: Ord>(key: &K, lower: &Bound<K>) -> bool {
    match lower {
        Bound::Included(b) => key >= b,
        Bound::Excluded(b) => key > b,
        Bound::Unbounded => true,
    }
}

fn below_upper<K: Ord>(key: &K, upper: &Bound<K>) -> bool {
    match upper {
        Bound::Included(b) => key <= b,
        Bound::Excluded(b) => key < b,
        Bound::Unbounded => true,
    }
}
