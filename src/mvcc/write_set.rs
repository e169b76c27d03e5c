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

use crate::condition::Condition;
use crate::tree::PersistentMap;
use crate::tree::RangeIter;
use crate::Key;
use crate::Value;

/// Writes staged by one transaction, invisible to others until commit.
///
/// A `None` value is a tombstone. The last write to a key wins.
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    table: PersistentMap<Key, Option<Value>>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Key, value: Value) {
        self.table.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: Key) {
        self.table.insert(key, None);
    }

    /// `None`: not written by this transaction.
    /// `Some(None)`: deleted by this transaction.
    pub fn get(&self, key: &[u8]) -> Option<&Option<Value>> {
        self.table.get(key)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// All staged writes in ascending key order.
    pub fn iter(&self) -> RangeIter<Key, Option<Value>> {
        self.table.iter()
    }

    /// Staged writes selected by `condition`, in the condition's direction.
    pub fn range(&self, condition: &Condition) -> RangeIter<Key, Option<Value>> {
        let (lower, upper) = condition.read_range().to_std();
        self.table.range(lower, upper, condition.direction())
    }

    /// The written keys in ascending order.
    pub fn keys(&self) -> Vec<Key> {
        self.iter().map(|(k, _)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn b(x: &str) -> Vec<u8> {
        x.as_bytes().to_vec()
    }

    #[test]
    fn test_last_write_wins() {
        let mut ws = WriteSet::new();
        ws.put(b("a"), b("1"));
        ws.put(b("a"), b("2"));
        assert_eq!(ws.get(b"a"), Some(&Some(b("2"))));

        ws.delete(b("a"));
        assert_eq!(ws.get(b"a"), Some(&None));

        ws.put(b("a"), b("3"));
        assert_eq!(ws.get(b"a"), Some(&Some(b("3"))));
        assert_eq!(ws.len(), 1);

        assert_eq!(ws.get(b"b"), None);
    }

    #[test]
    fn test_range() {
        let mut ws = WriteSet::new();
        for k in ["1", "2", "3", "4", "5"] {
            ws.put(b(k), b(k));
        }
        ws.delete(b("3"));

        let got: Vec<_> = ws.range(&Condition::gte("2")).map(|(k, _)| k).collect();
        assert_eq!(got, vec![b("2"), b("3"), b("4"), b("5")]);

        let got: Vec<_> = ws.range(&Condition::lt("3")).collect();
        assert_eq!(got, vec![(b("2"), Some(b("2"))), (b("1"), Some(b("1")))]);

        assert_eq!(ws.keys().len(), 5);
    }
}
