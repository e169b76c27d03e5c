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

use crate::condition::ReadRange;
use crate::Key;

/// The read footprint of a transaction: one range per `get` or `query`.
///
/// Ranges are not deduplicated.
#[derive(Debug, Clone, Default)]
pub struct ReadTracker {
    ranges: Vec<ReadRange>,
}

impl ReadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, range: ReadRange) {
        self.ranges.push(range);
    }

    pub fn record_point(&mut self, key: impl Into<Key>) {
        self.record(ReadRange::point(key));
    }

    pub fn ranges(&self) -> &[ReadRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Whether any recorded range covers `key`.
    pub fn covers(&self, key: &[u8]) -> bool {
        self.ranges.iter().any(|r| r.contains(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;

    #[test]
    fn test_covers() {
        let mut t = ReadTracker::new();
        assert!(!t.covers(b"a"));

        t.record_point(b"b".to_vec());
        t.record_point(b"b".to_vec());
        t.record(Condition::gt("m").read_range());
        assert_eq!(t.len(), 3);

        assert!(t.covers(b"b"));
        assert!(!t.covers(b"c"));
        assert!(!t.covers(b"m"));
        assert!(t.covers(b"n"));
    }
}
