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

//! Query conditions and the key ranges recorded for conflict validation.

use std::ops;

use serde::Deserialize;
use serde::Serialize;

use crate::errors::KvError;
use crate::Key;

/// One end of a key range. `key == None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bound {
    pub key: Option<Key>,
    pub inclusive: bool,
}

impl Bound {
    pub fn unbounded() -> Self {
        Self {
            key: None,
            inclusive: false,
        }
    }

    pub fn included(key: impl Into<Key>) -> Self {
        Self {
            key: Some(key.into()),
            inclusive: true,
        }
    }

    pub fn excluded(key: impl Into<Key>) -> Self {
        Self {
            key: Some(key.into()),
            inclusive: false,
        }
    }

    pub fn to_std(&self) -> ops::Bound<Key> {
        match (&self.key, self.inclusive) {
            (None, _) => ops::Bound::Unbounded,
            (Some(k), true) => ops::Bound::Included(k.clone()),
            (Some(k), false) => ops::Bound::Excluded(k.clone()),
        }
    }
}

/// Scan order of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A directional range query: exactly one bound, which also decides the order.
///
/// `Gt`/`Gte` scan ascending to the end of the keyspace,
/// `Lt`/`Lte` scan descending to the beginning of the keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Gt(Key),
    Gte(Key),
    Lt(Key),
    Lte(Key),
}

impl Condition {
    pub fn gt(key: impl Into<Key>) -> Self {
        Condition::Gt(key.into())
    }

    pub fn gte(key: impl Into<Key>) -> Self {
        Condition::Gte(key.into())
    }

    pub fn lt(key: impl Into<Key>) -> Self {
        Condition::Lt(key.into())
    }

    pub fn lte(key: impl Into<Key>) -> Self {
        Condition::Lte(key.into())
    }

    /// Scan everything in ascending order.
    pub fn all() -> Self {
        Condition::Gte(Key::new())
    }

    pub fn direction(&self) -> Direction {
        match self {
            Condition::Gt(_) | Condition::Gte(_) => Direction::Forward,
            Condition::Lt(_) | Condition::Lte(_) => Direction::Backward,
        }
    }

    pub fn key(&self) -> &Key {
        match self {
            Condition::Gt(k) | Condition::Gte(k) | Condition::Lt(k) | Condition::Lte(k) => k,
        }
    }

    /// The range of keys this condition selects, as `(lower, upper)` in key order.
    pub fn read_range(&self) -> ReadRange {
        match self {
            Condition::Gt(k) => ReadRange::new(Bound::excluded(k.clone()), Bound::unbounded()),
            Condition::Gte(k) => ReadRange::new(Bound::included(k.clone()), Bound::unbounded()),
            Condition::Lt(k) => ReadRange::new(Bound::unbounded(), Bound::excluded(k.clone())),
            Condition::Lte(k) => ReadRange::new(Bound::unbounded(), Bound::included(k.clone())),
        }
    }

    /// The part of this condition a scan observed if it stopped right after
    /// returning `last`.
    pub fn read_range_until(&self, last: &[u8]) -> ReadRange {
        let full = self.read_range();
        match self.direction() {
            Direction::Forward => ReadRange::new(full.lower, Bound::included(last)),
            Direction::Backward => ReadRange::new(Bound::included(last), full.upper),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        match self {
            Condition::Gt(k) => key > k.as_slice(),
            Condition::Gte(k) => key >= k.as_slice(),
            Condition::Lt(k) => key < k.as_slice(),
            Condition::Lte(k) => key <= k.as_slice(),
        }
    }
}

/// A loosely typed condition, as it arrives from a serialized request.
///
/// Convert it into a [`Condition`] with `TryFrom`; exactly one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionSpec {
    pub gt: Option<Key>,
    pub gte: Option<Key>,
    pub lt: Option<Key>,
    pub lte: Option<Key>,
}

impl TryFrom<ConditionSpec> for Condition {
    type Error = KvError;

    fn try_from(spec: ConditionSpec) -> Result<Self, Self::Error> {
        let ConditionSpec { gt, gte, lt, lte } = spec;

        let mut found = vec![];
        if let Some(k) = gt {
            found.push(Condition::Gt(k));
        }
        if let Some(k) = gte {
            found.push(Condition::Gte(k));
        }
        if let Some(k) = lt {
            found.push(Condition::Lt(k));
        }
        if let Some(k) = lte {
            found.push(Condition::Lte(k));
        }

        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(KvError::invalid_condition(
                "one of gt, gte, lt, lte is required",
            )),
            n => Err(KvError::invalid_condition(format!(
                "exactly one of gt, gte, lt, lte is allowed, got {}",
                n
            ))),
        }
    }
}

/// A key range a transaction observed, stored as `(lower, upper)` in key order.
///
/// A point read is `[key, key]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRange {
    pub lower: Bound,
    pub upper: Bound,
}

impl ReadRange {
    pub fn new(lower: Bound, upper: Bound) -> Self {
        Self { lower, upper }
    }

    pub fn point(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self::new(Bound::included(key.clone()), Bound::included(key))
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let above_lower = match &self.lower.key {
            None => true,
            Some(k) if self.lower.inclusive => key >= k.as_slice(),
            Some(k) => key > k.as_slice(),
        };

        let below_upper = match &self.upper.key {
            None => true,
            Some(k) if self.upper.inclusive => key <= k.as_slice(),
            Some(k) => key < k.as_slice(),
        };

        above_lower && below_upper
    }

    pub fn to_std(&self) -> (ops::Bound<Key>, ops::Bound<Key>) {
        (self.lower.to_std(), self.upper.to_std())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(gt: Option<&str>, gte: Option<&str>, lt: Option<&str>, lte: Option<&str>) -> ConditionSpec {
        let k = |x: Option<&str>| x.map(|s| s.as_bytes().to_vec());
        ConditionSpec {
            gt: k(gt),
            gte: k(gte),
            lt: k(lt),
            lte: k(lte),
        }
    }

    #[test]
    fn test_condition_from_spec() {
        let c = Condition::try_from(spec(None, Some("a"), None, None)).unwrap();
        assert_eq!(c, Condition::gte("a"));
        assert_eq!(c.direction(), Direction::Forward);

        let c = Condition::try_from(spec(None, None, Some("a"), None)).unwrap();
        assert_eq!(c, Condition::lt("a"));
        assert_eq!(c.direction(), Direction::Backward);
    }

    #[test]
    fn test_condition_from_spec_invalid() {
        let err = Condition::try_from(spec(None, None, None, None)).unwrap_err();
        assert!(matches!(err, KvError::InvalidCondition(_)));

        let err = Condition::try_from(spec(Some("a"), None, Some("z"), None)).unwrap_err();
        assert!(matches!(err, KvError::InvalidCondition(_)));
    }

    #[test]
    fn test_condition_contains() {
        assert!(Condition::gt("b").contains(b"c"));
        assert!(!Condition::gt("b").contains(b"b"));
        assert!(Condition::gte("b").contains(b"b"));
        assert!(Condition::lt("b").contains(b"a"));
        assert!(!Condition::lt("b").contains(b"b"));
        assert!(Condition::lte("b").contains(b"b"));
        assert!(Condition::all().contains(b""));
    }

    #[test]
    fn test_read_range_contains() {
        let r = ReadRange::point("b");
        assert!(r.contains(b"b"));
        assert!(!r.contains(b"a"));
        assert!(!r.contains(b"ba"));

        let r = ReadRange::new(Bound::excluded("b"), Bound::included("d"));
        assert!(!r.contains(b"b"));
        assert!(r.contains(b"c"));
        assert!(r.contains(b"d"));
        assert!(!r.contains(b"e"));

        let r = ReadRange::new(Bound::unbounded(), Bound::unbounded());
        assert!(r.contains(b""));
        assert!(r.contains(b"zzz"));
    }

    #[test]
    fn test_read_range_matches_condition() {
        for c in [
            Condition::gt("c"),
            Condition::gte("c"),
            Condition::lt("c"),
            Condition::lte("c"),
        ] {
            let r = c.read_range();
            for k in ["a", "b", "c", "cc", "d"] {
                assert_eq!(r.contains(k.as_bytes()), c.contains(k.as_bytes()), "{:?} {}", c, k);
            }
        }
    }

    #[test]
    fn test_read_range_until() {
        let r = Condition::gte("b").read_range_until(b"d");
        assert_eq!(r, ReadRange::new(Bound::included("b"), Bound::included("d")));

        let r = Condition::lt("x").read_range_until(b"m");
        assert_eq!(r, ReadRange::new(Bound::included("m"), Bound::excluded("x")));
    }

    #[test]
    fn test_condition_spec_deserialize_default() {
        let s = ConditionSpec::default();
        assert!(Condition::try_from(s).is_err());
    }
}
