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

use std::collections::BTreeMap;
use std::io;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::condition::Direction;

/// A single mutation of a raw store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawWrite {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// An ordered byte-string store without versioning, the substrate of
/// [`PersistentStore`](crate::impls::persistent::PersistentStore).
#[async_trait::async_trait]
pub trait RawStore: Send + Sync + 'static {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, io::Error>;

    /// Return at most `limit` rows within `(lower, upper)` in `direction` order.
    ///
    /// The store never passes a range whose lower end is above its upper end.
    async fn scan(
        &self,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, io::Error>;

    /// Apply all writes atomically.
    async fn write(&self, batch: Vec<RawWrite>) -> Result<(), io::Error>;

    async fn close(&self) -> Result<(), io::Error> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T> RawStore for Arc<T>
where T: RawStore
{
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, io::Error> {
        (**self).get(key).await
    }

    async fn scan(
        &self,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, io::Error> {
        (**self).scan(lower, upper, direction, limit).await
    }

    async fn write(&self, batch: Vec<RawWrite>) -> Result<(), io::Error> {
        (**self).write(batch).await
    }

    async fn close(&self) -> Result<(), io::Error> {
        (**self).close().await
    }
}

/// An in-process [`RawStore`]. Clones share the same data, so a store can be
/// reopened over it to simulate a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryRawStore {
    data: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryRawStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl RawStore for MemoryRawStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, io::Error> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(key).cloned())
    }

    async fn scan(
        &self,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, io::Error> {
        if is_empty_range(&lower, &upper) {
            return Ok(vec![]);
        }

        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let it = data.range((lower, upper));
        let rows = match direction {
            Direction::Forward => it.take(limit).map(|(k, v)| (k.clone(), v.clone())).collect(),
            Direction::Backward => it
                .rev()
                .take(limit)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        Ok(rows)
    }

    async fn write(&self, batch: Vec<RawWrite>) -> Result<(), io::Error> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        for w in batch {
            match w {
                RawWrite::Put(k, v) => {
                    data.insert(k, v);
                }
                RawWrite::Delete(k) => {
                    data.remove(&k);
                }
            }
        }
        Ok(())
    }
}

/// `BTreeMap::range` panics on a range with start > end, or an excluded
/// start equal to the end.
fn is_empty_range(lower: &Bound<Vec<u8>>, upper: &Bound<Vec<u8>>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}
