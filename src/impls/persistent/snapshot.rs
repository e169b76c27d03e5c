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

use std::collections::VecDeque;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use futures_util::StreamExt;

use crate::condition::Condition;
use crate::condition::Direction;
use crate::errors::KvError;
use crate::impls::persistent::encoding;
use crate::impls::persistent::raw::RawStore;
use crate::liveness::Liveness;
use crate::marked::Marked;
use crate::mvcc::SnapshotRead;
use crate::Key;
use crate::KvResultStream;
use crate::Value;
use crate::Version;

/// The committed keyspace of a raw store as of one version.
pub struct PersistentSnapshot<R> {
    raw: Arc<R>,
    version: Version,
    page_size: usize,
}

impl<R> fmt::Debug for PersistentSnapshot<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentSnapshot")
            .field("version", &self.version)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl<R> Clone for PersistentSnapshot<R> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            version: self.version,
            page_size: self.page_size,
        }
    }
}

impl<R: RawStore> PersistentSnapshot<R> {
    pub(crate) fn new(raw: Arc<R>, version: Version, page_size: usize) -> Self {
        Self {
            raw,
            version,
            page_size,
        }
    }

    /// The newest record of `key` visible at this version, tombstones included.
    pub async fn get_marked(&self, key: &[u8]) -> Result<Option<Marked>, KvError> {
        let lower = Bound::Included(encoding::data_seek_key(key, self.version));
        let upper = Bound::Included(encoding::data_key_end(key));

        let rows = self.raw.scan(lower, upper, Direction::Forward, 1).await?;
        let Some((raw_key, raw_value)) = rows.into_iter().next() else {
            return Ok(None);
        };

        let (k, marked) = encoding::decode_data_row(&raw_key, raw_value)?;
        debug_assert_eq!(k, key);
        debug_assert!(marked.version() <= self.version);
        Ok(Some(marked))
    }
}

#[async_trait::async_trait]
impl<R: RawStore> SnapshotRead for PersistentSnapshot<R> {
    fn version(&self) -> Version {
        self.version
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Value>, KvError> {
        let marked = self.get_marked(key).await?;
        Ok(marked.and_then(|m| m.into_value()))
    }

    async fn query(
        &self,
        condition: Condition,
        liveness: Arc<dyn Liveness>,
    ) -> Result<KvResultStream, KvError> {
        let (lower, upper) = encoding::data_range(&condition.read_range());

        let cursor = Cursor {
            raw: self.raw.clone(),
            version: self.version,
            page_size: self.page_size,
            direction: condition.direction(),
            lower,
            upper,
            exhausted: false,
            ready: VecDeque::new(),
            last_key: None,
            pending: None,
            liveness,
        };

        let strm = futures::stream::try_unfold(cursor, |mut cursor| async move {
            loop {
                cursor.liveness.check()?;

                if let Some(kv) = cursor.ready.pop_front() {
                    return Ok::<_, KvError>(Some((kv, cursor)));
                }
                if cursor.exhausted {
                    return Ok(None);
                }
                cursor.next_page().await?;
            }
        });

        Ok(strm.boxed())
    }
}

/// Pages through data rows, resolving each logical key to its newest version
/// visible at `version`.
struct Cursor<R> {
    raw: Arc<R>,
    version: Version,
    page_size: usize,
    direction: Direction,

    /// The raw range not yet fetched.
    lower: Bound<Vec<u8>>,
    upper: Bound<Vec<u8>>,
    exhausted: bool,

    /// Resolved entries not yet yielded.
    ready: VecDeque<(Key, Value)>,

    /// Forward scan: the last key resolved, its older rows are skipped.
    last_key: Option<Key>,

    /// Backward scan: rows of a key arrive oldest first, the newest visible one
    /// seen so far is held here until the key changes.
    pending: Option<(Key, Marked)>,

    liveness: Arc<dyn Liveness>,
}

impl<R: RawStore> Cursor<R> {
    async fn next_page(&mut self) -> Result<(), KvError> {
        let rows = self
            .raw
            .scan(
                self.lower.clone(),
                self.upper.clone(),
                self.direction,
                self.page_size,
            )
            .await?;

        if rows.len() < self.page_size {
            self.exhausted = true;
        }

        if let Some((last_raw, _)) = rows.last() {
            match self.direction {
                Direction::Forward => self.lower = Bound::Excluded(last_raw.clone()),
                Direction::Backward => self.upper = Bound::Excluded(last_raw.clone()),
            }
        }

        for (raw_key, raw_value) in rows {
            let (key, marked) = encoding::decode_data_row(&raw_key, raw_value)?;

            // Too new, this snapshot should not see it.
            if marked.version() > self.version {
                continue;
            }

            match self.direction {
                Direction::Forward => self.accept_forward(key, marked),
                Direction::Backward => self.accept_backward(key, marked),
            }
        }

        if self.exhausted {
            if let Some((key, marked)) = self.pending.take() {
                self.push(key, marked);
            }
        }

        Ok(())
    }

    fn accept_forward(&mut self, key: Key, marked: Marked) {
        // Skip older records of a key already resolved.
        if self.last_key.as_ref() == Some(&key) {
            return;
        }
        self.last_key = Some(key.clone());
        self.push(key, marked);
    }

    fn accept_backward(&mut self, key: Key, marked: Marked) {
        match self.pending.take() {
            Some((pending_key, _older)) if pending_key == key => {
                self.pending = Some((key, marked));
            }
            Some((pending_key, pending_marked)) => {
                self.push(pending_key, pending_marked);
                self.pending = Some((key, marked));
            }
            None => {
                self.pending = Some((key, marked));
            }
        }
    }

    /// Queue a resolved key unless it is deleted.
    fn push(&mut self, key: Key, marked: Marked) {
        if let Some(value) = marked.into_value() {
            self.ready.push_back((key, value));
        }
    }
}
