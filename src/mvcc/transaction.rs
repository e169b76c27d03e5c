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

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use futures_util::TryStreamExt;

use crate::condition::Condition;
use crate::errors::KvError;
use crate::liveness::Liveness;
use crate::mvcc::backend::Backend;
use crate::mvcc::backend::RunningTxn;
use crate::mvcc::engine::Shared;
use crate::mvcc::read_tracker::ReadTracker;
use crate::mvcc::snapshot::SnapshotRead;
use crate::mvcc::write_set::WriteSet;
use crate::util;
use crate::Key;
use crate::KvResultStream;
use crate::Value;
use crate::Version;

/// A read-write transaction bound to the snapshot at its read version.
///
/// Reads see the snapshot overlaid with this transaction's own staged writes,
/// and every read is recorded for validation at commit.
pub struct Transaction<B: Backend> {
    running: RunningTxn,
    snapshot: B::Snapshot,
    writes: WriteSet,
    reads: ReadTracker,

    backend: Arc<B>,
    shared: Arc<Shared>,
    liveness: Arc<dyn Liveness>,
    heartbeat_interval: Duration,
    last_heartbeat: Instant,
}

impl<B: Backend> fmt::Debug for Transaction<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("running", &self.running)
            .field("writes", &self.writes)
            .field("reads", &self.reads)
            .finish()
    }
}

impl<B: Backend> Transaction<B> {
    pub(crate) fn new(
        running: RunningTxn,
        snapshot: B::Snapshot,
        backend: Arc<B>,
        shared: Arc<Shared>,
        liveness: Arc<dyn Liveness>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            running,
            snapshot,
            writes: WriteSet::new(),
            reads: ReadTracker::new(),
            backend,
            shared,
            liveness,
            heartbeat_interval,
            last_heartbeat: Instant::now(),
        }
    }

    pub fn read_version(&self) -> Version {
        self.running.read_version
    }

    pub fn running(&self) -> &RunningTxn {
        &self.running
    }

    pub fn writes(&self) -> &WriteSet {
        &self.writes
    }

    pub fn reads(&self) -> &ReadTracker {
        &self.reads
    }

    pub(crate) fn into_parts(self) -> (RunningTxn, ReadTracker, WriteSet) {
        (self.running, self.reads, self.writes)
    }

    async fn prepare_read(&mut self) -> Result<(), KvError> {
        self.shared.check_open()?;
        self.liveness.check()?;

        if self.last_heartbeat.elapsed() >= self.heartbeat_interval {
            self.backend.heartbeat(&self.running).await?;
            self.last_heartbeat = Instant::now();
        }
        Ok(())
    }

    pub async fn get(&mut self, key: &[u8]) -> Result<Option<Value>, KvError> {
        self.prepare_read().await?;
        self.reads.record_point(key);

        if let Some(staged) = self.writes.get(key) {
            return Ok(staged.clone());
        }

        self.snapshot.get(key).await
    }

    /// Convenience method to get multiple keys at once.
    pub async fn get_many(&mut self, keys: &[Key]) -> Result<Vec<Option<Value>>, KvError> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    /// Scan the keys selected by `condition`, including this transaction's
    /// own uncommitted writes.
    ///
    /// The whole range of the condition is recorded as read.
    pub async fn query(&mut self, condition: Condition) -> Result<KvResultStream, KvError> {
        self.prepare_read().await?;
        self.reads.record(condition.read_range());
        self.merged(condition).await
    }

    /// Like [`query`](Self::query) but return at most `limit` entries.
    ///
    /// If the limit is reached only the part of the range up to the last
    /// returned key is recorded as read.
    pub async fn scan(
        &mut self,
        condition: Condition,
        limit: usize,
    ) -> Result<Vec<(Key, Value)>, KvError> {
        self.prepare_read().await?;

        let strm = self.merged(condition.clone()).await?;
        let got = take(strm, limit).await?;

        let range = match got.last() {
            Some((last, _)) if got.len() == limit => condition.read_range_until(last),
            _ => condition.read_range(),
        };
        self.reads.record(range);

        Ok(got)
    }

    async fn merged(&self, condition: Condition) -> Result<KvResultStream, KvError> {
        let staged = self.writes.range(&condition).collect::<Vec<_>>();
        let direction = condition.direction();
        let base = self.snapshot.query(condition, self.liveness.clone()).await?;
        let merged = util::merge_staged(base, staged, direction);

        // Staged entries are yielded even when the base is exhausted.
        Ok(util::with_liveness(merged, self.liveness.clone()))
    }

    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), KvError> {
        self.shared.check_open()?;
        self.writes.put(key.into(), value.into());
        Ok(())
    }

    pub fn delete(&mut self, key: impl Into<Key>) -> Result<(), KvError> {
        self.shared.check_open()?;
        self.writes.delete(key.into());
        Ok(())
    }
}

/// A read-only transaction. It never writes, thus never conflicts.
pub struct TransactionReadonly<B: Backend> {
    running: RunningTxn,
    snapshot: B::Snapshot,
    shared: Arc<Shared>,
    liveness: Arc<dyn Liveness>,
}

impl<B: Backend> fmt::Debug for TransactionReadonly<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionReadonly")
            .field("running", &self.running)
            .finish()
    }
}

impl<B: Backend> TransactionReadonly<B> {
    pub(crate) fn new(
        running: RunningTxn,
        snapshot: B::Snapshot,
        shared: Arc<Shared>,
        liveness: Arc<dyn Liveness>,
    ) -> Self {
        Self {
            running,
            snapshot,
            shared,
            liveness,
        }
    }

    pub fn read_version(&self) -> Version {
        self.running.read_version
    }

    fn prepare_read(&self) -> Result<(), KvError> {
        self.shared.check_open()?;
        self.liveness.check()
    }

    pub async fn get(&self, key: &[u8]) -> Result<Option<Value>, KvError> {
        self.prepare_read()?;
        self.snapshot.get(key).await
    }

    pub async fn query(&self, condition: Condition) -> Result<KvResultStream, KvError> {
        self.prepare_read()?;
        self.snapshot.query(condition, self.liveness.clone()).await
    }

    pub async fn scan(
        &self,
        condition: Condition,
        limit: usize,
    ) -> Result<Vec<(Key, Value)>, KvError> {
        let strm = self.query(condition).await?;
        take(strm, limit).await
    }
}

async fn take(mut strm: KvResultStream, limit: usize) -> Result<Vec<(Key, Value)>, KvError> {
    let mut got = Vec::new();
    while got.len() < limit {
        let Some(kv) = strm.try_next().await? else {
            break;
        };
        got.push(kv);
    }
    Ok(got)
}
