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

//! The in-memory reference backend.
//!
//! Every committed version is a root of a [`PersistentMap`]; a snapshot is a
//! clone of the root at its version and is never affected by later commits.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use futures_util::StreamExt;
use log::debug;
use log::warn;

use crate::condition::Condition;
use crate::errors::KvError;
use crate::liveness::Liveness;
use crate::mvcc::conflict;
use crate::mvcc::Backend;
use crate::mvcc::ReadTracker;
use crate::mvcc::RunningTxn;
use crate::mvcc::SnapshotRead;
use crate::mvcc::StoreStats;
use crate::mvcc::TxnId;
use crate::mvcc::WriteSet;
use crate::tree::PersistentMap;
use crate::util;
use crate::Key;
use crate::KvResultStream;
use crate::Value;
use crate::Version;

/// The only mutable state shared between transactions.
#[derive(Debug, Default)]
struct VersionState {
    version: Version,
    data: PersistentMap<Key, Value>,

    /// Keys written by each commit, for validating transactions that began
    /// before it.
    commit_log: BTreeMap<Version, Vec<Key>>,

    running: BTreeSet<RunningTxn>,
    last_txn_id: TxnId,
}

impl VersionState {
    /// Drop every commit-log entry at or below the smallest running read
    /// version: no running transaction validates against them.
    fn gc(&mut self) {
        let threshold = self
            .running
            .first()
            .map(|r| r.read_version)
            .unwrap_or(self.version);

        let kept = self.commit_log.split_off(&(threshold + 1));
        let dropped = std::mem::replace(&mut self.commit_log, kept);

        if !dropped.is_empty() {
            debug!(
                "gc: dropped {} commit log entries upto version {}",
                dropped.len(),
                threshold
            );
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<VersionState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, VersionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Backend for MemoryStore {
    type Snapshot = MemorySnapshot;

    async fn begin(&self) -> Result<(RunningTxn, MemorySnapshot), KvError> {
        let mut state = self.state();

        state.last_txn_id += 1;
        let running = RunningTxn::new(state.version, state.last_txn_id);
        state.running.insert(running);

        let snapshot = MemorySnapshot {
            version: state.version,
            data: state.data.clone(),
        };
        Ok((running, snapshot))
    }

    async fn commit(
        &self,
        running: &RunningTxn,
        reads: &ReadTracker,
        writes: WriteSet,
    ) -> Result<Version, KvError> {
        let mut state = self.state();

        if !state.running.contains(running) {
            return Err(KvError::closed(format!("{} is not running", running)));
        }

        let committed = state
            .commit_log
            .range(running.read_version + 1..)
            .flat_map(|(v, keys)| keys.iter().map(move |k| (*v, k.as_slice())));
        conflict::validate(running.read_version, reads, committed)?;

        state.version += 1;
        let version = state.version;

        let mut keys = Vec::with_capacity(writes.len());
        for (key, value) in writes.iter() {
            match value {
                Some(v) => state.data.insert(key.clone(), v),
                None => {
                    state.data.remove(&key);
                }
            }
            keys.push(key);
        }
        state.commit_log.insert(version, keys);

        Ok(version)
    }

    async fn end(&self, running: &RunningTxn) -> Result<(), KvError> {
        let mut state = self.state();
        if !state.running.remove(running) {
            warn!("end: {} is not running", running);
        }
        state.gc();
        Ok(())
    }

    fn abandon(&self, running: &RunningTxn) {
        let mut state = self.state();
        if state.running.remove(running) {
            debug!("abandon: {}", running);
            state.gc();
        }
    }

    async fn stats(&self) -> Result<StoreStats, KvError> {
        let state = self.state();
        Ok(StoreStats {
            version: state.version,
            commit_log_entries: state.commit_log.len(),
            running: state.running.len(),
        })
    }
}

/// The committed keyspace at one version.
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    version: Version,
    data: PersistentMap<Key, Value>,
}

#[async_trait::async_trait]
impl SnapshotRead for MemorySnapshot {
    fn version(&self) -> Version {
        self.version
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Value>, KvError> {
        Ok(self.data.get(key).cloned())
    }

    async fn query(
        &self,
        condition: Condition,
        liveness: Arc<dyn Liveness>,
    ) -> Result<KvResultStream, KvError> {
        let (lower, upper) = condition.read_range().to_std();
        let it = self.data.range(lower, upper, condition.direction());

        let strm = futures::stream::iter(it).map(Ok).boxed();
        Ok(util::with_liveness(strm, liveness))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::liveness::AlwaysAlive;

    fn b(x: &str) -> Vec<u8> {
        x.as_bytes().to_vec()
    }

    fn writes(kvs: &[(&str, Option<&str>)]) -> WriteSet {
        let mut ws = WriteSet::new();
        for (k, v) in kvs {
            match v {
                Some(v) => ws.put(b(k), b(v)),
                None => ws.delete(b(k)),
            }
        }
        ws
    }

    async fn commit(store: &MemoryStore, kvs: &[(&str, Option<&str>)]) -> Result<Version, KvError> {
        let (running, _snap) = store.begin().await?;
        let res = store.commit(&running, &ReadTracker::new(), writes(kvs)).await;
        store.end(&running).await?;
        res
    }

    #[tokio::test]
    async fn test_versions_start_at_one() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        assert_eq!(store.stats().await?.version, 0);

        assert_eq!(commit(&store, &[("a", Some("1"))]).await?, 1);
        assert_eq!(commit(&store, &[("b", Some("2"))]).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_snapshot_is_stable() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        commit(&store, &[("a", Some("1")), ("b", Some("2"))]).await?;

        let (running, snap) = store.begin().await?;
        assert_eq!(snap.version(), 1);

        commit(&store, &[("a", Some("x")), ("b", None), ("c", Some("3"))]).await?;

        assert_eq!(snap.get(b"a").await?, Some(b("1")));
        assert_eq!(snap.get(b"b").await?, Some(b("2")));
        assert_eq!(snap.get(b"c").await?, None);

        let all: Vec<_> = snap
            .query(Condition::all(), Arc::new(AlwaysAlive))
            .await?
            .try_collect()
            .await?;
        assert_eq!(all, vec![(b("a"), b("1")), (b("b"), b("2"))]);

        store.end(&running).await?;

        let (running, snap) = store.begin().await?;
        assert_eq!(snap.version(), 2);
        assert_eq!(snap.get(b"a").await?, Some(b("x")));
        assert_eq!(snap.get(b"b").await?, None);
        store.end(&running).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_query_directions() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        commit(
            &store,
            &[("1", Some("a")), ("2", Some("b")), ("3", Some("c")), ("4", Some("d")), ("5", Some("e"))],
        )
        .await?;

        let (running, snap) = store.begin().await?;

        let keys = |c: Condition| {
            let snap = snap.clone();
            async move {
                let got: Vec<(Key, Value)> = snap.query(c, Arc::new(AlwaysAlive)).await?.try_collect().await?;
                Ok::<_, KvError>(got.into_iter().map(|(k, _)| k).collect::<Vec<_>>())
            }
        };

        assert_eq!(keys(Condition::gte("2")).await?, vec![b("2"), b("3"), b("4"), b("5")]);
        assert_eq!(keys(Condition::gt("2")).await?, vec![b("3"), b("4"), b("5")]);
        assert_eq!(keys(Condition::lt("3")).await?, vec![b("2"), b("1")]);
        assert_eq!(keys(Condition::lte("3")).await?, vec![b("3"), b("2"), b("1")]);

        store.end(&running).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_conflict() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        commit(&store, &[("2", Some("b"))]).await?;

        let (t1, _snap) = store.begin().await?;
        let mut reads = ReadTracker::new();
        reads.record_point(b("2"));

        commit(&store, &[("2", Some("x"))]).await?;

        let res = store.commit(&t1, &reads, writes(&[("5", Some("e"))])).await;
        assert!(matches!(res, Err(KvError::Conflict { conflicting_version: 2, .. })));

        // Nothing was applied.
        assert_eq!(store.stats().await?.version, 2);
        store.end(&t1).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_gc_keeps_entries_needed_by_running() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        commit(&store, &[("a", Some("1"))]).await?;
        assert_eq!(store.stats().await?.commit_log_entries, 0);

        let (old, _snap) = store.begin().await?;
        assert_eq!(old.read_version, 1);

        commit(&store, &[("a", Some("2"))]).await?;
        commit(&store, &[("a", Some("3"))]).await?;

        // Versions 2 and 3 are newer than the read version of `old`.
        let stats = store.stats().await?;
        assert_eq!(stats.commit_log_entries, 2);
        assert_eq!(stats.running, 1);

        store.end(&old).await?;
        let stats = store.stats().await?;
        assert_eq!(stats.commit_log_entries, 0);
        assert_eq!(stats.running, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_after_end_is_rejected() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let (running, _snap) = store.begin().await?;
        store.end(&running).await?;

        let res = store
            .commit(&running, &ReadTracker::new(), writes(&[("a", Some("1"))]))
            .await;
        assert!(matches!(res, Err(KvError::Closed { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_abandon_releases_gc() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        commit(&store, &[("a", Some("1"))]).await?;

        let (lost, _snap) = store.begin().await?;
        commit(&store, &[("a", Some("2"))]).await?;
        assert_eq!(store.stats().await?.commit_log_entries, 1);

        store.abandon(&lost);
        let stats = store.stats().await?;
        assert_eq!(stats.running, 0);
        assert_eq!(stats.commit_log_entries, 0);

        // Ending it afterwards is harmless.
        store.end(&lost).await?;
        Ok(())
    }
}
