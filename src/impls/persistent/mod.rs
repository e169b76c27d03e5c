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

//! The MVCC protocol hosted on a [`RawStore`].
//!
//! Committed entries, the version counter, the commit log and the running
//! transaction ledger all live in the raw store (see [`encoding`]), thus a
//! [`PersistentStore`] reopened over the same raw store resumes where the
//! previous one stopped. A ledger record whose heartbeat is older than
//! [`Config::running_txn_ttl`] belongs to an abandoned transaction; GC
//! reclaims it instead of being blocked by it forever.

pub(crate) mod encoding;
mod raw;
mod snapshot;


use std::fmt;
use std::io;
use std::ops::Bound;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use futures::lock::Mutex;
use log::debug;
use log::info;
use log::warn;

pub use self::raw::MemoryRawStore;
pub use self::raw::RawStore;
pub use self::raw::RawWrite;
pub use self::snapshot::PersistentSnapshot;
use crate::condition::Direction;
use crate::config::Config;
use crate::errors::KvError;
use crate::mvcc::conflict;
use crate::mvcc::Backend;
use crate::mvcc::ReadTracker;
use crate::mvcc::RunningTxn;
use crate::mvcc::StoreStats;
use crate::mvcc::WriteSet;
use crate::Version;

pub struct PersistentStore<R> {
    raw: Arc<R>,
    config: Config,

    /// Serializes begin, commit, heartbeat and end of this process.
    lock: Mutex<()>,
}

impl<R> fmt::Debug for PersistentStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentStore")
            .field("config", &self.config)
            .finish()
    }
}

impl<R: RawStore> PersistentStore<R> {
    /// Open a store over `raw`, resuming the state persisted in it.
    pub async fn open(raw: R, mut config: Config) -> Result<Self, KvError> {
        // A page must make progress.
        config.page_size = config.page_size.max(1);

        let s = Self {
            raw: Arc::new(raw),
            config,
            lock: Mutex::new(()),
        };

        let version = s.load_version().await?;
        info!("PersistentStore opened at version {}", version);
        Ok(s)
    }

    pub fn raw(&self) -> &R {
        &self.raw
    }

    async fn load_u64(&self, key: &[u8]) -> Result<u64, KvError> {
        match self.raw.get(key).await? {
            Some(buf) => Ok(encoding::decode_u64(&buf)?),
            None => Ok(0),
        }
    }

    async fn load_version(&self) -> Result<Version, KvError> {
        self.load_u64(&encoding::version_key()).await
    }

    /// Collect all rows in a raw range, fetching `page_size` rows at a time.
    async fn scan_all(
        &self,
        mut lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, io::Error> {
        let page_size = self.config.page_size;
        let mut all = vec![];

        loop {
            let rows = self
                .raw
                .scan(lower.clone(), upper.clone(), Direction::Forward, page_size)
                .await?;
            let n = rows.len();

            if let Some((last, _)) = rows.last() {
                lower = Bound::Excluded(last.clone());
            }
            all.extend(rows);

            if n < page_size {
                break;
            }
        }

        if all.len() > 10_000 {
            warn!(
                "PersistentStore::scan_all() returns big range of len={}",
                all.len()
            );
        }

        Ok(all)
    }

    /// Remove abandoned ledger records and commit-log entries no running
    /// transaction can conflict with.
    ///
    /// Must be called with `self.lock` held.
    async fn gc(&self, version: Version) -> Result<(), KvError> {
        let (lower, upper) = encoding::running_range();
        let ledger = self.scan_all(lower, upper).await?;

        let now = now_millis();
        let ttl = self.config.running_txn_ttl.as_millis() as u64;

        let mut batch = vec![];
        let mut min_read_version = None;

        for (raw_key, raw_value) in ledger {
            let running = encoding::decode_running_key(&raw_key)?;
            let heartbeat = encoding::decode_u64(&raw_value)?;

            if now.saturating_sub(heartbeat) > ttl {
                warn!(
                    "gc: reclaim abandoned {}, last heartbeat {} ms ago",
                    running,
                    now.saturating_sub(heartbeat)
                );
                batch.push(RawWrite::Delete(raw_key));
                continue;
            }

            // The ledger is ordered by read version, the first live one is the smallest.
            if min_read_version.is_none() {
                min_read_version = Some(running.read_version);
            }
        }

        let threshold = min_read_version.unwrap_or(version);

        // Versions start at 1, nothing is logged at or below 0.
        if threshold > 0 {
            let (lower, upper) = encoding::log_range(0, Some(threshold));
            let obsolete = self.scan_all(lower, upper).await?;
            if !obsolete.is_empty() {
                debug!(
                    "gc: drop {} commit log rows upto version {}",
                    obsolete.len(),
                    threshold
                );
            }
            batch.extend(obsolete.into_iter().map(|(k, _)| RawWrite::Delete(k)));
        }

        if !batch.is_empty() {
            self.raw.write(batch).await?;
        }
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[async_trait::async_trait]
impl<R: RawStore> Backend for PersistentStore<R> {
    type Snapshot = PersistentSnapshot<R>;

    async fn begin(&self) -> Result<(RunningTxn, PersistentSnapshot<R>), KvError> {
        let _guard = self.lock.lock().await;

        let version = self.load_version().await?;
        let txn_id = self.load_u64(&encoding::txn_id_key()).await? + 1;
        let running = RunningTxn::new(version, txn_id);

        self.raw
            .write(vec![
                RawWrite::Put(encoding::txn_id_key(), encoding::encode_u64(txn_id)),
                RawWrite::Put(
                    encoding::running_key(&running),
                    encoding::encode_u64(now_millis()),
                ),
            ])
            .await?;

        let snapshot = PersistentSnapshot::new(self.raw.clone(), version, self.config.page_size);
        Ok((running, snapshot))
    }

    async fn heartbeat(&self, running: &RunningTxn) -> Result<(), KvError> {
        let _guard = self.lock.lock().await;

        let key = encoding::running_key(running);

        // A reclaimed record is not brought back: its commit would be refused anyway.
        if self.raw.get(&key).await?.is_none() {
            warn!("heartbeat: {} was reclaimed", running);
            return Ok(());
        }

        self.raw
            .write(vec![RawWrite::Put(key, encoding::encode_u64(now_millis()))])
            .await?;
        Ok(())
    }

    async fn commit(
        &self,
        running: &RunningTxn,
        reads: &ReadTracker,
        writes: WriteSet,
    ) -> Result<Version, KvError> {
        let _guard = self.lock.lock().await;

        let current = self.load_version().await?;

        // Once the record is reclaimed, commit-log entries this transaction
        // has to validate against may have been pruned.
        if self.raw.get(&encoding::running_key(running)).await?.is_none() {
            warn!("commit: {} was reclaimed as abandoned, retry", running);
            return Err(KvError::Conflict {
                read_version: running.read_version,
                conflicting_version: current,
                key: vec![],
            });
        }

        let (lower, upper) = encoding::log_range(running.read_version, None);
        let log_rows = self.scan_all(lower, upper).await?;

        let mut committed = Vec::with_capacity(log_rows.len());
        for (raw_key, written_key) in log_rows.iter() {
            let v = encoding::decode_log_version(raw_key)?;
            committed.push((v, written_key.as_slice()));
        }
        conflict::validate(running.read_version, reads, committed)?;

        let version = current + 1;

        let mut batch = Vec::with_capacity(writes.len() * 2 + 1);
        for (i, (key, value)) in writes.iter().enumerate() {
            let row = match value {
                Some(v) => RawWrite::Put(encoding::data_key(&key, version, false), v),
                None => RawWrite::Put(encoding::data_key(&key, version, true), vec![]),
            };
            batch.push(row);
            batch.push(RawWrite::Put(encoding::log_key(version, i as u32), key));
        }
        batch.push(RawWrite::Put(
            encoding::version_key(),
            encoding::encode_u64(version),
        ));

        self.raw.write(batch).await?;
        debug!("commit: {} wrote {} keys at version {}", running, writes.len(), version);

        Ok(version)
    }

    async fn end(&self, running: &RunningTxn) -> Result<(), KvError> {
        let _guard = self.lock.lock().await;

        self.raw
            .write(vec![RawWrite::Delete(encoding::running_key(running))])
            .await?;

        let version = self.load_version().await?;
        self.gc(version).await
    }

    /// The ledger can only be updated asynchronously: the record stays until
    /// its heartbeat expires and GC reclaims it.
    fn abandon(&self, running: &RunningTxn) {
        info!(
            "abandon: {} is left to be reclaimed after {:?}",
            running, self.config.running_txn_ttl
        );
    }

    async fn stats(&self) -> Result<StoreStats, KvError> {
        let version = self.load_version().await?;

        let (lower, upper) = encoding::log_range(0, None);
        let mut versions = vec![];
        for (raw_key, _) in self.scan_all(lower, upper).await? {
            versions.push(encoding::decode_log_version(&raw_key)?);
        }
        versions.dedup();

        let (lower, upper) = encoding::running_range();
        let running = self.scan_all(lower, upper).await?.len();

        Ok(StoreStats {
            version,
            commit_log_entries: versions.len(),
            running,
        })
    }

    async fn close(&self) -> Result<(), KvError> {
        self.raw.close().await?;
        Ok(())
    }
}
