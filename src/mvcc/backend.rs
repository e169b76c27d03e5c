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

use crate::errors::KvError;
use crate::mvcc::read_tracker::ReadTracker;
use crate::mvcc::snapshot::SnapshotRead;
use crate::mvcc::write_set::WriteSet;
use crate::Version;

pub type TxnId = u64;

/// A registered, not yet ended transaction.
///
/// Ordered by `read_version` first, so the smallest one holds back GC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunningTxn {
    pub read_version: Version,
    pub txn_id: TxnId,
}

impl RunningTxn {
    pub fn new(read_version: Version, txn_id: TxnId) -> Self {
        Self {
            read_version,
            txn_id,
        }
    }
}

impl fmt::Display for RunningTxn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}@{}", self.txn_id, self.read_version)
    }
}

/// Bookkeeping counters of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// The last committed version.
    pub version: Version,

    /// Number of commit-log entries not yet garbage collected.
    pub commit_log_entries: usize,

    /// Number of registered running transactions.
    pub running: usize,
}

/// The version store of one keyspace: version counter, commit log and the
/// set of running transactions.
///
/// [`begin`](Self::begin), [`commit`](Self::commit) and [`end`](Self::end)
/// each run as one critical section with respect to each other.
#[async_trait::async_trait]
pub trait Backend: Send + Sync + 'static {
    type Snapshot: SnapshotRead;

    /// Register a running transaction at the current version and return a
    /// snapshot of that version.
    async fn begin(&self) -> Result<(RunningTxn, Self::Snapshot), KvError>;

    /// Tell the backend `running` is still alive.
    async fn heartbeat(&self, running: &RunningTxn) -> Result<(), KvError> {
        let _ = running;
        Ok(())
    }

    /// Validate `reads` against every commit after the read version, then
    /// apply `writes` at a new version and append it to the commit log.
    ///
    /// Validation and application happen together or not at all.
    async fn commit(
        &self,
        running: &RunningTxn,
        reads: &ReadTracker,
        writes: WriteSet,
    ) -> Result<Version, KvError>;

    /// Deregister `running` and garbage collect commit-log entries no running
    /// transaction can conflict with any more.
    async fn end(&self, running: &RunningTxn) -> Result<(), KvError>;

    /// Deregister `running` without waiting, for a transaction dropped before
    /// it could [`end`](Self::end).
    ///
    /// A backend that can not deregister synchronously may leave it to be
    /// reclaimed later.
    fn abandon(&self, running: &RunningTxn);

    async fn stats(&self) -> Result<StoreStats, KvError>;

    /// Release resources held by the backend.
    async fn close(&self) -> Result<(), KvError> {
        Ok(())
    }
}
