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

//! # MVCC KV
//!
//! An optimistic multi-version concurrency control engine providing
//! serializable snapshot isolation over an ordered byte-string keyspace.
//!
//! Transactions read from an immutable snapshot taken at their read version,
//! stage writes privately and record every key range they observe. At commit
//! the recorded ranges are intersected with the keys written by every
//! transaction committed since the read version; an overlap is a conflict and
//! the transaction body is re-run against a fresh snapshot.
//!
//! ## Core Components
//!
//! - [`Mvcc`]: the engine, runs `transact` and `snapshot` bodies with bounded retry
//! - [`Backend`]: version counter, commit log and running set of one store
//! - [`MemoryStore`](impls::memory::MemoryStore): in-memory backend over a persistent tree
//! - [`PersistentStore`](impls::persistent::PersistentStore): the same protocol hosted on a [`RawStore`](impls::persistent::RawStore)
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use futures_util::TryStreamExt;
//! use mvcc_kv::impls::memory::MemoryStore;
//! use mvcc_kv::Condition;
//! use mvcc_kv::Config;
//! use mvcc_kv::KvError;
//! use mvcc_kv::Mvcc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), KvError> {
//!     let db = Mvcc::new(MemoryStore::default(), Config::default());
//!
//!     db.transact(|tx| {
//!         Box::pin(async move {
//!             tx.put(b"card/1".to_vec(), b"todo".to_vec())?;
//!             Ok::<_, KvError>(())
//!         })
//!     })
//!     .await?;
//!
//!     let cards = db
//!         .snapshot(|snap| {
//!             Box::pin(async move {
//!                 let strm = snap.query(Condition::gte("card/")).await?;
//!                 strm.try_collect::<Vec<_>>().await
//!             })
//!         })
//!         .await?;
//!
//!     assert_eq!(cards.len(), 1);
//!     Ok(())
//! }
//! ```

use futures_util::stream::BoxStream;

pub mod condition;
pub mod config;
pub mod errors;
pub mod impls;
pub mod liveness;
pub mod marked;
pub mod mvcc;
pub mod tree;
pub(crate) mod util;

pub use crate::condition::Bound;
pub use crate::condition::Condition;
pub use crate::condition::ConditionSpec;
pub use crate::condition::Direction;
pub use crate::condition::ReadRange;
pub use crate::config::Config;
pub use crate::errors::KvError;
pub use crate::liveness::AlwaysAlive;
pub use crate::liveness::CancelFlag;
pub use crate::liveness::Liveness;
pub use crate::marked::Marked;
pub use crate::mvcc::Backend;
pub use crate::mvcc::Mvcc;
pub use crate::mvcc::SnapshotRead;
pub use crate::mvcc::Transaction;
pub use crate::mvcc::TransactionReadonly;

/// An opaque key, ordered byte-lexicographically.
pub type Key = Vec<u8>;

/// An opaque value.
pub type Value = Vec<u8>;

/// A commit version. The empty store is at version 0, the first commit produces 1.
pub type Version = u64;

/// A stream of key-value pairs in scan order.
pub type KvResultStream = BoxStream<'static, Result<(Key, Value), errors::KvError>>;
