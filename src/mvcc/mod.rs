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

pub(crate) mod attempt;
pub mod backend;
pub mod conflict;
pub mod engine;
pub mod read_tracker;
pub mod snapshot;
pub mod transaction;
pub mod write_set;


pub use self::backend::Backend;
pub use self::backend::RunningTxn;
pub use self::backend::StoreStats;
pub use self::backend::TxnId;
pub use self::engine::Mvcc;
pub use self::read_tracker::ReadTracker;
pub use self::snapshot::SnapshotRead;
pub use self::transaction::Transaction;
pub use self::transaction::TransactionReadonly;
pub use self::write_set::WriteSet;
