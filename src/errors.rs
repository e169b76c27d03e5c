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

use std::io;

use crate::Version;

/// Errors produced by the MVCC engine and its backends.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// A key this transaction read was written by a transaction that committed
    /// after this transaction's read version.
    ///
    /// Retryable: the engine re-runs the transaction body against a fresh
    /// snapshot until the retry budget is exhausted.
    #[error("Conflict: read_version={read_version}, key {key:?} was written at version {conflicting_version}")]
    Conflict {
        read_version: Version,
        conflicting_version: Version,
        key: Vec<u8>,
    },

    /// The engine, or the transaction this operation belongs to, is closed.
    #[error("Closed: {reason}")]
    Closed { reason: String },

    /// A query condition does not specify exactly one of `gt`, `gte`, `lt`, `lte`.
    #[error("InvalidCondition: {0}")]
    InvalidCondition(String),

    /// The liveness context reported the operation must not proceed.
    #[error("Cancelled")]
    Cancelled,

    /// Passthrough error from the underlying raw store.
    #[error("Storage: {0}")]
    Storage(#[from] io::Error),
}

impl KvError {
    pub fn closed(reason: impl ToString) -> Self {
        KvError::Closed {
            reason: reason.to_string(),
        }
    }

    pub fn invalid_condition(msg: impl ToString) -> Self {
        KvError::InvalidCondition(msg.to_string())
    }

    /// Only [`KvError::Conflict`] is retried by the engine.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KvError::Conflict { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, KvError::Closed { .. })
    }
}
