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

use std::sync::Arc;

use crate::condition::Condition;
use crate::errors::KvError;
use crate::liveness::Liveness;
use crate::KvResultStream;
use crate::Value;
use crate::Version;

/// An immutable view of the committed keyspace at one version.
///
/// Implementations never observe writes committed after [`version()`](Self::version),
/// and are safe to share between concurrently running readers.
#[async_trait::async_trait]
pub trait SnapshotRead: Send + Sync + 'static {
    /// Return the version (inclusive) this snapshot can see.
    fn version(&self) -> Version;

    /// Get the value of a key, a deleted or never written key is `None`.
    async fn get(&self, key: &[u8]) -> Result<Option<Value>, KvError>;

    /// Scan the keys selected by `condition` in the condition's direction.
    ///
    /// Deleted keys are not yielded. The stream checks `liveness` while it is
    /// consumed and fails with [`KvError::Cancelled`] once it reports so.
    async fn query(
        &self,
        condition: Condition,
        liveness: Arc<dyn Liveness>,
    ) -> Result<KvResultStream, KvError>;
}
