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
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::warn;

use crate::errors::KvError;
use crate::liveness::Liveness;
use crate::mvcc::backend::Backend;
use crate::mvcc::backend::RunningTxn;
use crate::mvcc::engine::Shared;

/// One registration of a running transaction, from `begin` to `end`.
///
/// If it is dropped before [`end`](Self::end), e.g. the caller stopped polling
/// the transaction, the backend is told to [`abandon`](Backend::abandon) it.
pub(crate) struct Attempt<B: Backend> {
    backend: Arc<B>,
    running: RunningTxn,

    /// Set once the attempt is over; streams created by it stop yielding.
    ended: Arc<AtomicBool>,

    deregistered: bool,
}

impl<B: Backend> Attempt<B> {
    pub(crate) fn new(backend: Arc<B>, running: RunningTxn) -> Self {
        Self {
            backend,
            running,
            ended: Arc::new(AtomicBool::new(false)),
            deregistered: false,
        }
    }

    /// The liveness every read of this attempt is checked against: the engine
    /// is open, the attempt has not ended, and `user` is alive.
    pub(crate) fn liveness(&self, shared: Arc<Shared>, user: Arc<dyn Liveness>) -> Arc<dyn Liveness> {
        Arc::new(AttemptLiveness {
            shared,
            ended: self.ended.clone(),
            user,
        })
    }

    /// Deregister the transaction. The outcome of the attempt is already
    /// decided, a failure here only delays GC.
    pub(crate) async fn end(mut self) {
        self.ended.store(true, Ordering::Release);

        if let Err(e) = self.backend.end(&self.running).await {
            warn!("failed to end {}: {}", self.running, e);
        }
        self.deregistered = true;
    }
}

impl<B: Backend> Drop for Attempt<B> {
    fn drop(&mut self) {
        self.ended.store(true, Ordering::Release);

        if !self.deregistered {
            warn!("{} dropped before it ended, abandon it", self.running);
            self.backend.abandon(&self.running);
        }
    }
}

struct AttemptLiveness {
    shared: Arc<Shared>,
    ended: Arc<AtomicBool>,
    user: Arc<dyn Liveness>,
}

impl fmt::Debug for AttemptLiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptLiveness")
            .field("ended", &self.ended.load(Ordering::Acquire))
            .field("user", &self.user)
            .finish()
    }
}

impl Liveness for AttemptLiveness {
    fn is_alive(&self) -> bool {
        self.check().is_ok()
    }

    fn check(&self) -> Result<(), KvError> {
        self.shared.check_open()?;

        if self.ended.load(Ordering::Acquire) {
            return Err(KvError::closed("transaction has ended"));
        }

        self.user.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::memory::MemoryStore;
    use crate::liveness::CancelFlag;

    #[tokio::test]
    async fn test_drop_abandons() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());

        let (running, _snap) = store.begin().await?;
        let attempt = Attempt::new(store.clone(), running);
        assert_eq!(store.stats().await?.running, 1);

        drop(attempt);
        assert_eq!(store.stats().await?.running, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_liveness_after_end() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let shared = Arc::new(Shared::default());
        let flag = CancelFlag::new();

        let (running, _snap) = store.begin().await?;
        let attempt = Attempt::new(store.clone(), running);
        let liveness = attempt.liveness(shared, Arc::new(flag.clone()));
        assert!(liveness.check().is_ok());

        attempt.end().await;
        assert_eq!(store.stats().await?.running, 0);

        // Ended takes precedence over the caller's context.
        flag.cancel();
        assert!(matches!(liveness.check(), Err(KvError::Closed { .. })));
        assert!(!liveness.is_alive());
        Ok(())
    }
}
