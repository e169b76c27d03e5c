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
use std::sync::Mutex;
use std::sync::PoisonError;

use futures::future::BoxFuture;
use log::debug;
use log::info;
use log::warn;

use crate::config::Config;
use crate::errors::KvError;
use crate::liveness::AlwaysAlive;
use crate::liveness::Liveness;
use crate::mvcc::attempt::Attempt;
use crate::mvcc::backend::Backend;
use crate::mvcc::backend::StoreStats;
use crate::mvcc::transaction::Transaction;
use crate::mvcc::transaction::TransactionReadonly;
use crate::Version;

/// State shared by the engine and every transaction it started.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    /// The reason the engine was closed, `None` while open.
    closed: Mutex<Option<String>>,
}

impl Shared {
    pub(crate) fn check_open(&self) -> Result<(), KvError> {
        let closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        match closed.as_ref() {
            Some(reason) => Err(KvError::closed(reason)),
            None => Ok(()),
        }
    }

    /// Returns `false` if it was already closed.
    fn close(&self, reason: String) -> bool {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if closed.is_some() {
            return false;
        }
        *closed = Some(reason);
        true
    }
}

/// The optimistic MVCC engine.
///
/// Transaction bodies run without any lock held. Only the final
/// validate-and-apply step is serialized, inside the [`Backend`].
///
/// A body passed to [`transact`](Self::transact) may run more than once: it
/// must not cause side effects outside the store.
pub struct Mvcc<B: Backend> {
    backend: Arc<B>,
    config: Config,
    shared: Arc<Shared>,
}

impl<B: Backend> Clone for Mvcc<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            config: self.config.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for Mvcc<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mvcc")
            .field("config", &self.config)
            .field("shared", &self.shared)
            .finish()
    }
}

impl<B: Backend> Mvcc<B> {
    pub fn new(backend: B, config: Config) -> Self {
        Self {
            backend: Arc::new(backend),
            config,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The last committed version.
    pub async fn version(&self) -> Result<Version, KvError> {
        Ok(self.backend.stats().await?.version)
    }

    pub async fn stats(&self) -> Result<StoreStats, KvError> {
        self.backend.stats().await
    }

    /// Run `f` in a read-write transaction, re-running it on conflict.
    ///
    /// Returns the result of the first attempt that commits. After
    /// `config.max_retries` re-runs a conflict is returned to the caller.
    /// Any other error, including one returned by `f`, aborts at once.
    pub async fn transact<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<KvError> + Send,
        F: for<'a> FnMut(&'a mut Transaction<B>) -> BoxFuture<'a, Result<T, E>> + Send,
    {
        self.transact_with(Arc::new(AlwaysAlive), f).await
    }

    /// Like [`transact`](Self::transact), checking `liveness` during reads and
    /// before commit.
    pub async fn transact_with<T, E, F>(&self, liveness: Arc<dyn Liveness>, mut f: F) -> Result<T, E>
    where
        T: Send,
        E: From<KvError> + Send,
        F: for<'a> FnMut(&'a mut Transaction<B>) -> BoxFuture<'a, Result<T, E>> + Send,
    {
        let mut attempt = 0;

        loop {
            self.shared.check_open()?;
            liveness.check()?;

            let (running, snapshot) = self.backend.begin().await?;
            debug!("transact: begin {}, attempt: {}", running, attempt);

            let registration = Attempt::new(self.backend.clone(), running);

            let mut txn = Transaction::new(
                running,
                snapshot,
                self.backend.clone(),
                self.shared.clone(),
                registration.liveness(self.shared.clone(), liveness.clone()),
                self.config.heartbeat_interval,
            );

            let res = f(&mut txn).await;

            let output = match res {
                Ok(output) => output,
                Err(e) => {
                    registration.end().await;
                    return Err(e);
                }
            };

            let committed = self.commit(txn, liveness.as_ref()).await;
            registration.end().await;

            match committed {
                Ok(version) => {
                    debug!("transact: {} committed at version {}", running, version);
                    return Ok(output);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    debug!("transact: {} retry: {}", running, e);
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!(
                            "transact: {} gives up after {} retries: {}",
                            running, attempt, e
                        );
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// Validate and apply. A transaction without writes commits trivially at
    /// its read version.
    async fn commit(&self, txn: Transaction<B>, liveness: &dyn Liveness) -> Result<Version, KvError> {
        self.shared.check_open()?;
        liveness.check()?;

        let (running, reads, writes) = txn.into_parts();
        if writes.is_empty() {
            return Ok(running.read_version);
        }

        self.backend.commit(&running, &reads, writes).await
    }

    /// Run `f` against a read-only snapshot of the current version.
    ///
    /// Never retried and never fails with a conflict.
    pub async fn snapshot<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<KvError> + Send,
        F: for<'a> FnOnce(&'a TransactionReadonly<B>) -> BoxFuture<'a, Result<T, E>> + Send,
    {
        self.snapshot_with(Arc::new(AlwaysAlive), f).await
    }

    pub async fn snapshot_with<T, E, F>(&self, liveness: Arc<dyn Liveness>, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<KvError> + Send,
        F: for<'a> FnOnce(&'a TransactionReadonly<B>) -> BoxFuture<'a, Result<T, E>> + Send,
    {
        self.shared.check_open()?;
        liveness.check()?;

        let (running, snapshot) = self.backend.begin().await?;
        debug!("snapshot: begin {}", running);

        let registration = Attempt::new(self.backend.clone(), running);
        let txn = TransactionReadonly::new(
            running,
            snapshot,
            self.shared.clone(),
            registration.liveness(self.shared.clone(), liveness),
        );

        let res = f(&txn).await;

        registration.end().await;
        res
    }

    /// Close the engine. Every later operation, including those of
    /// transactions still running and of streams they returned, fails with
    /// [`KvError::Closed`].
    ///
    /// Closing twice keeps the first reason.
    pub async fn close(&self, reason: impl ToString) -> Result<(), KvError> {
        let reason = reason.to_string();
        if !self.shared.close(reason.clone()) {
            return Ok(());
        }

        info!("mvcc engine closed: {}", reason);
        self.backend.close().await
    }
}
