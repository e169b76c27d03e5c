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

use crate::errors::KvError;

/// Tells a running operation whether it is still allowed to proceed.
///
/// Checked between items of long scans and before commit.
pub trait Liveness: fmt::Debug + Send + Sync + 'static {
    fn is_alive(&self) -> bool;

    fn check(&self) -> Result<(), KvError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(KvError::Cancelled)
        }
    }
}

/// A context that is never cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAlive;

impl Liveness for AlwaysAlive {
    fn is_alive(&self) -> bool {
        true
    }
}

/// A cancellation flag shared between the caller and the running operation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Liveness for CancelFlag {
    fn is_alive(&self) -> bool {
        !self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        let cloned = flag.clone();
        assert!(flag.check().is_ok());

        cloned.cancel();
        assert!(!flag.is_alive());
        assert!(matches!(flag.check(), Err(KvError::Cancelled)));
    }

    #[test]
    fn test_always_alive() {
        assert!(AlwaysAlive.check().is_ok());
    }
}
