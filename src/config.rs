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

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Engine and backend tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many times a conflicted transaction is re-run after the first attempt.
    pub max_retries: usize,

    /// Number of raw rows fetched per page when scanning a raw store.
    pub page_size: usize,

    /// A running-transaction record whose heartbeat is older than this is
    /// considered abandoned and no longer holds back commit-log GC.
    pub running_txn_ttl: Duration,

    /// A live transaction refreshes its heartbeat at most this often.
    pub heartbeat_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 10,
            page_size: 256,
            running_txn_ttl: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn with_max_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_page_size(mut self, n: usize) -> Self {
        // A page must make progress.
        self.page_size = n.max(1);
        self
    }

    pub fn with_running_txn_ttl(mut self, ttl: Duration) -> Self {
        self.running_txn_ttl = ttl;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let c = Config::default()
            .with_max_retries(3)
            .with_page_size(0)
            .with_running_txn_ttl(Duration::from_millis(5));

        assert_eq!(c.max_retries, 3);
        assert_eq!(c.page_size, 1);
        assert_eq!(c.running_txn_ttl, Duration::from_millis(5));
        assert_eq!(c.heartbeat_interval, Duration::from_secs(10));
    }
}
