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

//! Commit-time validation of a transaction's read footprint.

use crate::errors::KvError;
use crate::mvcc::read_tracker::ReadTracker;
use crate::Version;

/// Check every key committed after `read_version` against the read footprint.
///
/// `committed` yields `(version, key)` for commit-log entries; entries at or
/// below `read_version` are ignored so callers may pass a superset.
///
/// Returns the first overlap as a [`KvError::Conflict`].
pub fn validate<'a>(
    read_version: Version,
    reads: &ReadTracker,
    committed: impl IntoIterator<Item = (Version, &'a [u8])>,
) -> Result<(), KvError> {
    if reads.is_empty() {
        return Ok(());
    }

    for (version, key) in committed {
        if version <= read_version {
            continue;
        }

        if reads.covers(key) {
            return Err(KvError::Conflict {
                read_version,
                conflicting_version: version,
                key: key.to_vec(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;

    fn log<'a>(entries: &'a [(Version, &'a str)]) -> impl Iterator<Item = (Version, &'a [u8])> {
        entries.iter().map(|(v, k)| (*v, k.as_bytes()))
    }

    #[test]
    fn test_no_reads_no_conflict() {
        let reads = ReadTracker::new();
        validate(1, &reads, log(&[(2, "a")])).unwrap();
    }

    #[test]
    fn test_point_conflict() {
        let mut reads = ReadTracker::new();
        reads.record_point(b"2".to_vec());

        let err = validate(1, &reads, log(&[(2, "1"), (3, "2")])).unwrap_err();
        match err {
            KvError::Conflict {
                read_version,
                conflicting_version,
                key,
            } => {
                assert_eq!(read_version, 1);
                assert_eq!(conflicting_version, 3);
                assert_eq!(key, b"2".to_vec());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_ignore_commits_before_read_version() {
        let mut reads = ReadTracker::new();
        reads.record_point(b"2".to_vec());

        validate(3, &reads, log(&[(2, "2"), (3, "2"), (4, "5")])).unwrap();
    }

    #[test]
    fn test_range_conflict_honors_inclusivity() {
        let mut reads = ReadTracker::new();
        reads.record(Condition::gt("b").read_range());

        validate(0, &reads, log(&[(1, "a"), (2, "b")])).unwrap();
        assert!(validate(0, &reads, log(&[(3, "ba")])).is_err());

        let mut reads = ReadTracker::new();
        reads.record(Condition::lte("b").read_range());
        assert!(validate(0, &reads, log(&[(1, "b")])).is_err());
        validate(0, &reads, log(&[(1, "c")])).unwrap();
    }
}
