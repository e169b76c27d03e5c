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

//! Merge a committed snapshot stream with the staged writes of a transaction.

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::TryStreamExt;
use stream_more::KMerge;
use stream_more::StreamMore;

use crate::condition::Direction;
use crate::errors::KvError;
use crate::liveness::Liveness;
use crate::Key;
use crate::KvResultStream;
use crate::Value;

/// `(key, value, staged)`. A staged `None` is a tombstone written by the transaction.
type MergeItem = Result<(Key, Option<Value>, bool), KvError>;

/// Ascending by key; on equal keys the staged entry comes first.
pub(crate) fn by_key_asc(r1: &MergeItem, r2: &MergeItem) -> bool {
    match (r1, r2) {
        (Ok((k1, _, staged1)), Ok((k2, _, staged2))) => (k1, !staged1) <= (k2, !staged2),
        // If there is an error, just yield them in order.
        // It's the caller's responsibility to handle the error.
        _ => true,
    }
}

/// Descending by key; on equal keys the staged entry comes first.
pub(crate) fn by_key_desc(r1: &MergeItem, r2: &MergeItem) -> bool {
    match (r1, r2) {
        (Ok((k1, _, staged1)), Ok((k2, _, staged2))) => {
            if k1 == k2 {
                *staged1 || !*staged2
            } else {
                k1 > k2
            }
        }
        _ => true,
    }
}

/// Merge two adjacent entries of the same key, the staged one wins.
#[allow(clippy::type_complexity)]
pub(crate) fn prefer_staged(
    r1: MergeItem,
    r2: MergeItem,
) -> Result<MergeItem, (MergeItem, MergeItem)> {
    match (r1, r2) {
        (Ok(a), Ok(b)) if a.0 == b.0 => {
            if a.2 {
                Ok(Ok(a))
            } else {
                Ok(Ok(b))
            }
        }
        // If there is an error,
        // or k1 != k2
        // just yield them without change.
        (r1, r2) => Err((r1, r2)),
    }
}

/// Present `committed` overlaid with `staged` in scan order.
///
/// `staged` must already be sorted in `direction` and restricted to the same
/// range as `committed`. Staged tombstones hide the committed value.
pub(crate) fn merge_staged(
    committed: KvResultStream,
    staged: Vec<(Key, Option<Value>)>,
    direction: Direction,
) -> KvResultStream {
    if staged.is_empty() {
        return committed;
    }

    let base = committed.map_ok(|(k, v)| (k, Some(v), false)).boxed();
    let staged = futures::stream::iter(staged)
        .map(|(k, v)| Ok((k, v, true)))
        .boxed();

    let merged = match direction {
        Direction::Forward => {
            let kmerge = KMerge::by(by_key_asc).merge(base).merge(staged);
            kmerge.coalesce(prefer_staged).boxed()
        }
        Direction::Backward => {
            let kmerge = KMerge::by(by_key_desc).merge(base).merge(staged);
            kmerge.coalesce(prefer_staged).boxed()
        }
    };

    merged
        .try_filter_map(|(k, v, _staged)| async move { Ok(v.map(|v| (k, v))) })
        .boxed()
}

/// Fail the stream with [`KvError::Cancelled`] as soon as `liveness` reports so.
pub(crate) fn with_liveness(strm: KvResultStream, liveness: Arc<dyn Liveness>) -> KvResultStream {
    strm.map(move |item| {
        liveness.check()?;
        item
    })
    .boxed()
}
