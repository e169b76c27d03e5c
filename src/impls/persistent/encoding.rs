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

//! Layout of the MVCC state inside a raw ordered store.
//!
//! The raw keyspace is split into regions by a leading byte:
//!
//! ```text
//! 0x01 | escaped(key) | 0x00 0x01 | !version (u64 BE) | deleted  => value
//! 0x02 | b'v'                                                     => last committed version
//! 0x02 | b't'                                                     => last transaction id
//! 0x03 | version (u64 BE) | write_index (u32 BE)                  => written key
//! 0x04 | read_version (u64 BE) | txn_id (u64 BE)                  => heartbeat, ms since epoch
//! ```
//!
//! In a data row, `0x00` bytes of the key are escaped as `0x00 0xFF` and the
//! key is terminated by `0x00 0x01`, thus rows of different keys sort by key
//! and no key's rows interleave with another's. The version is stored
//! inverted so the rows of one key sort newest first.

use std::io;
use std::ops::Bound;

use crate::condition::ReadRange;
use crate::marked::Marked;
use crate::mvcc::RunningTxn;
use crate::Key;
use crate::Value;
use crate::Version;

pub(crate) const DATA: u8 = 0x01;
pub(crate) const META: u8 = 0x02;
pub(crate) const LOG: u8 = 0x03;
pub(crate) const RUNNING: u8 = 0x04;

const ESCAPE: u8 = 0xFF;
const TERMINATOR: [u8; 2] = [0x00, 0x01];

/// Longer than the `(version, deleted)` suffix of any data row and greater
/// than all of them.
const SUFFIX_MAX: [u8; 9] = [0xFF; 9];

pub(crate) fn version_key() -> Vec<u8> {
    vec![META, b'v']
}

pub(crate) fn txn_id_key() -> Vec<u8> {
    vec![META, b't']
}

pub(crate) fn encode_u64(x: u64) -> Vec<u8> {
    x.to_be_bytes().to_vec()
}

pub(crate) fn decode_u64(buf: &[u8]) -> Result<u64, io::Error> {
    let arr: [u8; 8] = buf
        .try_into()
        .map_err(|_| corrupt(format!("expect 8 bytes u64, got {} bytes", buf.len())))?;
    Ok(u64::from_be_bytes(arr))
}

fn corrupt(msg: impl ToString) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// The prefix shared by all rows of `key`: region byte, escaped key, terminator.
pub(crate) fn data_prefix(key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(key.len() + 3);
    buf.push(DATA);
    for b in key {
        buf.push(*b);
        if *b == 0x00 {
            buf.push(ESCAPE);
        }
    }
    buf.extend_from_slice(&TERMINATOR);
    buf
}

pub(crate) fn data_key(key: &[u8], version: Version, deleted: bool) -> Vec<u8> {
    let mut buf = data_prefix(key);
    buf.extend_from_slice(&(!version).to_be_bytes());
    buf.push(deleted as u8);
    buf
}

/// The smallest raw key of a row of `key` whose version is `<= version`.
pub(crate) fn data_seek_key(key: &[u8], version: Version) -> Vec<u8> {
    let mut buf = data_prefix(key);
    buf.extend_from_slice(&(!version).to_be_bytes());
    buf
}

/// A raw key greater than every row of `key` and smaller than rows of any greater key.
pub(crate) fn data_key_end(key: &[u8]) -> Vec<u8> {
    let mut buf = data_prefix(key);
    buf.extend_from_slice(&SUFFIX_MAX);
    buf
}

pub(crate) fn decode_data_key(raw: &[u8]) -> Result<(Key, Version, bool), io::Error> {
    let Some((&DATA, rest)) = raw.split_first() else {
        return Err(corrupt("not a data row"));
    };

    let mut key = Vec::with_capacity(rest.len());
    let mut i = 0;
    loop {
        match rest.get(i..i + 2) {
            Some([0x00, ESCAPE]) => {
                key.push(0x00);
                i += 2;
            }
            Some(t) if t == TERMINATOR => {
                i += 2;
                break;
            }
            Some([0x00, _]) => return Err(corrupt("invalid escape in data row")),
            _ => match rest.get(i) {
                Some(b) => {
                    key.push(*b);
                    i += 1;
                }
                None => return Err(corrupt("unterminated key in data row")),
            },
        }
    }

    let suffix = &rest[i..];
    if suffix.len() != 9 {
        return Err(corrupt(format!(
            "expect 9 bytes version suffix, got {}",
            suffix.len()
        )));
    }

    let version = !decode_u64(&suffix[..8])?;
    let deleted = match suffix[8] {
        0 => false,
        1 => true,
        x => return Err(corrupt(format!("invalid deleted flag: {}", x))),
    };

    Ok((key, version, deleted))
}

/// Decode a data row into its key and the versioned record.
pub(crate) fn decode_data_row(raw_key: &[u8], raw_value: Value) -> Result<(Key, Marked), io::Error> {
    let (key, version, deleted) = decode_data_key(raw_key)?;
    Ok((key, Marked::from_parts(version, deleted, raw_value)))
}

/// The raw range of data rows holding the keys selected by `range`.
pub(crate) fn data_range(range: &ReadRange) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let lower = match (&range.lower.key, range.lower.inclusive) {
        (None, _) => Bound::Included(vec![DATA]),
        (Some(k), true) => Bound::Included(data_prefix(k)),
        (Some(k), false) => Bound::Excluded(data_key_end(k)),
    };

    let upper = match (&range.upper.key, range.upper.inclusive) {
        (None, _) => Bound::Excluded(vec![DATA + 1]),
        (Some(k), true) => Bound::Included(data_key_end(k)),
        (Some(k), false) => Bound::Excluded(data_prefix(k)),
    };

    (lower, upper)
}

pub(crate) fn log_key(version: Version, write_index: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(13);
    buf.push(LOG);
    buf.extend_from_slice(&version.to_be_bytes());
    buf.extend_from_slice(&write_index.to_be_bytes());
    buf
}

pub(crate) fn decode_log_version(raw: &[u8]) -> Result<Version, io::Error> {
    match raw.split_first() {
        Some((&LOG, rest)) if rest.len() == 12 => decode_u64(&rest[..8]),
        _ => Err(corrupt("not a commit log row")),
    }
}

/// The raw range of commit-log rows with version in `(after, upto]`.
pub(crate) fn log_range(after: Version, upto: Option<Version>) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let lower = Bound::Included(log_key(after.saturating_add(1), 0));
    let upper = match upto {
        Some(v) => Bound::Included(log_key(v, u32::MAX)),
        None => Bound::Excluded(vec![LOG + 1]),
    };
    (lower, upper)
}

pub(crate) fn running_key(running: &RunningTxn) -> Vec<u8> {
    let mut buf = Vec::with_capacity(17);
    buf.push(RUNNING);
    buf.extend_from_slice(&running.read_version.to_be_bytes());
    buf.extend_from_slice(&running.txn_id.to_be_bytes());
    buf
}

pub(crate) fn decode_running_key(raw: &[u8]) -> Result<RunningTxn, io::Error> {
    match raw.split_first() {
        Some((&RUNNING, rest)) if rest.len() == 16 => Ok(RunningTxn::new(
            decode_u64(&rest[..8])?,
            decode_u64(&rest[8..])?,
        )),
        _ => Err(corrupt("not a running transaction row")),
    }
}

pub(crate) fn running_range() -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    (Bound::Included(vec![RUNNING]), Bound::Excluded(vec![RUNNING + 1]))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::condition::Condition;

    #[test]
    fn test_data_key_round_trip() {
        for key in [&b""[..], b"a", b"\x00", b"a\x00b", b"\x00\x01", b"\xff\x00"] {
            for (version, deleted) in [(1, false), (7, true), (u64::MAX - 1, false)] {
                let raw = data_key(key, version, deleted);
                let got = decode_data_key(&raw).unwrap();
                assert_eq!(got, (key.to_vec(), version, deleted));
            }
        }
    }

    #[test]
    fn test_data_key_order() {
        // Logical key order is preserved, including prefixes and zero bytes.
        let keys: Vec<&[u8]> = vec![b"", b"\x00", b"\x00\x00", b"\x00\x01", b"a", b"a\x00", b"a\x00b", b"ab", b"b"];
        for w in keys.windows(2) {
            let a = data_key(w[0], 1, false);
            let b = data_key(w[1], 100, true);
            assert!(a < b, "{:?} < {:?}", w[0], w[1]);

            // All rows of the smaller key are below the end of it, which is below the next key.
            assert!(a < data_key_end(w[0]));
            assert!(data_key_end(w[0]) < data_prefix(w[1]));
        }
    }

    #[test]
    fn test_newer_version_sorts_first() {
        let v1 = data_key(b"k", 1, false);
        let v2 = data_key(b"k", 2, true);
        let v3 = data_key(b"k", 3, false);
        assert!(v3 < v2);
        assert!(v2 < v1);

        // Seeking at version 2 lands before v2 and after v3.
        let seek = data_seek_key(b"k", 2);
        assert!(v3 < seek);
        assert!(seek <= v2);
    }

    #[test]
    fn test_data_range() {
        let (lower, upper) = data_range(&Condition::gt("b").read_range());
        assert_eq!(lower, Bound::Excluded(data_key_end(b"b")));
        assert_eq!(upper, Bound::Excluded(vec![DATA + 1]));

        let (lower, upper) = data_range(&Condition::lte("b").read_range());
        assert_eq!(lower, Bound::Included(vec![DATA]));
        assert_eq!(upper, Bound::Included(data_key_end(b"b")));
    }

    #[test]
    fn test_decode_corrupt() {
        assert!(decode_data_key(b"").is_err());
        assert!(decode_data_key(&[LOG, 1, 2]).is_err());
        assert!(decode_data_key(&[DATA, b'a']).is_err());
        assert!(decode_data_key(&[DATA, b'a', 0, 1, 0]).is_err());
        assert!(decode_u64(b"123").is_err());
    }

    #[test]
    fn test_log_and_running_keys() {
        assert!(log_key(1, 5) < log_key(2, 0));
        assert_eq!(decode_log_version(&log_key(9, 3)).unwrap(), 9);

        let (lower, upper) = log_range(3, Some(5));
        assert_eq!(lower, Bound::Included(log_key(4, 0)));
        assert_eq!(upper, Bound::Included(log_key(5, u32::MAX)));

        let r = RunningTxn::new(3, 42);
        assert_eq!(decode_running_key(&running_key(&r)).unwrap(), r);
        assert!(running_key(&RunningTxn::new(2, 100)) < running_key(&r));
    }
}
