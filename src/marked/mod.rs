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

use crate::Value;
use crate::Version;

/// A versioned record of a single key: either a value or a tombstone.
///
/// Records are never mutated once committed. Deleting a key materializes a new
/// [`Marked::TombStone`] at the deleting version, older versions stay in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marked<T = Value> {
    /// The key was deleted as of `version`.
    TombStone { version: Version },

    /// The key holds `value` as of `version`.
    Normal { version: Version, value: T },
}

impl<T> Marked<T> {
    pub fn new_normal(version: Version, value: T) -> Self {
        Marked::Normal { version, value }
    }

    pub fn new_tombstone(version: Version) -> Self {
        Marked::TombStone { version }
    }

    /// Build from the `(version, deleted)` pair stored in a composite key.
    pub fn from_parts(version: Version, deleted: bool, value: T) -> Self {
        if deleted {
            Self::new_tombstone(version)
        } else {
            Self::new_normal(version, value)
        }
    }

    pub fn version(&self) -> Version {
        match self {
            Marked::TombStone { version } => *version,
            Marked::Normal { version, .. } => *version,
        }
    }

    /// Returns the value, a tombstone is treated as absence.
    pub fn into_value(self) -> Option<T> {
        match self {
            Marked::TombStone { .. } => None,
            Marked::Normal { value, .. } => Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts() {
        assert_eq!(
            Marked::from_parts(3, false, "a"),
            Marked::new_normal(3, "a")
        );
        assert_eq!(Marked::from_parts(3, true, "a"), Marked::new_tombstone(3));
    }

    #[test]
    fn test_into_value() {
        assert_eq!(Marked::new_normal(1, "a").into_value(), Some("a"));
        assert_eq!(Marked::<&str>::new_tombstone(1).into_value(), None);
        assert_eq!(Marked::<&str>::new_tombstone(1).version(), 1);
    }
}
