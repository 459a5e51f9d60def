// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! A single version of a page: one state of one page written by one
//! transaction, with the bookkeeping needed to know when it is safe to
//! forget about it.

use std::collections::HashSet;

use crate::ids::{PageOrdinal, TransactionId, VersionId};

/// One state of one page. Versions form a tree rooted at the page's initial
/// committed version; the subset reachable from `Page::latest_version` via
/// `prev` is the linear *public* chain (invariant 2).
#[derive(Debug, Clone)]
pub struct Version {
    pub id: VersionId,
    pub page: PageOrdinal,
    /// Monotonic within `page`, used only for diagnostics and tests — version
    /// identity is `id`, not this counter.
    pub version_number: u64,
    /// The transaction that created this version. Cleared once that
    /// transaction has fully committed and no longer needs to track it.
    pub writer: Option<TransactionId>,
    /// Transactions that resolved an access to this version.
    pub readers: HashSet<TransactionId>,
    /// Private transactions that have forked a not-yet-public successor of
    /// this version. At most one of these ever becomes `superseder`.
    pub candidates: HashSet<TransactionId>,
    /// The transaction whose version replaced this one on the page's public
    /// chain, once that transaction went public. `None` until then.
    pub superseder: Option<TransactionId>,
    /// The version this one was forked from. `None` only for a page's root
    /// version.
    pub prev: Option<VersionId>,
}

impl Version {
    pub fn new(id: VersionId, page: PageOrdinal, version_number: u64, writer: Option<TransactionId>, prev: Option<VersionId>) -> Self {
        Self {
            id,
            page,
            version_number,
            writer,
            readers: HashSet::new(),
            candidates: HashSet::new(),
            superseder: None,
            prev,
        }
    }

    /// A version is reclaimable once nothing references it any more: no
    /// writer, no readers, and no public superseder. Safe to call spuriously.
    pub fn is_removable(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty() && self.superseder.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(writer: Option<u64>) -> Version {
        Version::new(VersionId(1), PageOrdinal(0), 0, writer.map(TransactionId), None)
    }

    #[test]
    fn fresh_version_with_writer_is_not_removable() {
        assert!(!v(Some(1)).is_removable());
    }

    #[test]
    fn version_with_no_writer_readers_or_superseder_is_removable() {
        assert!(v(None).is_removable());
    }

    #[test]
    fn version_with_readers_is_not_removable() {
        let mut version = v(None);
        version.readers.insert(TransactionId(2));
        assert!(!version.is_removable());
    }

    #[test]
    fn version_with_superseder_is_not_removable() {
        let mut version = v(None);
        version.superseder = Some(TransactionId(3));
        assert!(!version.is_removable());
    }
}
