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

//! A page: a named object on which transactions read and update. A page
//! never disappears once created; only its latest public version changes.

use crate::ids::{PageOrdinal, VersionId};

/// A mutable object in the coordinator's fixed universe. `latest_version`
/// always points at the head of the page's linear public chain (invariant 2);
/// it is only ever updated from `Ready`-on-entry (a new version goes public)
/// or `Aborted`-on-entry (a superseder is rolled back).
#[derive(Debug, Clone)]
pub struct Page {
    pub ordinal: PageOrdinal,
    pub latest_version: VersionId,
    pub version_counter: u64,
}

impl Page {
    pub fn new(ordinal: PageOrdinal, root_version: VersionId) -> Self {
        Self {
            ordinal,
            latest_version: root_version,
            version_counter: 0,
        }
    }

    /// Allocates the next version number for a version being forked from
    /// this page.
    pub fn next_version_number(&mut self) -> u64 {
        self.version_counter += 1;
        self.version_counter
    }
}
