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

//! Transaction state and the status lattice it moves through.
//!
//! `Coordinator` (see `coordinator.rs`) owns every `Transaction` and drives
//! it through this lattice; this module only defines the data and the small
//! predicates that don't need access to the rest of the arena.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::ids::{GlobalId, PageOrdinal, TransactionId, VersionId};

/// Where a transaction sits in its lifecycle.
///
/// `Running` and `Failed` are the *private* meta-state: the transaction's
/// writes are invisible to everyone else. `Ready`, `Prepared` and
/// `Committed` are the *public* meta-state. `Aborted` is terminal and
/// outside both meta-states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Accepting reads and updates; nothing it writes is visible yet.
    Running,
    /// A private transaction that has been told one of its predecessors
    /// will not survive. Still accepts reads and updates so the user's
    /// retry loop can observe the cascade via `end()`.
    Failed,
    /// Writes just went public; waiting for every predecessor to commit
    /// before this transaction can itself prepare.
    Ready,
    /// All predecessors committed; waiting on `Hooks::vote_yes` (and, for
    /// distributed transactions, an external `commit`/`abort`).
    Prepared,
    /// Final, successful outcome. Never rolled back.
    Committed,
    /// Final, unsuccessful outcome.
    Aborted,
}

impl Status {
    /// Running or Failed: writes are not yet visible to other transactions.
    pub fn is_private(self) -> bool {
        matches!(self, Status::Running | Status::Failed)
    }

    /// Ready, Prepared or Committed: writes are visible on the public chain.
    pub fn is_public(self) -> bool {
        matches!(self, Status::Ready | Status::Prepared | Status::Committed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Committed | Status::Aborted)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Running => "Running",
            Status::Failed => "Failed",
            Status::Ready => "Ready",
            Status::Prepared => "Prepared",
            Status::Committed => "Committed",
            Status::Aborted => "Aborted",
        };
        f.write_str(s)
    }
}

/// A single transaction and all the bookkeeping the coordinator needs to
/// drive it: what it has read, what it is writing, and its place in the
/// precedence graph.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    /// Present only for distributed transactions; governs whether `commit`
    /// and `abort` are accepted, and whether `Hooks::vote_yes` self-commits.
    pub global_id: Option<GlobalId>,
    pub status: Status,
    /// Pages read but not (yet) updated by this transaction, mapped to the
    /// version that was resolved for them.
    pub read_set: HashMap<PageOrdinal, VersionId>,
    /// Pages this transaction is writing, mapped to the *new* version it
    /// created (not the version it forked from — that is recoverable via
    /// `Version::prev`).
    pub update_set: HashMap<PageOrdinal, VersionId>,
    /// Transactions that must settle before this one can prepare.
    pub prev: HashSet<TransactionId>,
    /// Transactions waiting on this one.
    pub next: HashSet<TransactionId>,
}

impl Transaction {
    pub fn new(id: TransactionId, global_id: Option<GlobalId>) -> Self {
        Self {
            id,
            global_id,
            status: Status::Running,
            read_set: HashMap::new(),
            update_set: HashMap::new(),
            prev: HashSet::new(),
            next: HashSet::new(),
        }
    }

    pub fn is_distributed(&self) -> bool {
        self.global_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_transaction_starts_running_with_empty_sets() {
        let txn = Transaction::new(TransactionId(1), None);
        assert_eq!(txn.status, Status::Running);
        assert!(txn.read_set.is_empty());
        assert!(txn.update_set.is_empty());
        assert!(txn.prev.is_empty());
        assert!(txn.next.is_empty());
        assert!(!txn.is_distributed());
    }

    #[test]
    fn global_id_marks_a_transaction_distributed() {
        let txn = Transaction::new(TransactionId(1), Some(GlobalId(42)));
        assert!(txn.is_distributed());
    }

    #[test]
    fn meta_state_predicates_partition_the_statuses() {
        for status in [Status::Running, Status::Failed, Status::Ready, Status::Prepared, Status::Committed, Status::Aborted] {
            let partitions = [status.is_private(), status.is_public(), status == Status::Aborted];
            assert_eq!(partitions.iter().filter(|p| **p).count(), 1, "status {status} should belong to exactly one partition");
        }
    }
}
