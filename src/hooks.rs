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

//! The host extension points. The coordinator decides *when* a transaction
//! becomes Prepared, Committed or is removed from the graph; what happens
//! at those moments — persisting a vote, appending to a log, telling a
//! global coordinator — is entirely up to the implementation plugged in
//! here.

use crate::ids::TransactionId;
use crate::transaction::Transaction;

/// What a host wants to happen right after a transaction enters `Prepared`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// Commit this transaction now, without waiting for an external
    /// `commit()` call. Only meaningful for non-distributed transactions;
    /// the coordinator honors it regardless, so a `Hooks` impl that wants
    /// distributed transactions to wait must check `Transaction::is_distributed`
    /// itself (see `LocalHooks`).
    CommitNow,
    /// Leave the transaction Prepared; an external `commit()` or `abort()`
    /// will resolve it.
    Wait,
}

/// Host callbacks invoked by the coordinator at the three points a
/// transaction's lifecycle becomes externally interesting. None of these are
/// called while the coordinator is in a state where calling back into it
/// would be safe — they are notifications, not reentrant callbacks.
pub trait Hooks {
    /// Called once, on entry to `Prepared`. The default treats every
    /// transaction as local and asks the coordinator to commit it
    /// immediately.
    fn vote_yes(&self, txn: &Transaction) -> Vote {
        let _ = txn;
        Vote::CommitNow
    }

    /// Called once, on entry to `Committed`. The place a host durably
    /// records the commit (write-ahead log append, etc.); the coordinator
    /// does not do this itself (see `CoordinatorError`'s doc comment).
    fn committed(&self, txn: &Transaction) {
        let _ = txn;
    }

    /// Called once a transaction has left the graph entirely (either
    /// Committed with empty read/update/next sets, or Aborted with an empty
    /// next set). Optional; the default does nothing.
    fn removed(&self, txn_id: TransactionId) {
        let _ = txn_id;
    }
}

/// The coordinator's default host: every transaction is local, so
/// `vote_yes` always requests an immediate self-commit and `committed`/
/// `removed` are no-ops. Distributed hosts should implement their own
/// `Hooks` rather than compose with this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalHooks;

impl Hooks for LocalHooks {
    fn vote_yes(&self, txn: &Transaction) -> Vote {
        if txn.is_distributed() { Vote::Wait } else { Vote::CommitNow }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::GlobalId;

    #[test]
    fn local_hooks_commits_local_transactions_immediately() {
        let txn = Transaction::new(TransactionId(1), None);
        assert_eq!(LocalHooks.vote_yes(&txn), Vote::CommitNow);
    }

    #[test]
    fn local_hooks_waits_on_distributed_transactions() {
        let txn = Transaction::new(TransactionId(1), Some(GlobalId(7)));
        assert_eq!(LocalHooks.vote_yes(&txn), Vote::Wait);
    }
}
