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

//! The coordinator: owns every page, version and transaction, and is the
//! only thing allowed to mutate them. Everything in this module runs to
//! completion in one call — nothing here blocks (see the crate's top-level
//! documentation).

use std::collections::{HashMap, HashSet};

use crate::error::{CoordinatorError, CoordinatorResult, ProtocolError};
use crate::graph;
use crate::hooks::{Hooks, LocalHooks, Vote};
use crate::ids::{GlobalId, PageOrdinal, TransactionId, VersionId};
use crate::page::Page;
use crate::transaction::{Status, Transaction};
use crate::version::Version;

/// Construction-time options. There is deliberately little here: the
/// coordinator has no tunable timeouts or retry counts, since it never
/// blocks and so has nothing to time out.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// If non-zero, `Coordinator::new` immediately bootstraps this many
    /// pages, ordinals `0..initial_pages`. Leave at `0` to start with an
    /// empty universe and grow it with `Coordinator::create_page`.
    pub initial_pages: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { initial_pages: 0 }
    }
}

/// The local MVCC coordinator. Generic over `Hooks` so a host can plug in
/// durability/distributed behavior without the coordinator knowing anything
/// about it; `LocalHooks` (the default) treats every transaction as local
/// and self-commits it as soon as it has nothing left to wait on.
pub struct Coordinator<H: Hooks = LocalHooks> {
    config: CoordinatorConfig,
    hooks: H,
    pages: HashMap<PageOrdinal, Page>,
    versions: HashMap<VersionId, Version>,
    transactions: HashMap<TransactionId, Transaction>,
    next_transaction_id: u64,
    next_version_id: u64,
}

impl<H: Hooks + Default> Coordinator<H> {
    /// Builds a coordinator using `H`'s default instance. Runs the
    /// page-pool bootstrap for `config.initial_pages` before returning.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_hooks(config, H::default())
    }
}

impl<H: Hooks> Coordinator<H> {
    pub fn with_hooks(config: CoordinatorConfig, hooks: H) -> Self {
        let mut coordinator = Self {
            config,
            hooks,
            pages: HashMap::new(),
            versions: HashMap::new(),
            transactions: HashMap::new(),
            next_transaction_id: 0,
            next_version_id: 0,
        };
        if config.initial_pages > 0 {
            let ordinals: Vec<PageOrdinal> = (0..config.initial_pages as u64).map(PageOrdinal).collect();
            coordinator.bootstrap_pages(&ordinals).expect("page-pool bootstrap cannot fail on a fresh coordinator");
        }
        coordinator
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    pub fn status(&self, txn_id: TransactionId) -> CoordinatorResult<Status> {
        Ok(self.txn(txn_id)?.status)
    }

    pub fn page_exists(&self, ordinal: PageOrdinal) -> bool {
        self.pages.contains_key(&ordinal)
    }

    // ---------------------------------------------------------------
    // Transaction factory
    // ---------------------------------------------------------------

    /// Starts a new transaction. `global_id` makes it distributed: only
    /// distributed transactions accept `commit`/`abort`, and the default
    /// `Hooks::vote_yes` waits for them rather than self-committing.
    pub fn begin(&mut self, global_id: Option<GlobalId>) -> TransactionId {
        let id = TransactionId(self.next_transaction_id);
        self.next_transaction_id += 1;
        self.transactions.insert(id, Transaction::new(id, global_id));
        tracing::debug!(txn = %id, distributed = global_id.is_some(), "transaction started");
        id
    }

    /// Registers a new page with a single committed root version. Part of
    /// the fixed-universe model: there is no "delete page".
    pub fn create_page(&mut self, ordinal: PageOrdinal) -> CoordinatorResult<()> {
        if self.pages.contains_key(&ordinal) {
            return Err(CoordinatorError::Invariant(format!("page {ordinal} already exists")));
        }
        self.bootstrap_pages(&[ordinal])
    }

    /// Creates the root version of every ordinal in `ordinals` under a
    /// single internal transaction, so the pages' very first commit goes
    /// through the same path as every other one.
    pub(crate) fn bootstrap_pages(&mut self, ordinals: &[PageOrdinal]) -> CoordinatorResult<()> {
        let bootstrap = self.begin(None);
        for &ordinal in ordinals {
            let version_id = self.fresh_version_id();
            self.versions.insert(version_id, Version::new(version_id, ordinal, 0, Some(bootstrap), None));
            self.pages.insert(ordinal, Page::new(ordinal, version_id));
            self.txn_mut(bootstrap)?.update_set.insert(ordinal, version_id);
        }
        let status = self.end(bootstrap)?;
        debug_assert_eq!(status, Status::Committed, "page-pool bootstrap has no predecessors and must commit synchronously");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Public operations
    // ---------------------------------------------------------------

    pub fn read(&mut self, txn_id: TransactionId, page: PageOrdinal) -> CoordinatorResult<VersionId> {
        let status = self.txn(txn_id)?.status;
        if status == Status::Aborted {
            return Err(self.reject("read", txn_id, status));
        }
        if let Some(&v) = self.transactions[&txn_id].read_set.get(&page) {
            return Ok(v);
        }
        if let Some(&v) = self.transactions[&txn_id].update_set.get(&page) {
            return Ok(v);
        }
        if !status.is_private() {
            return Err(self.reject("read", txn_id, status));
        }
        if !self.pages.contains_key(&page) {
            return Err(CoordinatorError::UnknownPage(page));
        }
        let version = self.resolve_access(txn_id, page)?;
        self.record_access(txn_id, version)?;
        self.txn_mut(txn_id)?.read_set.insert(page, version);
        Ok(version)
    }

    pub fn update(&mut self, txn_id: TransactionId, page: PageOrdinal) -> CoordinatorResult<(VersionId, VersionId)> {
        let status = self.txn(txn_id)?.status;
        if !status.is_private() {
            return Err(self.reject("update", txn_id, status));
        }
        if !self.pages.contains_key(&page) {
            return Err(CoordinatorError::UnknownPage(page));
        }

        if let Some(&existing_new) = self.transactions[&txn_id].update_set.get(&page) {
            let prev = self.version(existing_new)?.prev.ok_or_else(|| CoordinatorError::Invariant(format!("update {existing_new} has no initial version")))?;
            return Ok((existing_new, prev));
        }

        // A page already in `read_set` reuses that version as the initial
        // version rather than re-resolving it, so a read followed by an
        // update on the same page always sees consistent data.
        let initial_version = if let Some(&cached) = self.transactions[&txn_id].read_set.get(&page) {
            cached
        } else {
            let resolved = self.resolve_access(txn_id, page)?;
            self.record_access(txn_id, resolved)?;
            resolved
        };
        self.txn_mut(txn_id)?.read_set.remove(&page);

        let new_version_id = self.fresh_version_id();
        let version_number = self.pages.get_mut(&page).ok_or(CoordinatorError::UnknownPage(page))?.next_version_number();
        self.versions.insert(new_version_id, Version::new(new_version_id, page, version_number, Some(txn_id), Some(initial_version)));
        self.version_mut(initial_version)?.candidates.insert(txn_id);
        self.txn_mut(txn_id)?.update_set.insert(page, new_version_id);

        Ok((new_version_id, initial_version))
    }

    /// Terminates local work. Returns the transaction's status once this
    /// call settles (which, for a local transaction with no pending
    /// predecessors, can already be `Committed`).
    pub fn end(&mut self, txn_id: TransactionId) -> CoordinatorResult<Status> {
        let status = self.txn(txn_id)?.status;
        match status {
            Status::Running => self.running_end(txn_id),
            Status::Failed => self.failed_end(txn_id),
            other => Ok(other),
        }
    }

    /// Local failure request. Safe to call from any non-terminal state;
    /// rejected from `Prepared` (a distributed transaction's fate there
    /// belongs to `abort`), and a no-op on `Failed`/`Aborted` (diamond
    /// protection).
    pub fn fail(&mut self, txn_id: TransactionId) -> CoordinatorResult<()> {
        let status = self.txn(txn_id)?.status;
        match status {
            Status::Running => self.enter_failed(txn_id, HashSet::new()),
            Status::Failed | Status::Aborted => Ok(()),
            Status::Ready => self.cascade_abort(txn_id, HashSet::new()),
            Status::Prepared | Status::Committed => Err(self.reject("fail", txn_id, status)),
        }
    }

    /// Accepted only for a distributed transaction sitting in `Prepared`.
    pub fn commit(&mut self, txn_id: TransactionId) -> CoordinatorResult<Status> {
        let txn = self.txn(txn_id)?;
        if !txn.is_distributed() || txn.status != Status::Prepared {
            return Err(self.reject("commit", txn_id, txn.status));
        }
        self.enter_committed(txn_id)?;
        Ok(Status::Committed)
    }

    /// Accepted only for a distributed transaction sitting in `Prepared`.
    pub fn abort(&mut self, txn_id: TransactionId) -> CoordinatorResult<Status> {
        let txn = self.txn(txn_id)?;
        if !txn.is_distributed() || txn.status != Status::Prepared {
            return Err(self.reject("abort", txn_id, txn.status));
        }
        self.cascade_abort(txn_id, HashSet::new())?;
        Ok(Status::Aborted)
    }

    // ---------------------------------------------------------------
    // Access resolution (§4.2 / §4.3)
    // ---------------------------------------------------------------

    /// Walks a page's public chain back from `latest_version` while its
    /// writer succeeds `accessor`, the version-selection rule that makes
    /// commitment ordering work without locking anyone out.
    fn resolve_access(&self, accessor: TransactionId, ordinal: PageOrdinal) -> CoordinatorResult<VersionId> {
        let mut current = self.pages.get(&ordinal).ok_or(CoordinatorError::UnknownPage(ordinal))?.latest_version;
        loop {
            let version = self.version(current)?;
            let should_walk_back = match version.writer {
                Some(writer_id) => graph::does_succeed(&self.transactions, writer_id, accessor),
                None => false,
            };
            if !should_walk_back {
                return Ok(current);
            }
            current = version.prev.ok_or_else(|| CoordinatorError::Invariant(format!("version {current} has no committed ancestor")))?;
        }
    }

    /// Records that `accessor` resolved to `version_id`: adds it as a
    /// reader and, unless the writer already committed, a precedence edge
    /// from writer to accessor.
    fn record_access(&mut self, accessor: TransactionId, version_id: VersionId) -> CoordinatorResult<()> {
        let (writer, superseder) = {
            let v = self.version(version_id)?;
            (v.writer, v.superseder)
        };
        self.version_mut(version_id)?.readers.insert(accessor);
        if let Some(writer_id) = writer {
            let writer_committed = self.transactions.get(&writer_id).map(|t| t.status == Status::Committed).unwrap_or(true);
            if !writer_committed {
                graph::precedes(&mut self.transactions, writer_id, accessor);
            }
        }
        if let Some(superseder_id) = superseder {
            debug_assert!(
                superseder_id == accessor || graph::does_succeed(&self.transactions, superseder_id, accessor),
                "a public superseder must already precede any new reader of the version it superseded"
            );
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Transition table (§4.4)
    // ---------------------------------------------------------------

    fn running_end(&mut self, txn_id: TransactionId) -> CoordinatorResult<Status> {
        self.purge_dead_reads(txn_id)?;
        if self.has_update_conflict(txn_id)? {
            self.enter_failed(txn_id, HashSet::new())?;
            return self.failed_end(txn_id);
        }
        self.enter_ready(txn_id)?;
        Ok(self.txn(txn_id)?.status)
    }

    fn failed_end(&mut self, txn_id: TransactionId) -> CoordinatorResult<Status> {
        self.purge_dead_reads(txn_id)?;
        self.enter_aborted(txn_id)?;
        Ok(Status::Aborted)
    }

    /// Drops read-set entries whose version has already fully settled
    /// (writer cleared), so a transaction doesn't carry dead bookkeeping
    /// into its own public transition.
    fn purge_dead_reads(&mut self, txn_id: TransactionId) -> CoordinatorResult<()> {
        let dead: Vec<(PageOrdinal, VersionId)> = self.transactions[&txn_id]
            .read_set
            .iter()
            .filter(|(_, vid)| self.versions.get(vid).map(|v| v.writer.is_none()).unwrap_or(true))
            .map(|(p, v)| (*p, *v))
            .collect();
        for (page, vid) in dead {
            self.txn_mut(txn_id)?.read_set.remove(&page);
            if let Some(v) = self.versions.get_mut(&vid) {
                v.readers.remove(&txn_id);
            }
            self.try_remove_version(vid)?;
        }
        Ok(())
    }

    /// True if going public would violate commitment ordering: another
    /// transaction already won the race to supersede one of our initial
    /// versions, or a reader of that version already succeeds us.
    fn has_update_conflict(&self, txn_id: TransactionId) -> CoordinatorResult<bool> {
        for &new_vid in self.transactions[&txn_id].update_set.values() {
            let Some(old_vid) = self.version(new_vid)?.prev else { continue };
            let old_version = self.version(old_vid)?;
            if old_version.superseder.is_some() {
                return Ok(true);
            }
            for &reader in &old_version.readers {
                if reader != txn_id && graph::does_succeed(&self.transactions, reader, txn_id) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn enter_ready(&mut self, txn_id: TransactionId) -> CoordinatorResult<()> {
        self.set_status(txn_id, Status::Ready);

        let update_entries: Vec<(PageOrdinal, VersionId)> = self.transactions[&txn_id].update_set.iter().map(|(p, v)| (*p, *v)).collect();
        for (page, new_vid) in update_entries {
            let Some(old_vid) = self.version(new_vid)?.prev else {
                continue; // page-pool bootstrap root: nothing to supersede
            };
            self.pages.get_mut(&page).ok_or(CoordinatorError::UnknownPage(page))?.latest_version = new_vid;

            let (other_candidates, remaining_readers): (Vec<TransactionId>, Vec<TransactionId>) = {
                let old = self.version(old_vid)?;
                (
                    old.candidates.iter().copied().filter(|&c| c != txn_id).collect(),
                    // Readers of V that only read it, without also updating it — a
                    // candidate that happened to read V on its way to forking it is
                    // about to be failed below, not made into a predecessor of the
                    // winner.
                    old.readers.iter().copied().filter(|r| *r != txn_id && !old.candidates.contains(r)).collect(),
                )
            };

            {
                let old = self.version_mut(old_vid)?;
                old.superseder = Some(txn_id);
                old.readers.remove(&txn_id);
                old.candidates.clear();
            }

            for candidate in other_candidates {
                // The losing side of the race: it will never supersede this
                // version now, so it fails (and cascades to anything that
                // already depends on its own, still-private work).
                self.fail(candidate)?;
            }
            for reader in remaining_readers {
                graph::precedes(&mut self.transactions, reader, txn_id);
            }
        }

        self.try_ready_to_prepared(txn_id)
    }

    /// The Ready -> Prepared probe. Tightened relative to the historical
    /// source (see DESIGN.md, Open Question #1): every predecessor must be
    /// Committed, not merely Committed-or-Failed, so a successor can never
    /// prepare ahead of a predecessor whose own cascade hasn't reached it
    /// yet.
    fn try_ready_to_prepared(&mut self, txn_id: TransactionId) -> CoordinatorResult<()> {
        let txn = self.txn(txn_id)?;
        if txn.status != Status::Ready {
            return Ok(());
        }
        let all_committed = txn.prev.iter().all(|p| self.transactions.get(p).map(|t| t.status == Status::Committed).unwrap_or(true));
        if !all_committed {
            return Ok(());
        }
        self.enter_prepared(txn_id)
    }

    fn enter_prepared(&mut self, txn_id: TransactionId) -> CoordinatorResult<()> {
        self.set_status(txn_id, Status::Prepared);
        let vote = self.hooks.vote_yes(self.txn(txn_id)?);
        match vote {
            Vote::CommitNow => self.enter_committed(txn_id),
            Vote::Wait => Ok(()),
        }
    }

    fn enter_committed(&mut self, txn_id: TransactionId) -> CoordinatorResult<()> {
        self.set_status(txn_id, Status::Committed);
        self.hooks.committed(self.txn(txn_id)?);

        let preds: Vec<TransactionId> = self.transactions[&txn_id].prev.iter().copied().collect();
        for p in preds {
            graph::drop_edge(&mut self.transactions, p, txn_id);
            self.try_remove_transaction(p)?;
        }
        self.txn_mut(txn_id)?.prev.clear();

        let update_entries: Vec<(PageOrdinal, VersionId)> = self.transactions[&txn_id].update_set.iter().map(|(p, v)| (*p, *v)).collect();
        for (page, new_vid) in update_entries {
            self.commit_update_entry(txn_id, page, new_vid)?;
        }
        self.txn_mut(txn_id)?.update_set.clear();

        // Going public settled every precedence edge this transaction owed a
        // predecessor for (dropped above), so its own reads no longer need to
        // hold a reader binding either — release them now rather than waiting
        // on some future superseder's cleanup, or a read-only commit would
        // never retire.
        let read_entries: Vec<VersionId> = self.transactions[&txn_id].read_set.values().copied().collect();
        for vid in read_entries {
            if let Some(v) = self.versions.get_mut(&vid) {
                v.readers.remove(&txn_id);
            }
            self.try_remove_version(vid)?;
        }
        self.txn_mut(txn_id)?.read_set.clear();

        let waiting_successors: Vec<TransactionId> = self.transactions[&txn_id].next.iter().copied().filter(|n| self.transactions.get(n).map(|t| t.status == Status::Ready).unwrap_or(false)).collect();
        for n in waiting_successors {
            self.try_ready_to_prepared(n)?;
        }

        self.try_remove_transaction(txn_id)
    }

    /// The part of Committed-on-entry that retires one update-set entry:
    /// detaches the superseded version from its own writer, drops readers
    /// that have themselves already gone public, and lets both versions be
    /// reclaimed once nothing references them.
    fn commit_update_entry(&mut self, txn_id: TransactionId, page: PageOrdinal, new_vid: VersionId) -> CoordinatorResult<()> {
        let Some(old_vid) = self.version(new_vid)?.prev else {
            return Ok(()); // page-pool bootstrap root: no predecessor to retire
        };

        let old_writer = self.version(old_vid)?.writer;
        if let Some(writer_id) = old_writer {
            if let Some(w) = self.transactions.get_mut(&writer_id) {
                w.update_set.remove(&page);
            }
            self.version_mut(old_vid)?.writer = None;
            self.try_remove_transaction(writer_id)?;
        }

        let stale_readers: Vec<TransactionId> = {
            let old = self.version(old_vid)?;
            old.readers.iter().copied().filter(|r| self.transactions.get(r).map(|t| !t.status.is_private()).unwrap_or(true)).collect()
        };
        for reader in stale_readers {
            self.version_mut(old_vid)?.readers.remove(&reader);
            if let Some(rt) = self.transactions.get_mut(&reader) {
                rt.read_set.remove(&page);
            }
            self.try_remove_transaction(reader)?;
        }

        self.version_mut(old_vid)?.superseder = None;
        self.version_mut(new_vid)?.prev = None;
        self.try_remove_version(old_vid)
    }

    /// Propagates a failure outward from a transaction about to become
    /// Aborted to everything that already depends on its (public or
    /// private) work, then transitions it. `updated_pages` accumulates the
    /// set of pages whose rollback downstream private transactions must
    /// eagerly observe (see `enter_failed`).
    fn cascade_abort(&mut self, txn_id: TransactionId, mut updated_pages: HashSet<PageOrdinal>) -> CoordinatorResult<()> {
        let status = self.txn(txn_id)?.status;
        match status {
            Status::Committed => Err(CoordinatorError::Invariant(format!("cascade reached committed transaction {txn_id}"))),
            Status::Aborted => Ok(()), // diamond protection
            Status::Running | Status::Failed => self.enter_failed(txn_id, updated_pages),
            Status::Ready | Status::Prepared => {
                let update_entries: Vec<(PageOrdinal, VersionId)> = self.transactions[&txn_id].update_set.iter().map(|(p, v)| (*p, *v)).collect();
                for (page, vid) in update_entries {
                    updated_pages.insert(page);
                    let (superseder, readers) = {
                        let v = self.version(vid)?;
                        (v.superseder, v.readers.iter().copied().collect::<Vec<_>>())
                    };
                    if let Some(s) = superseder {
                        self.cascade_abort(s, updated_pages.clone())?;
                    }
                    for r in readers {
                        if r != txn_id {
                            self.cascade_abort(r, updated_pages.clone())?;
                        }
                    }
                }
                self.enter_aborted(txn_id)
            }
        }
    }

    /// On entry to Failed, a transaction eagerly re-reads every page an
    /// aborting predecessor had updated, so the rest of its body (and its
    /// eventual `end()`) observes the rollback instead of stale data.
    fn enter_failed(&mut self, txn_id: TransactionId, updated_pages: HashSet<PageOrdinal>) -> CoordinatorResult<()> {
        self.set_status(txn_id, Status::Failed);
        for page in updated_pages {
            self.eager_reread(txn_id, page)?;
        }
        Ok(())
    }

    /// Forces a fresh resolution of `page` for a transaction whose cached
    /// read (if any) may now be stale because a predecessor's write to that
    /// page was just rolled back. A no-op if the transaction is itself
    /// updating `page` — its own private fork is unaffected by a
    /// predecessor's rollback.
    fn eager_reread(&mut self, txn_id: TransactionId, page: PageOrdinal) -> CoordinatorResult<()> {
        if self.transactions[&txn_id].update_set.contains_key(&page) {
            return Ok(());
        }
        if let Some(old_vid) = self.transactions[&txn_id].read_set.remove(&page) {
            if let Some(v) = self.versions.get_mut(&old_vid) {
                v.readers.remove(&txn_id);
            }
            self.try_remove_version(old_vid)?;
        }
        let resolved = self.resolve_access(txn_id, page)?;
        self.record_access(txn_id, resolved)?;
        self.txn_mut(txn_id)?.read_set.insert(page, resolved);
        Ok(())
    }

    /// The terminal transition. Rolls back anything this transaction had
    /// already made public, then probes for graph removal (see
    /// `finalize_aborted`, which is re-entrant: a dependent that hasn't
    /// finalized yet just means removal is retried later, when that
    /// dependent's own finalization drops the edge back to us).
    fn enter_aborted(&mut self, txn_id: TransactionId) -> CoordinatorResult<()> {
        self.set_status(txn_id, Status::Aborted);

        let update_entries: Vec<(PageOrdinal, VersionId)> = self.transactions[&txn_id].update_set.iter().map(|(p, v)| (*p, *v)).collect();

        for (page, new_vid) in &update_entries {
            if let Some(old_vid) = self.version(*new_vid)?.prev {
                let was_superseder = self.version(old_vid)?.superseder == Some(txn_id);
                if was_superseder {
                    self.version_mut(old_vid)?.superseder = None;
                    self.version_mut(old_vid)?.readers.insert(txn_id);
                    let page_still_points_here = self.pages.get(page).map(|pg| pg.latest_version) == Some(*new_vid);
                    if page_still_points_here {
                        self.pages.get_mut(page).ok_or(CoordinatorError::UnknownPage(*page))?.latest_version = old_vid;
                    }
                }
                self.version_mut(old_vid)?.candidates.remove(&txn_id);
            }
        }

        // A predecessor's abort can never satisfy the tightened "every
        // predecessor Committed" probe (see Open Question 1 in DESIGN.md) —
        // it never will, since this transaction just became Aborted instead.
        // Drop that now-permanently-stale wait here and recheck any Ready
        // successor's remaining predecessors, mirroring the notification
        // Committed-on-entry gives its own waiting successors. Without this,
        // a successor blocked solely on this transaction would sit in Ready
        // forever.
        let ready_successors: Vec<TransactionId> = self.transactions[&txn_id]
            .next
            .iter()
            .copied()
            .filter(|n| self.transactions.get(n).map(|t| t.status == Status::Ready).unwrap_or(false))
            .collect();
        for n in ready_successors {
            graph::drop_edge(&mut self.transactions, txn_id, n);
            self.try_ready_to_prepared(n)?;
        }

        self.try_remove_transaction(txn_id)
    }

    /// The graph-removal half of `Aborted` on-entry (spec §4.4's
    /// `try2Transit` probe), factored out of `enter_aborted` so it can be
    /// re-run later: if this transaction's `next` set was non-empty the
    /// first time, it does nothing, and the dependent that eventually
    /// empties that set re-triggers this same probe via
    /// `try_remove_transaction` (see the recursive call to it in the
    /// predecessor loop below, and in the `Committed`/`Aborted` dispatch in
    /// `try_remove_transaction`). Without this re-entrancy, a predecessor
    /// finalized before all of its dependents would never drop its own
    /// predecessor edges and would leak in the transaction arena forever.
    fn finalize_aborted(&mut self, txn_id: TransactionId) -> CoordinatorResult<()> {
        let next_empty = match self.transactions.get(&txn_id) {
            Some(t) => t.next.is_empty(),
            None => return Ok(()), // already finalized
        };
        if !next_empty {
            return Ok(());
        }

        let preds: Vec<TransactionId> = self.transactions[&txn_id].prev.iter().copied().collect();
        for p in preds {
            graph::drop_edge(&mut self.transactions, p, txn_id);
            self.try_remove_transaction(p)?;
        }
        if let Some(t) = self.transactions.get_mut(&txn_id) {
            t.prev.clear();
        }

        let update_entries: Vec<(PageOrdinal, VersionId)> = self.transactions[&txn_id].update_set.iter().map(|(p, v)| (*p, *v)).collect();
        for (_page, new_vid) in &update_entries {
            if let Some(old_vid) = self.version(*new_vid)?.prev {
                self.version_mut(old_vid)?.readers.remove(&txn_id);
                self.try_remove_version(old_vid)?;
            }
            self.version_mut(*new_vid)?.writer = None;
            self.try_remove_version(*new_vid)?;
        }
        if let Some(t) = self.transactions.get_mut(&txn_id) {
            t.update_set.clear();
        }

        let read_entries: Vec<VersionId> = self.transactions[&txn_id].read_set.values().copied().collect();
        for vid in read_entries {
            self.version_mut(vid)?.readers.remove(&txn_id);
            self.try_remove_version(vid)?;
        }
        if let Some(t) = self.transactions.get_mut(&txn_id) {
            t.read_set.clear();
        }

        self.transactions.remove(&txn_id);
        self.hooks.removed(txn_id);
        tracing::debug!(txn = %txn_id, "removed from graph");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Arena bookkeeping
    // ---------------------------------------------------------------

    fn set_status(&mut self, txn_id: TransactionId, to: Status) {
        if let Some(txn) = self.transactions.get_mut(&txn_id) {
            let from = txn.status;
            txn.status = to;
            if matches!(to, Status::Failed | Status::Aborted) {
                tracing::warn!(txn = %txn_id, %from, %to, "transition");
            } else {
                tracing::debug!(txn = %txn_id, %from, %to, "transition");
            }
        }
    }

    fn try_remove_version(&mut self, vid: VersionId) -> CoordinatorResult<()> {
        let removable = self.versions.get(&vid).map(|v| v.is_removable()).unwrap_or(false);
        if removable {
            self.versions.remove(&vid);
        }
        Ok(())
    }

    /// A Committed transaction leaves the graph once its read/update/next
    /// sets are all empty; an Aborted one once `next` is empty, which may
    /// require dropping its own predecessor edges first (see
    /// `finalize_aborted`). Calling this on a transaction that isn't yet
    /// eligible, or that has already left the graph, is a no-op, so call
    /// sites can probe speculatively after touching any of those sets.
    fn try_remove_transaction(&mut self, txn_id: TransactionId) -> CoordinatorResult<()> {
        let status = match self.transactions.get(&txn_id) {
            Some(t) => t.status,
            None => return Ok(()),
        };
        match status {
            Status::Committed => {
                let t = &self.transactions[&txn_id];
                let removable = t.prev.is_empty() && t.read_set.is_empty() && t.update_set.is_empty() && t.next.is_empty();
                if removable {
                    self.transactions.remove(&txn_id);
                    self.hooks.removed(txn_id);
                    tracing::debug!(txn = %txn_id, "removed from graph");
                }
                Ok(())
            }
            Status::Aborted => self.finalize_aborted(txn_id),
            _ => Ok(()),
        }
    }

    fn fresh_version_id(&mut self) -> VersionId {
        let id = VersionId(self.next_version_id);
        self.next_version_id += 1;
        id
    }

    fn txn(&self, txn_id: TransactionId) -> CoordinatorResult<&Transaction> {
        self.transactions.get(&txn_id).ok_or(CoordinatorError::UnknownTransaction(txn_id))
    }

    fn txn_mut(&mut self, txn_id: TransactionId) -> CoordinatorResult<&mut Transaction> {
        self.transactions.get_mut(&txn_id).ok_or(CoordinatorError::UnknownTransaction(txn_id))
    }

    fn version(&self, vid: VersionId) -> CoordinatorResult<&Version> {
        self.versions.get(&vid).ok_or_else(|| CoordinatorError::Invariant(format!("version {vid} missing from arena")))
    }

    fn version_mut(&mut self, vid: VersionId) -> CoordinatorResult<&mut Version> {
        self.versions.get_mut(&vid).ok_or_else(|| CoordinatorError::Invariant(format!("version {vid} missing from arena")))
    }

    fn reject(&self, operation: &'static str, txn: TransactionId, status: Status) -> CoordinatorError {
        CoordinatorError::Protocol(ProtocolError { operation, txn, status })
    }
}


/// Randomized checks of the invariants that must hold after *every*
/// coordinator operation, not just the seed scenarios above. Lives in this
/// module (rather than under `tests/`) because it needs to inspect the
/// arenas directly — there is no public accessor for them, by design.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Begin,
        Read(usize, usize),
        Update(usize, usize),
        End(usize),
    }

    const SLOTS: usize = 4;
    const PAGES: usize = 3;

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            2 => Just(Op::Begin),
            4 => (0..SLOTS, 0..PAGES).prop_map(|(t, p)| Op::Read(t, p)),
            4 => (0..SLOTS, 0..PAGES).prop_map(|(t, p)| Op::Update(t, p)),
            3 => (0..SLOTS).prop_map(Op::End),
        ]
    }

    /// Checks §8 invariants 1-7 against the coordinator's current internal
    /// state. Invariant 8 (the version chain is a total order) is folded
    /// into invariant 3's walk, since walking `prev` from `latest_version`
    /// IS that chain.
    fn check_invariants(c: &Coordinator<LocalHooks>) {
        for (&id, t) in &c.transactions {
            assert!(!t.prev.contains(&id), "txn {id} would precede itself");
            assert!(!t.next.contains(&id), "txn {id} would succeed itself");
        }

        let ids: Vec<TransactionId> = c.transactions.keys().copied().collect();
        for &a in &ids {
            for &b in &ids {
                if a != b {
                    assert!(
                        !(graph::does_succeed(&c.transactions, a, b) && graph::does_succeed(&c.transactions, b, a)),
                        "{a} and {b} succeed each other: precedence cycle"
                    );
                }
            }
        }

        for (&ord, page) in &c.pages {
            let mut seen = HashSet::new();
            let mut cursor = Some(page.latest_version);
            let mut first = true;
            while let Some(vid) = cursor {
                assert!(seen.insert(vid), "page {ord}'s version chain revisits {vid:?}: not a total order");
                let v = c.versions.get(&vid).unwrap_or_else(|| panic!("page {ord}'s chain points at missing version {vid:?}"));
                if first {
                    if let Some(w) = v.writer {
                        if let Some(wt) = c.transactions.get(&w) {
                            assert!(wt.status.is_public(), "page {ord}'s latest writer {w} is {:?}, not public", wt.status);
                        }
                    }
                    first = false;
                }
                cursor = v.prev;
            }
        }

        for v in c.versions.values() {
            if let Some(s) = v.superseder {
                if let Some(st) = c.transactions.get(&s) {
                    assert!(st.status.is_public(), "version {:?}'s superseder {s} is {:?}, not public", v.id, st.status);
                }
            }
            for &cand in &v.candidates {
                if let Some(ct) = c.transactions.get(&cand) {
                    assert!(ct.status.is_private(), "version {:?}'s candidate {cand} is {:?}, not private", v.id, ct.status);
                }
            }
        }

        for t in c.transactions.values() {
            if t.status == Status::Committed {
                assert!(t.prev.is_empty(), "committed txn {} still has live predecessors: cascade reached it", t.id);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn invariants_survive_random_operation_sequences(ops in proptest::collection::vec(op_strategy(), 1..60)) {
            let mut c = Coordinator::new(CoordinatorConfig { initial_pages: PAGES });
            let mut slots: [Option<TransactionId>; SLOTS] = [None; SLOTS];

            for op in ops {
                match op {
                    Op::Begin => {
                        if let Some(slot) = slots.iter().position(Option::is_none) {
                            slots[slot] = Some(c.begin(None));
                        }
                    }
                    Op::Read(t, p) => {
                        if let Some(id) = slots[t] {
                            let _ = c.read(id, PageOrdinal(p as u64));
                        }
                    }
                    Op::Update(t, p) => {
                        if let Some(id) = slots[t] {
                            let _ = c.update(id, PageOrdinal(p as u64));
                        }
                    }
                    Op::End(t) => {
                        if let Some(id) = slots[t] {
                            let status = c.end(id).unwrap();
                            if status.is_terminal() {
                                slots[t] = None;
                            }
                        }
                    }
                }
                check_invariants(&c);
            }

            // Draining every remaining open transaction must also leave the
            // invariants intact, and every Committed one with no dangling
            // readers/updates should fully retire.
            for slot in slots.into_iter().flatten() {
                let _ = c.end(slot);
                check_invariants(&c);
            }
        }
    }
}
