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

//! End-to-end seed scenarios exercised purely through the public API, one
//! pool of five pages per scenario.

use txncoord::{Coordinator, CoordinatorConfig, GlobalId, Hooks, PageOrdinal, Status, Transaction, Vote};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn pool() -> Coordinator {
    Coordinator::new(CoordinatorConfig { initial_pages: 5 })
}

/// A host that never self-commits a distributed transaction's `Prepared`
/// state, used to hold a transaction open long enough for a dependent to
/// observe its public-but-uncommitted write.
#[derive(Default)]
struct HoldOpen;

impl Hooks for HoldOpen {
    fn vote_yes(&self, _txn: &Transaction) -> Vote {
        Vote::Wait
    }
}

#[test]
fn s1_sequential_read_write_read() {
    init_tracing();
    let mut c = pool();

    let t1 = c.begin(None);
    let initial = c.read(t1, PageOrdinal(0)).unwrap();
    c.update(t1, PageOrdinal(0)).unwrap();
    assert_eq!(c.end(t1).unwrap(), Status::Committed);

    let t2 = c.begin(None);
    let seen = c.read(t2, PageOrdinal(0)).unwrap();
    assert_ne!(seen, initial, "t2 must see t1's committed write");
    assert_eq!(c.end(t2).unwrap(), Status::Committed);
}

#[test]
fn s2_concurrent_readers_add_no_edges() {
    init_tracing();
    let mut c = pool();

    let t1 = c.begin(None);
    let t2 = c.begin(None);
    c.read(t1, PageOrdinal(0)).unwrap();
    c.read(t2, PageOrdinal(0)).unwrap();
    assert_eq!(c.end(t1).unwrap(), Status::Committed);
    assert_eq!(c.end(t2).unwrap(), Status::Committed);
}

#[test]
fn s3_write_write_race_has_one_loser() {
    init_tracing();
    let mut c = pool();

    let t1 = c.begin(None);
    let t2 = c.begin(None);
    c.read(t1, PageOrdinal(0)).unwrap();
    c.update(t1, PageOrdinal(0)).unwrap();
    c.read(t2, PageOrdinal(0)).unwrap();
    c.update(t2, PageOrdinal(0)).unwrap();

    assert_eq!(c.end(t1).unwrap(), Status::Committed);
    assert_eq!(c.end(t2).unwrap(), Status::Aborted);
    // Idempotence: a second `end()` on an already-terminal transaction
    // returns the same status instead of erroring or re-running the
    // transition.
    assert_eq!(c.end(t2).unwrap(), Status::Aborted);
}

#[test]
fn s4_cascade_reverts_two_pages() {
    init_tracing();
    // T1's write has to be visible to T2 for T2's own write to become a
    // cascade link to T3, so T1 and T2 need to be public (Ready/Prepared)
    // before either resolves — held open here via distributed transactions
    // under a host that never self-commits.
    let mut c = Coordinator::with_hooks(CoordinatorConfig { initial_pages: 5 }, HoldOpen);

    let t1 = c.begin(Some(GlobalId(1)));
    c.update(t1, PageOrdinal(0)).unwrap();
    assert_eq!(c.end(t1).unwrap(), Status::Prepared);

    let t2 = c.begin(Some(GlobalId(2)));
    c.read(t2, PageOrdinal(0)).unwrap();
    c.update(t2, PageOrdinal(1)).unwrap();
    assert_eq!(c.end(t2).unwrap(), Status::Ready);

    let t3 = c.begin(None);
    c.read(t3, PageOrdinal(1)).unwrap();

    assert_eq!(c.abort(t1).unwrap(), Status::Aborted);
    assert_eq!(c.end(t3).unwrap(), Status::Aborted, "t3 read t2's doomed write and must cascade");
}

#[test]
fn s5_prepared_write_is_visible_before_commit() {
    init_tracing();
    let mut c = Coordinator::with_hooks(CoordinatorConfig { initial_pages: 5 }, HoldOpen);

    let t1 = c.begin(Some(GlobalId(1)));
    let (new_version, _initial) = c.update(t1, PageOrdinal(0)).unwrap();
    assert_eq!(c.end(t1).unwrap(), Status::Prepared);

    let t2 = c.begin(None);
    let seen = c.read(t2, PageOrdinal(0)).unwrap();
    assert_eq!(seen, new_version, "t2 must resolve to t1's public, uncommitted version");

    assert_eq!(c.commit(t1).unwrap(), Status::Committed);
    assert_eq!(c.end(t2).unwrap(), Status::Committed);
}

#[test]
fn s6_cross_conflict_does_not_commit_both_sides() {
    init_tracing();
    // T1 writes P0 then reads P1; T2 writes P1 then reads P0. Both sides
    // committing would require T1 < T2 (by P0) and T2 < T1 (by P1)
    // simultaneously — an impossible order. The algorithm must resolve this
    // without ever forming that cycle, so exactly one side survives.
    let mut c = pool();

    let t1 = c.begin(None);
    c.update(t1, PageOrdinal(0)).unwrap();
    c.read(t1, PageOrdinal(1)).unwrap();

    let t2 = c.begin(None);
    c.update(t2, PageOrdinal(1)).unwrap();
    c.read(t2, PageOrdinal(0)).unwrap();

    // T1 settles first (Ready, waiting on T2's still-undecided write), then
    // T2's own `end()` resolves the conflict — which may in turn unblock T1,
    // so re-check T1's status afterwards rather than trusting its first
    // `end()` return value.
    let _ = c.end(t1).unwrap();
    let t2_status = c.end(t2).unwrap();
    let t1_status = c.status(t1).unwrap();

    let outcomes = [t1_status, t2_status];
    assert!(outcomes.contains(&Status::Committed), "at least one side must make progress");
    assert!(!(t1_status == Status::Committed && t2_status == Status::Committed), "both sides committing would require a precedence cycle");
}
