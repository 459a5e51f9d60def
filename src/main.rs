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

//! A small scripted walkthrough of the coordinator, useful as a smoke test
//! when there's no host application handy. Not a CLI — wiring this crate
//! into a real host's transaction boundary is out of scope here.

use tracing::info;
use txncoord::{Coordinator, CoordinatorConfig, PageOrdinal, Status, retry};

fn main() {
    tracing_subscriber::fmt::init();

    let mut coordinator = Coordinator::new(CoordinatorConfig { initial_pages: 4 });
    info!(pages = 4, "coordinator ready");

    let t1 = coordinator.begin(None);
    coordinator.update(t1, PageOrdinal(0)).expect("update page 0");
    let status = coordinator.end(t1).expect("end t1");
    info!(txn = %t1, ?status, "writer committed");

    let t2 = coordinator.begin(None);
    let seen = coordinator.read(t2, PageOrdinal(0)).expect("read page 0");
    let status = coordinator.end(t2).expect("end t2");
    info!(txn = %t2, ?status, version = %seen, "reader saw the committed write");

    // Two transactions racing over the same page: one of them loses and is
    // routed to Aborted rather than blocked, so `retry` is how a caller turns
    // that into guaranteed eventual progress.
    let (status, _) = retry(&mut coordinator, None, |c, txn| c.update(txn, PageOrdinal(1))).expect("retry a write against page 1");
    assert_eq!(status, Status::Committed);
    info!("retried write against page 1 eventually committed");
}
