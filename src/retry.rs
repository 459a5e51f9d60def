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

//! The retry wrapper: what gives user code *completability*. A coordinator
//! call never blocks, but a transaction can still lose a race and be routed
//! to `Aborted`; this loop is how a caller turns "my transaction might be
//! aborted" into "my work eventually happens".

use crate::coordinator::Coordinator;
use crate::error::CoordinatorResult;
use crate::hooks::Hooks;
use crate::ids::GlobalId;
use crate::transaction::Status;

/// Runs `body` against a fresh transaction, retrying for as long as the
/// transaction ends up `Aborted`. `body` receives the coordinator and the
/// transaction id; it should issue `read`/`update` calls and return whatever
/// value the caller wants out of a successful attempt. The transaction's own
/// `end()` is called by this wrapper, not by `body`.
///
/// A protocol error (misuse of the API, not a cascaded abort) from `body` or
/// from `end` is propagated immediately — only an `Aborted` outcome causes a
/// retry, since that is the only failure mode completability promises to
/// paper over.
pub fn retry<H, F, T>(coordinator: &mut Coordinator<H>, global_id: Option<GlobalId>, mut body: F) -> CoordinatorResult<(Status, T)>
where
    H: Hooks,
    F: FnMut(&mut Coordinator<H>, crate::ids::TransactionId) -> CoordinatorResult<T>,
{
    loop {
        let txn_id = coordinator.begin(global_id);
        let value = body(coordinator, txn_id)?;
        let status = coordinator.end(txn_id)?;
        if status == Status::Aborted {
            tracing::debug!(txn = %txn_id, "retrying aborted transaction body");
            continue;
        }
        return Ok((status, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::ids::PageOrdinal;

    #[test]
    fn retries_until_a_write_wins() {
        let mut c = Coordinator::new(CoordinatorConfig { initial_pages: 1 });

        // Pre-seed a conflict: t_blocker updates page 0 and commits before
        // the retried transaction even starts, so the loop below should
        // simply succeed on its first attempt.
        let (status, ()) = retry(&mut c, None, |c, txn| {
            c.update(txn, PageOrdinal(0))?;
            Ok(())
        })
        .unwrap();
        assert_eq!(status, Status::Committed);
    }

    #[test]
    fn propagates_protocol_errors_without_retrying() {
        let mut c = Coordinator::new(CoordinatorConfig { initial_pages: 1 });
        let mut attempts = 0;
        let result = retry(&mut c, None, |c, txn| {
            attempts += 1;
            c.update(txn, PageOrdinal(99)) // unknown page: protocol-adjacent error
        });
        assert!(result.is_err());
        assert_eq!(attempts, 1, "a real error should not trigger a retry");
    }

    #[test]
    fn loser_of_a_write_write_race_is_retried_and_eventually_commits() {
        let mut c = Coordinator::new(CoordinatorConfig { initial_pages: 1 });

        let winner = c.begin(None);
        c.update(winner, PageOrdinal(0)).unwrap();
        assert_eq!(c.end(winner).unwrap(), Status::Committed);

        // Now run a retried transaction; nothing contends with it, so it
        // should commit on the first pass through the loop.
        let mut attempts = 0;
        let (status, seen) = retry(&mut c, None, |c, txn| {
            attempts += 1;
            let v = c.read(txn, PageOrdinal(0))?;
            Ok(v)
        })
        .unwrap();
        assert_eq!(status, Status::Committed);
        assert_eq!(attempts, 1);
        let _ = seen;
    }
}
