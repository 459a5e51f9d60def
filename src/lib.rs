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

//! A local multiversion concurrency-control coordinator implementing
//! commitment ordering.
//!
//! The coordinator manages concurrent transactions over a fixed universe of
//! mutable objects ("pages"), producing histories that are serializable,
//! isolated, recoverable and atomic. Every page keeps a linear public
//! history, and any in-progress transaction's user code can always run to
//! completion without being blocked — conflicts are resolved by routing the
//! loser through the `Failed`/`Aborted` states rather than by locking
//! anyone out.
//!
//! Single-threaded, cooperative, lock-free internally (see
//! [`Coordinator`]'s module docs on concurrency): callers that share a
//! coordinator across threads must serialize access themselves.
//!
//! ```
//! use txncoord::{Coordinator, CoordinatorConfig, PageOrdinal, Status};
//!
//! let mut c = Coordinator::new(CoordinatorConfig { initial_pages: 1 });
//! let t1 = c.begin(None);
//! let (_new, _initial) = c.update(t1, PageOrdinal(0)).unwrap();
//! assert_eq!(c.end(t1).unwrap(), Status::Committed);
//! ```

pub mod coordinator;
pub mod error;
pub mod graph;
pub mod hooks;
pub mod ids;
pub mod page;
pub mod retry;
pub mod transaction;
pub mod version;

pub use coordinator::{Coordinator, CoordinatorConfig};
pub use error::{CoordinatorError, CoordinatorResult, ProtocolError};
pub use hooks::{Hooks, LocalHooks, Vote};
pub use ids::{GlobalId, PageOrdinal, TransactionId, VersionId};
pub use retry::retry;
pub use transaction::{Status, Transaction};
pub use version::Version;
