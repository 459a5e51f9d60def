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

//! Error types for the coordinator.

use crate::ids::{PageOrdinal, TransactionId};
use crate::transaction::Status;

/// A coordinator call was rejected because the transaction was not in a
/// state that honors the requested operation.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
#[error("`{operation}` rejected: transaction {txn} is {status}")]
pub struct ProtocolError {
    pub operation: &'static str,
    pub txn: TransactionId,
    pub status: Status,
}

/// Errors the coordinator can return. Durability and I/O failures never
/// appear here: those belong to host [`Hooks`](crate::hooks::Hooks)
/// implementations and are never inspected by the coordinator itself.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("unknown transaction {0}")]
    UnknownTransaction(TransactionId),

    #[error("unknown page {0}")]
    UnknownPage(PageOrdinal),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;
