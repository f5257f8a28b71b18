// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for marketplace operations.
//!
//! Every failure kind is terminal for the current request and is surfaced to
//! the caller unchanged; [`MarketError::Conflict`] is the only kind a caller
//! is expected to retry automatically.

use thiserror::Error;

/// Marketplace operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Malformed or out-of-range input, with a field-level reason
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Referenced product does not exist
    #[error("product not found")]
    NotFound,

    /// Caller lacks the rights for this action
    #[error("caller is not allowed to perform this action")]
    Forbidden,

    /// Action is illegal given the product's current status
    #[error("product status does not allow this action")]
    InvalidState,

    /// Optimistic-concurrency collision; the caller should retry
    #[error("concurrent update lost, retry the request")]
    Conflict,

    /// External payment processor rejected the reference or timed out
    #[error("payment verification failed: {0}")]
    PaymentVerification(String),

    /// Missing or invalid identity credentials
    #[error("missing or invalid credentials")]
    Unauthorized,
}

impl MarketError {
    /// Builds a [`MarketError::Validation`] with a field-level reason.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        MarketError::Validation {
            field,
            reason: reason.into(),
        }
    }
}
