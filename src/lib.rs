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

//! # Bid Market
//!
//! This library provides the backend core of a bidding marketplace: a product
//! ledger, a bid evaluator enforcing the strictly-increasing price rule, and an
//! idempotent payment confirmation flow that marks products as sold.
//!
//! ## Core Components
//!
//! - [`ProductLedger`]: Concurrent registry of products and their bid histories
//! - [`BidEvaluator`]: Validates and commits bids under optimistic concurrency
//! - [`PaymentConfirmer`]: Verifies payments and finalizes sales
//! - [`MarketError`]: Error taxonomy shared across all operations
//!
//! ## Example
//!
//! ```
//! use bidmarket_rs::{BidEvaluator, ProductDraft, ProductLedger, ProductStatus, UserId};
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let ledger = Arc::new(ProductLedger::new());
//! let evaluator = BidEvaluator::new(Arc::clone(&ledger));
//!
//! // A seller lists a product
//! let product = ledger
//!     .create(
//!         UserId(1),
//!         ProductDraft {
//!             title: "Vintage camera".to_string(),
//!             description: "Working Leica M3 with case".to_string(),
//!             starting_price: dec!(100.00),
//!             image_ref: None,
//!         },
//!     )
//!     .unwrap();
//!
//! // A buyer outbids the starting price
//! let snapshot = evaluator.place_bid(product.id, UserId(2), dec!(150.00)).unwrap();
//! assert_eq!(snapshot.current_highest_bid, dec!(150.00));
//! assert_eq!(snapshot.status, ProductStatus::Open);
//! ```
//!
//! ## Thread Safety
//!
//! Every mutation re-reads the product under its lock and commits only if the
//! record version is unchanged, so concurrent bids on the same product never
//! interleave and losers see a clean conflict.

mod base;
mod bidding;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
mod ledger;
pub mod payment;
mod product;
pub mod storage;

pub use base::{ProductId, UserId};
pub use bidding::BidEvaluator;
pub use config::MarketConfig;
pub use error::MarketError;
pub use identity::{IdentityProvider, UserDirectory};
pub use ledger::ProductLedger;
pub use payment::{PaymentConfirmer, PaymentProcessor};
pub use product::{Bid, ProductDraft, ProductPatch, ProductSnapshot, ProductStatus};
