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

//! Bid evaluation.
//!
//! The [`BidEvaluator`] validates incoming bid requests against ledger state
//! and applies them through a version-guarded commit. Two concurrent bids
//! read the same highest-bid state; the commit only applies for the request
//! whose read is still current, so a lost update can never silently
//! overwrite a higher bid. The loser is re-validated against the fresh state
//! and, if its amount no longer wins, rejected like any late bid.

use crate::base::{ProductId, UserId};
use crate::error::MarketError;
use crate::ledger::ProductLedger;
use crate::product::{Bid, ProductSnapshot};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// How many times a lost conditional commit is retried before surfacing
/// [`MarketError::Conflict`] to the caller.
const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Validates and applies bid requests against the product ledger.
pub struct BidEvaluator {
    ledger: Arc<ProductLedger>,
}

impl BidEvaluator {
    pub fn new(ledger: Arc<ProductLedger>) -> Self {
        Self { ledger }
    }

    /// Places a bid on an open product.
    ///
    /// On success the bid is appended to the history and the highest-bid
    /// state advances, all as one atomic unit. Returns the updated product.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] - Product does not exist.
    /// - [`MarketError::InvalidState`] - Product is sold or cancelled.
    /// - [`MarketError::Forbidden`] - Bidder owns the product.
    /// - [`MarketError::Validation`] - Amount does not strictly exceed the
    ///   current highest bid (ties rejected).
    /// - [`MarketError::Conflict`] - Concurrent bids kept winning the
    ///   record for every retry; the caller may retry.
    #[instrument(skip(self), fields(product_id = %product_id, bidder_id = %bidder_id))]
    pub fn place_bid(
        &self,
        product_id: ProductId,
        bidder_id: UserId,
        amount: Decimal,
    ) -> Result<ProductSnapshot, MarketError> {
        let product = self.ledger.product(product_id)?;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let observed = product.snapshot();
            let bid = Bid {
                bidder_id,
                amount,
                placed_at: Utc::now(),
            };

            match product.commit_bid(observed.version, bid) {
                Ok(snapshot) => {
                    debug!(amount = %amount, attempt, "bid accepted");
                    return Ok(snapshot);
                }
                // Somebody committed between our read and our commit;
                // re-read and re-validate against the fresh state.
                Err(MarketError::Conflict) => continue,
                Err(other) => return Err(other),
            }
        }

        warn!(amount = %amount, "bid lost {MAX_COMMIT_ATTEMPTS} commit races");
        Err(MarketError::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{ProductDraft, ProductStatus};
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<ProductLedger>, BidEvaluator, ProductId) {
        let ledger = Arc::new(ProductLedger::new());
        let evaluator = BidEvaluator::new(Arc::clone(&ledger));
        let product = ledger
            .create(
                UserId(1),
                ProductDraft {
                    title: "Old synthesizer".to_string(),
                    description: "Juno-106, recently serviced".to_string(),
                    starting_price: dec!(10.00),
                    image_ref: None,
                },
            )
            .unwrap();
        (ledger, evaluator, product.id)
    }

    #[test]
    fn accepted_bid_updates_ledger_state() {
        let (ledger, evaluator, id) = setup();
        let snapshot = evaluator.place_bid(id, UserId(2), dec!(15.00)).unwrap();

        assert_eq!(snapshot.current_highest_bid, dec!(15.00));
        assert_eq!(snapshot.current_highest_bidder, Some(UserId(2)));
        assert_eq!(snapshot.status, ProductStatus::Open);

        // The returned snapshot reflects the stored record.
        let stored = ledger.get(id).unwrap();
        assert_eq!(stored.current_highest_bid, dec!(15.00));
        assert_eq!(stored.bid_history.len(), 1);
    }

    #[test]
    fn bid_on_missing_product_is_not_found() {
        let (_ledger, evaluator, _id) = setup();
        let result = evaluator.place_bid(ProductId(999), UserId(2), dec!(15.00));
        assert_eq!(result.err(), Some(MarketError::NotFound));
    }

    #[test]
    fn tie_bid_is_rejected() {
        let (_ledger, evaluator, id) = setup();
        evaluator.place_bid(id, UserId(2), dec!(15.00)).unwrap();

        let result = evaluator.place_bid(id, UserId(3), dec!(15.00));
        assert!(matches!(
            result,
            Err(MarketError::Validation { field: "amount", .. })
        ));
    }

    #[test]
    fn owner_cannot_bid() {
        let (_ledger, evaluator, id) = setup();
        let result = evaluator.place_bid(id, UserId(1), dec!(50.00));
        assert_eq!(result.err(), Some(MarketError::Forbidden));
    }
}
