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

//! Property-based tests for the bidding rules.
//!
//! These tests verify invariants that should hold for any sequence of bid
//! attempts, whatever their amounts and bidders.

use bidmarket_rs::{
    BidEvaluator, MarketError, ProductDraft, ProductId, ProductLedger, ProductStatus, UserId,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.0001 to 1000 with 4 decimal places).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000_000i64).prop_map(|fraction| Decimal::new(fraction, 4))
}

/// Generate a bidder distinct from the seller (UserId(1)).
fn arb_bidder() -> impl Strategy<Value = UserId> {
    (2u64..=20u64).prop_map(UserId)
}

fn setup(starting_price: Decimal) -> (Arc<ProductLedger>, BidEvaluator, ProductId) {
    let ledger = Arc::new(ProductLedger::new());
    let evaluator = BidEvaluator::new(Arc::clone(&ledger));
    let product = ledger
        .create(
            UserId(1),
            ProductDraft {
                title: "Auction lot".to_string(),
                description: "Property-tested".to_string(),
                starting_price,
                image_ref: None,
            },
        )
        .unwrap();
    (ledger, evaluator, product.id)
}

// =============================================================================
// Bid Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// The bid history is strictly increasing no matter what sequence of
    /// amounts is thrown at the product.
    #[test]
    fn history_strictly_increasing(
        attempts in prop::collection::vec((arb_bidder(), arb_amount()), 1..30),
    ) {
        let (ledger, evaluator, id) = setup(Decimal::new(5000, 4));

        for (bidder, amount) in attempts {
            let _ = evaluator.place_bid(id, bidder, amount);
        }

        let snapshot = ledger.get(id).unwrap();
        let amounts: Vec<Decimal> =
            snapshot.bid_history.iter().map(|bid| bid.amount).collect();
        for pair in amounts.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }

    /// The highest-bid state is always derivable from the history: it is
    /// the last accepted bid, or the starting price when nothing was
    /// accepted.
    #[test]
    fn winner_matches_last_history_entry(
        starting_price in arb_amount(),
        attempts in prop::collection::vec((arb_bidder(), arb_amount()), 0..30),
    ) {
        let (ledger, evaluator, id) = setup(starting_price);

        for (bidder, amount) in attempts {
            let _ = evaluator.place_bid(id, bidder, amount);
        }

        let snapshot = ledger.get(id).unwrap();
        match snapshot.bid_history.last() {
            Some(last) => {
                prop_assert_eq!(snapshot.current_highest_bid, last.amount);
                prop_assert_eq!(snapshot.current_highest_bidder, Some(last.bidder_id));
            }
            None => {
                prop_assert_eq!(snapshot.current_highest_bid, starting_price);
                prop_assert!(snapshot.current_highest_bidder.is_none());
            }
        }
    }

    /// A bid is accepted exactly when it strictly exceeds the highest bid
    /// observed just before it.
    #[test]
    fn acceptance_matches_strict_increase_rule(
        attempts in prop::collection::vec((arb_bidder(), arb_amount()), 1..30),
    ) {
        let (ledger, evaluator, id) = setup(Decimal::new(5000, 4));

        for (bidder, amount) in attempts {
            let before = ledger.get(id).unwrap().current_highest_bid;
            let result = evaluator.place_bid(id, bidder, amount);

            if amount > before {
                prop_assert!(result.is_ok());
            } else {
                let rejected_for_amount = matches!(
                    result,
                    Err(MarketError::Validation { field: "amount", .. })
                );
                prop_assert!(rejected_for_amount);
                // A rejected bid leaves the record untouched.
                prop_assert_eq!(ledger.get(id).unwrap().current_highest_bid, before);
            }
        }
    }

    /// The highest bid never moves below the starting price and the product
    /// stays open through any rejected sequence.
    #[test]
    fn floor_and_status_hold(
        starting_price in arb_amount(),
        attempts in prop::collection::vec((arb_bidder(), arb_amount()), 0..30),
    ) {
        let (ledger, evaluator, id) = setup(starting_price);

        for (bidder, amount) in attempts {
            let _ = evaluator.place_bid(id, bidder, amount);
            let snapshot = ledger.get(id).unwrap();
            prop_assert!(snapshot.current_highest_bid >= starting_price);
            prop_assert_eq!(snapshot.status, ProductStatus::Open);
        }
    }

    /// Owner bids never land, whatever the amount.
    #[test]
    fn owner_bids_always_rejected(
        amounts in prop::collection::vec(arb_amount(), 1..10),
    ) {
        let (ledger, evaluator, id) = setup(Decimal::new(5000, 4));

        for amount in amounts {
            let result = evaluator.place_bid(id, UserId(1), amount);
            prop_assert_eq!(result.err(), Some(MarketError::Forbidden));
        }

        prop_assert!(ledger.get(id).unwrap().bid_history.is_empty());
    }
}
