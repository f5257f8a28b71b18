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

//! Product records and their bid/payment state machine.
//!
//! Status transitions
//!
//! ```text
//! Open --confirm payment (highest bidder)--> Sold
//!   |
//!   +---cancel (owner, no bids)-----------> Cancelled
//! ```
//!
//! Both `Sold` and `Cancelled` are terminal: no further bids, edits, or
//! re-confirmation with different parameters are accepted.

use crate::base::{ProductId, UserId};
use crate::error::MarketError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single accepted bid. Immutable once recorded.
///
/// Invariant: `amount` strictly exceeds the product's highest bid at the
/// time the bid was accepted, so the history is strictly increasing and the
/// current winner is always the last entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub bidder_id: UserId,
    pub amount: Decimal,
    pub placed_at: DateTime<Utc>,
}

/// Lifecycle status of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Open,
    Sold,
    Cancelled,
}

/// Attributes for creating a product.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductDraft {
    pub title: String,
    pub description: String,
    pub starting_price: Decimal,
    pub image_ref: Option<String>,
}

impl ProductDraft {
    /// Explicit field-level validation, run before any record is created.
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.title.trim().is_empty() {
            return Err(MarketError::validation("title", "must not be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(MarketError::validation("description", "must not be empty"));
        }
        if self.starting_price <= Decimal::ZERO {
            return Err(MarketError::validation(
                "starting_price",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Partial update to a product's descriptive metadata.
///
/// Title, description, and starting price are only editable while no bid
/// exists; an image-only patch is permitted regardless of bid history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starting_price: Option<Decimal>,
    pub image_ref: Option<String>,
}

impl ProductPatch {
    pub fn validate(&self) -> Result<(), MarketError> {
        if let Some(title) = &self.title
            && title.trim().is_empty()
        {
            return Err(MarketError::validation("title", "must not be empty"));
        }
        if let Some(description) = &self.description
            && description.trim().is_empty()
        {
            return Err(MarketError::validation("description", "must not be empty"));
        }
        if let Some(price) = self.starting_price
            && price <= Decimal::ZERO
        {
            return Err(MarketError::validation(
                "starting_price",
                "must be positive",
            ));
        }
        Ok(())
    }

    /// True when the patch touches fields frozen by an existing bid.
    fn touches_restricted_fields(&self) -> bool {
        self.title.is_some() || self.description.is_some() || self.starting_price.is_some()
    }

    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.starting_price.is_none()
            && self.image_ref.is_none()
    }
}

/// Immutable, serializable view of a product at a point in time.
///
/// The embedded version ties the snapshot to the record state it was read
/// from; conditional commits use it to detect lost updates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub image_ref: Option<String>,
    pub starting_price: Decimal,
    pub current_highest_bid: Decimal,
    pub current_highest_bidder: Option<UserId>,
    pub status: ProductStatus,
    pub bid_history: Vec<Bid>,
    pub payment_reference: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) version: u64,
}

#[derive(Debug)]
struct ProductData {
    id: ProductId,
    owner_id: UserId,
    title: String,
    description: String,
    image_ref: Option<String>,
    starting_price: Decimal,
    current_highest_bid: Decimal,
    current_highest_bidder: Option<UserId>,
    status: ProductStatus,
    /// Append-only, insertion-ordered record of accepted bids.
    bid_history: Vec<Bid>,
    payment_reference: Option<String>,
    confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Bumped on every committed mutation.
    version: u64,
    /// Tombstone set under the record lock right before the ledger drops
    /// the record, so no commit can land on a removed product.
    deleted: bool,
}

impl ProductData {
    fn new(id: ProductId, owner_id: UserId, draft: ProductDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id,
            title: draft.title,
            description: draft.description,
            image_ref: draft.image_ref,
            starting_price: draft.starting_price,
            current_highest_bid: draft.starting_price,
            current_highest_bidder: None,
            status: ProductStatus::Open,
            bid_history: Vec::new(),
            payment_reference: None,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
            deleted: false,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.current_highest_bid >= self.starting_price,
            "Invariant violated: highest bid {} below starting price {}",
            self.current_highest_bid,
            self.starting_price
        );
        match self.bid_history.last() {
            Some(last) => {
                debug_assert!(
                    last.amount == self.current_highest_bid
                        && self.current_highest_bidder == Some(last.bidder_id),
                    "Invariant violated: winner not derivable from last history entry"
                );
            }
            None => {
                debug_assert!(
                    self.current_highest_bid == self.starting_price
                        && self.current_highest_bidder.is_none(),
                    "Invariant violated: highest bid set without any bid on record"
                );
            }
        }
        if self.status == ProductStatus::Sold {
            debug_assert!(
                self.payment_reference.is_some() && !self.bid_history.is_empty(),
                "Invariant violated: sold product without a confirmed payment"
            );
        }
    }

    /// Appends an accepted bid and advances the highest-bid state.
    fn apply_bid(&mut self, bid: Bid) -> Result<(), MarketError> {
        if self.status != ProductStatus::Open {
            return Err(MarketError::InvalidState);
        }
        if bid.bidder_id == self.owner_id {
            return Err(MarketError::Forbidden);
        }
        if bid.amount <= self.current_highest_bid {
            return Err(MarketError::validation(
                "amount",
                format!(
                    "bid must strictly exceed the current highest bid of {}",
                    self.current_highest_bid
                ),
            ));
        }
        self.current_highest_bid = bid.amount;
        self.current_highest_bidder = Some(bid.bidder_id);
        self.updated_at = bid.placed_at;
        self.bid_history.push(bid);
        self.version += 1;
        self.assert_invariants();
        Ok(())
    }

    /// Transitions an open product with a verified payment to `Sold`.
    fn apply_sale(
        &mut self,
        caller_id: UserId,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError> {
        if self.status != ProductStatus::Open || self.bid_history.is_empty() {
            return Err(MarketError::InvalidState);
        }
        if self.current_highest_bidder != Some(caller_id) {
            return Err(MarketError::Forbidden);
        }
        self.status = ProductStatus::Sold;
        self.payment_reference = Some(reference.to_string());
        self.confirmed_at = Some(now);
        self.updated_at = now;
        self.version += 1;
        self.assert_invariants();
        Ok(())
    }

    fn apply_patch(&mut self, patch: ProductPatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(price) = patch.starting_price {
            // No bid exists at this point, so the highest-bid floor moves
            // together with the starting price.
            self.starting_price = price;
            self.current_highest_bid = price;
        }
        if let Some(image_ref) = patch.image_ref {
            self.image_ref = Some(image_ref);
        }
        self.updated_at = now;
        self.version += 1;
        self.assert_invariants();
    }

    fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title.clone(),
            description: self.description.clone(),
            image_ref: self.image_ref.clone(),
            starting_price: self.starting_price,
            current_highest_bid: self.current_highest_bid,
            current_highest_bidder: self.current_highest_bidder,
            status: self.status,
            bid_history: self.bid_history.clone(),
            payment_reference: self.payment_reference.clone(),
            confirmed_at: self.confirmed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}

/// One auctionable item and its bid/payment state.
///
/// All mutation happens under the record's own lock, so a failed operation
/// never leaves a partial write behind. Cross-request atomicity is provided
/// by the version counter: conditional commits fail with
/// [`MarketError::Conflict`] when the record changed since it was read.
#[derive(Debug)]
pub struct Product {
    inner: Mutex<ProductData>,
}

impl Product {
    pub(crate) fn new(
        id: ProductId,
        owner_id: UserId,
        draft: ProductDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            inner: Mutex::new(ProductData::new(id, owner_id, draft, now)),
        }
    }

    pub fn id(&self) -> ProductId {
        self.inner.lock().id
    }

    pub fn owner_id(&self) -> UserId {
        self.inner.lock().owner_id
    }

    /// Takes a consistent point-in-time view of the record.
    pub fn snapshot(&self) -> ProductSnapshot {
        self.inner.lock().snapshot()
    }

    /// Conditionally appends a bid, keyed on the version the caller read.
    ///
    /// Validation and the write happen as a single atomic unit under the
    /// record lock; a concurrent commit since the read fails with
    /// [`MarketError::Conflict`] instead of silently overwriting.
    pub(crate) fn commit_bid(
        &self,
        expected_version: u64,
        bid: Bid,
    ) -> Result<ProductSnapshot, MarketError> {
        let mut data = self.inner.lock();
        if data.deleted {
            return Err(MarketError::NotFound);
        }
        if data.version != expected_version {
            return Err(MarketError::Conflict);
        }
        data.apply_bid(bid)?;
        Ok(data.snapshot())
    }

    /// Conditional `Open -> Sold` transition after external verification.
    ///
    /// Guarded by "still the version the payment was verified against",
    /// which implies still open, still this bidder, still this amount.
    /// Re-confirmation of an already-sold product by the winning bidder with
    /// the same reference is convergent and returns the existing sold state.
    pub(crate) fn commit_sale(
        &self,
        expected_version: u64,
        caller_id: UserId,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<ProductSnapshot, MarketError> {
        let mut data = self.inner.lock();
        if data.deleted {
            return Err(MarketError::NotFound);
        }
        if data.status == ProductStatus::Sold {
            // Only the winning bidder may observe the sold record through a
            // replay; anyone else is rejected even with the right reference.
            if data.current_highest_bidder != Some(caller_id) {
                return Err(MarketError::Forbidden);
            }
            return if data.payment_reference.as_deref() == Some(reference) {
                Ok(data.snapshot())
            } else {
                Err(MarketError::InvalidState)
            };
        }
        if data.version != expected_version {
            return Err(MarketError::Conflict);
        }
        data.apply_sale(caller_id, reference, now)?;
        Ok(data.snapshot())
    }

    /// Owner-only metadata update; price/title/description are frozen by the
    /// first bid, image edits stay allowed.
    pub(crate) fn update(
        &self,
        caller_id: UserId,
        patch: ProductPatch,
        now: DateTime<Utc>,
    ) -> Result<ProductSnapshot, MarketError> {
        patch.validate()?;
        let mut data = self.inner.lock();
        if data.deleted {
            return Err(MarketError::NotFound);
        }
        if caller_id != data.owner_id {
            return Err(MarketError::Forbidden);
        }
        if data.status != ProductStatus::Open {
            return Err(MarketError::InvalidState);
        }
        if !data.bid_history.is_empty() && patch.touches_restricted_fields() {
            return Err(MarketError::Conflict);
        }
        if !patch.is_empty() {
            data.apply_patch(patch, now);
        }
        Ok(data.snapshot())
    }

    /// Owner-only `Open -> Cancelled` transition, permitted while no bid
    /// exists.
    pub(crate) fn cancel(
        &self,
        caller_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ProductSnapshot, MarketError> {
        let mut data = self.inner.lock();
        if data.deleted {
            return Err(MarketError::NotFound);
        }
        if caller_id != data.owner_id {
            return Err(MarketError::Forbidden);
        }
        if data.status != ProductStatus::Open {
            return Err(MarketError::InvalidState);
        }
        if !data.bid_history.is_empty() {
            return Err(MarketError::Conflict);
        }
        data.status = ProductStatus::Cancelled;
        data.updated_at = now;
        data.version += 1;
        Ok(data.snapshot())
    }

    /// Tombstones the record ahead of its removal from the ledger.
    ///
    /// Runs the owner and no-bids preconditions and the flag write as one
    /// atomic unit, so a racing bid either commits before the tombstone
    /// (this fails with [`MarketError::Conflict`]) or finds the record gone.
    pub(crate) fn mark_deleted(&self, caller_id: UserId) -> Result<(), MarketError> {
        let mut data = self.inner.lock();
        if data.deleted {
            return Err(MarketError::NotFound);
        }
        if caller_id != data.owner_id {
            return Err(MarketError::Forbidden);
        }
        if !data.bid_history.is_empty() {
            return Err(MarketError::Conflict);
        }
        data.deleted = true;
        Ok(())
    }
}
