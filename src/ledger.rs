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

//! The product ledger.
//!
//! The [`ProductLedger`] is the authoritative store of product records and
//! their bid/payment state. It owns every [`Product`] for the product's
//! entire lifetime; deletion is only permitted while the bid history is
//! empty and the caller is the owner.
//!
//! # Thread Safety
//!
//! Records live in a [`DashMap`] so requests for different products proceed
//! in parallel; each record carries its own lock and version counter for
//! per-product atomicity (see [`Product`]).

use crate::base::{ProductId, UserId};
use crate::error::MarketError;
use crate::product::{Product, ProductDraft, ProductPatch, ProductSnapshot};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Authoritative store of product records.
///
/// # Invariants
///
/// - Product IDs are unique and never reused.
/// - A product with a non-empty bid history is never removed.
/// - Listings are ordered by creation time, newest first.
pub struct ProductLedger {
    /// Product records indexed by product ID.
    products: DashMap<ProductId, Arc<Product>>,
    /// Product IDs in creation order, for newest-first listings.
    creation_order: Mutex<Vec<ProductId>>,
    /// Next product ID to allocate.
    next_id: AtomicU64,
}

impl ProductLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            products: DashMap::new(),
            creation_order: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Creates a new open product owned by `owner_id`.
    ///
    /// The highest bid starts at the starting price, so the first bid must
    /// strictly exceed it.
    ///
    /// # Errors
    ///
    /// [`MarketError::Validation`] when a required field is missing or the
    /// starting price is not positive.
    pub fn create(
        &self,
        owner_id: UserId,
        draft: ProductDraft,
    ) -> Result<ProductSnapshot, MarketError> {
        draft.validate()?;

        let id = ProductId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let product = Arc::new(Product::new(id, owner_id, draft, Utc::now()));
        let snapshot = product.snapshot();

        self.products.insert(id, product);
        self.creation_order.lock().push(id);

        info!(product_id = %id, owner_id = %owner_id, "product created");
        Ok(snapshot)
    }

    /// Returns a point-in-time view of a product.
    pub fn get(&self, id: ProductId) -> Result<ProductSnapshot, MarketError> {
        Ok(self.product(id)?.snapshot())
    }

    /// All products, newest first. Each call re-queries the ledger.
    pub fn list_all(&self) -> Vec<ProductSnapshot> {
        self.ordered_snapshots(|_| true)
    }

    /// Products owned by `owner_id`, newest first.
    pub fn list_by_owner(&self, owner_id: UserId) -> Vec<ProductSnapshot> {
        self.ordered_snapshots(|snapshot| snapshot.owner_id == owner_id)
    }

    /// Applies an owner-only metadata update.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] - Product does not exist.
    /// - [`MarketError::Forbidden`] - Caller is not the owner.
    /// - [`MarketError::Conflict`] - Bids exist and the patch touches
    ///   title, description, or price.
    /// - [`MarketError::InvalidState`] - Product is sold or cancelled.
    pub fn update(
        &self,
        id: ProductId,
        caller_id: UserId,
        patch: ProductPatch,
    ) -> Result<ProductSnapshot, MarketError> {
        let snapshot = self.product(id)?.update(caller_id, patch, Utc::now())?;
        debug!(product_id = %id, caller_id = %caller_id, "product updated");
        Ok(snapshot)
    }

    /// Cancels an open product. Owner only, and only while no bid exists.
    pub fn cancel(
        &self,
        id: ProductId,
        caller_id: UserId,
    ) -> Result<ProductSnapshot, MarketError> {
        let snapshot = self.product(id)?.cancel(caller_id, Utc::now())?;
        info!(product_id = %id, "product cancelled");
        Ok(snapshot)
    }

    /// Removes a product. Owner only, and only while no bid exists.
    ///
    /// The record is tombstoned under its own lock before the map entry is
    /// removed, so a bid racing the deletion either lands first (deletion
    /// conflicts) or finds the product gone.
    pub fn delete(&self, id: ProductId, caller_id: UserId) -> Result<(), MarketError> {
        let product = self.product(id)?;
        product.mark_deleted(caller_id)?;

        self.products.remove(&id);
        self.creation_order.lock().retain(|entry| *entry != id);
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    /// Number of products currently on record.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Shared handle to the live record, for conditional commits.
    pub(crate) fn product(&self, id: ProductId) -> Result<Arc<Product>, MarketError> {
        self.products
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(MarketError::NotFound)
    }

    fn ordered_snapshots(
        &self,
        keep: impl Fn(&ProductSnapshot) -> bool,
    ) -> Vec<ProductSnapshot> {
        // Clone the index first so no product lock is taken while holding it.
        let ids: Vec<ProductId> = self.creation_order.lock().iter().rev().copied().collect();
        ids.into_iter()
            .filter_map(|id| {
                self.products
                    .get(&id)
                    .map(|entry| entry.value().snapshot())
            })
            .filter(|snapshot| keep(snapshot))
            .collect()
    }
}

impl Default for ProductLedger {
    fn default() -> Self {
        Self::new()
    }
}
