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

//! Payment confirmation.
//!
//! The [`PaymentConfirmer`] validates a payment-confirmation request,
//! delegates verification of the payment reference to the external
//! [`PaymentProcessor`], and applies the `Open -> Sold` transition through a
//! version-guarded commit. The ledger record is only mutated after
//! verification succeeds; a timed-out or failed verification leaves the
//! product untouched.

use crate::base::{ProductId, UserId};
use crate::error::MarketError;
use crate::ledger::ProductLedger;
use crate::product::{ProductSnapshot, ProductStatus};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Outcome reported by the payment processor for a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub verified: bool,
    pub amount_paid: Decimal,
}

/// Failure talking to the payment processor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    /// Transport-level failure; the processor could not be reached
    #[error("payment processor unreachable: {0}")]
    Unreachable(String),

    /// The processor answered but refused to verify the reference
    #[error("payment processor rejected the request: {0}")]
    Rejected(String),
}

/// External payment-processor collaborator.
///
/// The confirmer treats implementations as a black box: given a payment
/// reference and the amount it is expected to cover, report whether the
/// reference is paid and for how much.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn verify(
        &self,
        reference: &str,
        expected_amount: Decimal,
    ) -> Result<PaymentVerification, ProcessorError>;
}

/// HTTP-backed payment processor client.
///
/// Posts `{reference, expected_amount}` to the configured endpoint and
/// expects a [`PaymentVerification`] JSON body back.
pub struct HttpPaymentProcessor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPaymentProcessor {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    reference: &'a str,
    expected_amount: Decimal,
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    async fn verify(
        &self,
        reference: &str,
        expected_amount: Decimal,
    ) -> Result<PaymentVerification, ProcessorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&VerifyRequest {
                reference,
                expected_amount,
            })
            .send()
            .await
            .map_err(|err| ProcessorError::Unreachable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ProcessorError::Rejected(format!(
                "endpoint returned {}",
                response.status()
            )));
        }
        response
            .json::<PaymentVerification>()
            .await
            .map_err(|err| ProcessorError::Rejected(err.to_string()))
    }
}

/// Development stand-in that verifies every reference at the expected
/// amount. Wired by the server only when no processor endpoint is
/// configured; never use it with real money.
pub struct AcceptAllProcessor;

#[async_trait]
impl PaymentProcessor for AcceptAllProcessor {
    async fn verify(
        &self,
        _reference: &str,
        expected_amount: Decimal,
    ) -> Result<PaymentVerification, ProcessorError> {
        Ok(PaymentVerification {
            verified: true,
            amount_paid: expected_amount,
        })
    }
}

/// Validates and applies payment-confirmation events.
pub struct PaymentConfirmer {
    ledger: Arc<ProductLedger>,
    processor: Arc<dyn PaymentProcessor>,
    verification_timeout: Duration,
}

impl PaymentConfirmer {
    pub fn new(
        ledger: Arc<ProductLedger>,
        processor: Arc<dyn PaymentProcessor>,
        verification_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            processor,
            verification_timeout,
        }
    }

    /// Confirms payment for a product's winning bid, transitioning it to
    /// `Sold`.
    ///
    /// Idempotent: the winning bidder re-confirming an already-sold product
    /// with the same verified reference gets the existing sold state back; a
    /// different reference fails with [`MarketError::InvalidState`], and any
    /// other caller gets [`MarketError::Forbidden`] sold or not.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] - Product does not exist.
    /// - [`MarketError::Forbidden`] - Caller is not the current highest
    ///   bidder (checked before the processor is consulted).
    /// - [`MarketError::InvalidState`] - No bids yet, product cancelled, or
    ///   sold under a different reference.
    /// - [`MarketError::PaymentVerification`] - Processor reported the
    ///   reference invalid, unpaid, or amount-mismatched, or the call
    ///   timed out.
    /// - [`MarketError::Conflict`] - A higher bid landed while the payment
    ///   was being verified; the caller may retry against the new amount.
    #[instrument(skip(self, reference), fields(product_id = %product_id, caller_id = %caller_id))]
    pub async fn confirm_payment(
        &self,
        product_id: ProductId,
        caller_id: UserId,
        reference: &str,
    ) -> Result<ProductSnapshot, MarketError> {
        if reference.trim().is_empty() {
            return Err(MarketError::validation(
                "payment_reference",
                "must not be empty",
            ));
        }

        let product = self.ledger.product(product_id)?;
        let observed = product.snapshot();

        // All local preconditions are settled before the processor is
        // consulted, so a forbidden caller can never trigger a charge check.
        match observed.status {
            ProductStatus::Sold => {
                // The convergent replay is for the winner alone; a third
                // party holding the reference still gets Forbidden.
                if observed.current_highest_bidder != Some(caller_id) {
                    return Err(MarketError::Forbidden);
                }
                return if observed.payment_reference.as_deref() == Some(reference) {
                    Ok(observed)
                } else {
                    Err(MarketError::InvalidState)
                };
            }
            ProductStatus::Cancelled => return Err(MarketError::InvalidState),
            ProductStatus::Open => {}
        }
        if observed.bid_history.is_empty() {
            return Err(MarketError::InvalidState);
        }
        if observed.current_highest_bidder != Some(caller_id) {
            return Err(MarketError::Forbidden);
        }

        let expected_amount = observed.current_highest_bid;
        let verification = self.verify_bounded(reference, expected_amount).await?;

        if !verification.verified {
            return Err(MarketError::PaymentVerification(
                "processor reports the reference invalid or unpaid".to_string(),
            ));
        }
        if verification.amount_paid != expected_amount {
            return Err(MarketError::PaymentVerification(format!(
                "amount mismatch: paid {}, expected {}",
                verification.amount_paid, expected_amount
            )));
        }

        // The record may have moved while the processor was consulted; the
        // version guard refuses to sell against anything but the verified
        // amount and bidder.
        let snapshot = product.commit_sale(observed.version, caller_id, reference, Utc::now())?;
        info!(amount = %expected_amount, "payment confirmed, product sold");
        Ok(snapshot)
    }

    /// Runs processor verification under the configured timeout; a call
    /// that outlives it surfaces as [`MarketError::PaymentVerification`]
    /// and the ledger record stays untouched.
    async fn verify_bounded(
        &self,
        reference: &str,
        expected_amount: Decimal,
    ) -> Result<PaymentVerification, MarketError> {
        match tokio::time::timeout(
            self.verification_timeout,
            self.processor.verify(reference, expected_amount),
        )
        .await
        {
            Ok(Ok(verification)) => Ok(verification),
            Ok(Err(err)) => {
                warn!(error = %err, "payment verification failed");
                Err(MarketError::PaymentVerification(err.to_string()))
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.verification_timeout.as_millis() as u64,
                    "payment verification timed out"
                );
                Err(MarketError::PaymentVerification(
                    "verification timed out".to_string(),
                ))
            }
        }
    }
}
