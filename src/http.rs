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

//! HTTP surface.
//!
//! ## Endpoints
//!
//! - `POST /register` - Register a user, returns a bearer token
//! - `GET /products` - List all products (public)
//! - `GET /user-products` - List the caller's products
//! - `POST /products` - Create a product (multipart, optional image)
//! - `GET /products/{id}` - Fetch one product (public)
//! - `PUT /products/{id}` - Update a product (multipart, optional image)
//! - `DELETE /products/{id}` - Delete a product
//! - `PUT /products/{id}/bid` - Place a bid
//! - `POST /products/{id}/confirm-payment` - Confirm the winning payment
//! - `POST /products/{id}/cancel` - Cancel a product without bids
//!
//! Authenticated routes expect `Authorization: Bearer <token>`; the token is
//! resolved through the [`IdentityProvider`] collaborator.

use crate::base::{ProductId, UserId};
use crate::bidding::BidEvaluator;
use crate::error::MarketError;
use crate::identity::{IdentityProvider, Registration, UserDirectory};
use crate::ledger::ProductLedger;
use crate::payment::PaymentConfirmer;
use crate::product::{ProductDraft, ProductPatch, ProductSnapshot};
use crate::storage::{BlobStore, BlobStoreError};
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::error;

// === Application State ===

/// Shared application state wiring the core to its collaborators.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<ProductLedger>,
    pub evaluator: Arc<BidEvaluator>,
    pub confirmer: Arc<PaymentConfirmer>,
    pub directory: Arc<UserDirectory>,
    pub blobs: Arc<dyn BlobStore>,
}

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub contact_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BidRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_reference: String,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Error Handling ===

/// Wrapper for converting failures into HTTP responses.
pub enum AppError {
    Market(MarketError),
    Storage(BlobStoreError),
    BadRequest(String),
}

impl From<MarketError> for AppError {
    fn from(err: MarketError) -> Self {
        AppError::Market(err)
    }
}

impl From<BlobStoreError> for AppError {
    fn from(err: BlobStoreError) -> Self {
        AppError::Storage(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Market(err) => {
                let (status, code) = match &err {
                    MarketError::Validation { .. } => {
                        (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
                    }
                    MarketError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    MarketError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                    MarketError::InvalidState => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_STATE")
                    }
                    MarketError::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
                    MarketError::PaymentVerification(_) => {
                        (StatusCode::PAYMENT_REQUIRED, "PAYMENT_VERIFICATION_FAILED")
                    }
                    MarketError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                };
                (status, code, err.to_string())
            }
            AppError::Storage(err) => {
                error!(error = %err, "blob store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "failed to store the uploaded image".to_string(),
                )
            }
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", message),
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Authentication ===

fn authenticate(
    state: &AppState,
    headers: &axum::http::HeaderMap,
) -> Result<UserId, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(MarketError::Unauthorized)?;
    Ok(state.directory.authenticate(token)?)
}

// === Multipart Form Parsing ===

/// Product form fields shared by create and update. `image` is stored
/// through the blob store and becomes an opaque reference.
#[derive(Default)]
struct ProductForm {
    title: Option<String>,
    description: Option<String>,
    starting_price: Option<Decimal>,
    image_ref: Option<String>,
}

async fn read_product_form(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<ProductForm, AppError> {
    let mut form = ProductForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(format!("malformed multipart body: {err}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "title" => form.title = Some(read_text(field).await?),
            "description" => form.description = Some(read_text(field).await?),
            "starting_price" => {
                let raw = read_text(field).await?;
                let price = Decimal::from_str(raw.trim()).map_err(|_| {
                    MarketError::validation("starting_price", format!("{raw:?} is not a number"))
                })?;
                form.starting_price = Some(price);
            }
            "image" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload".to_string());
                let bytes = field.bytes().await.map_err(|err| {
                    AppError::BadRequest(format!("failed to read image upload: {err}"))
                })?;
                form.image_ref = Some(state.blobs.store(&filename, &bytes)?);
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|err| AppError::BadRequest(format!("failed to read form field: {err}")))
}

// === Handlers ===

/// POST /register - Register a user and issue a bearer token.
async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Registration>), AppError> {
    let registration = state.directory.register(
        &request.name,
        &request.email,
        request.contact_number,
    )?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// GET /products - List all products, newest first.
async fn list_products(State(state): State<AppState>) -> Json<Vec<ProductSnapshot>> {
    Json(state.ledger.list_all())
}

/// GET /user-products - List the caller's products.
async fn list_user_products(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Vec<ProductSnapshot>>, AppError> {
    let caller = authenticate(&state, &headers)?;
    Ok(Json(state.ledger.list_by_owner(caller)))
}

/// POST /products - Create a product from a multipart form.
async fn create_product(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ProductSnapshot>), AppError> {
    let caller = authenticate(&state, &headers)?;
    let form = read_product_form(&state, multipart).await?;

    let draft = ProductDraft {
        title: form.title.unwrap_or_default(),
        description: form.description.unwrap_or_default(),
        starting_price: form
            .starting_price
            .ok_or_else(|| MarketError::validation("starting_price", "is required"))?,
        image_ref: form.image_ref,
    };
    let snapshot = state.ledger.create(caller, draft)?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /products/{id} - Fetch one product.
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ProductSnapshot>, AppError> {
    Ok(Json(state.ledger.get(ProductId(id))?))
}

/// PUT /products/{id} - Update a product from a multipart form.
async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: axum::http::HeaderMap,
    multipart: Multipart,
) -> Result<Json<ProductSnapshot>, AppError> {
    let caller = authenticate(&state, &headers)?;
    let form = read_product_form(&state, multipart).await?;

    let patch = ProductPatch {
        title: form.title,
        description: form.description,
        starting_price: form.starting_price,
        image_ref: form.image_ref,
    };
    Ok(Json(state.ledger.update(ProductId(id), caller, patch)?))
}

/// DELETE /products/{id} - Delete a product without bids.
async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: axum::http::HeaderMap,
) -> Result<StatusCode, AppError> {
    let caller = authenticate(&state, &headers)?;
    state.ledger.delete(ProductId(id), caller)?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /products/{id}/bid - Place a bid.
async fn place_bid(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: axum::http::HeaderMap,
    Json(request): Json<BidRequest>,
) -> Result<Json<ProductSnapshot>, AppError> {
    let caller = authenticate(&state, &headers)?;
    let snapshot = state.evaluator.place_bid(ProductId(id), caller, request.amount)?;
    Ok(Json(snapshot))
}

/// POST /products/{id}/confirm-payment - Confirm the winning payment.
async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: axum::http::HeaderMap,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<ProductSnapshot>, AppError> {
    let caller = authenticate(&state, &headers)?;
    let snapshot = state
        .confirmer
        .confirm_payment(ProductId(id), caller, &request.payment_reference)
        .await?;
    Ok(Json(snapshot))
}

/// POST /products/{id}/cancel - Cancel a product without bids.
async fn cancel_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: axum::http::HeaderMap,
) -> Result<Json<ProductSnapshot>, AppError> {
    let caller = authenticate(&state, &headers)?;
    Ok(Json(state.ledger.cancel(ProductId(id), caller)?))
}

// === Router ===

/// Builds the full marketplace router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/products", get(list_products).post(create_product))
        .route("/user-products", get(list_user_products))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/products/{id}/bid", put(place_bid))
        .route("/products/{id}/confirm-payment", post(confirm_payment))
        .route("/products/{id}/cancel", post(cancel_product))
        .with_state(state)
}
