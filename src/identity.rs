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

//! Identity collaborator.
//!
//! The core trusts an [`IdentityProvider`] to turn request credentials into
//! an authenticated [`UserId`]; every `caller_id`/`bidder_id` check builds
//! on that identity. The bundled [`UserDirectory`] keeps users in memory and
//! issues opaque bearer tokens at registration; the authentication protocol
//! itself (password handling, token rotation) is deliberately out of scope.

use crate::base::UserId;
use crate::error::MarketError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Resolves request credentials to an authenticated user.
pub trait IdentityProvider: Send + Sync {
    /// Returns the user behind `token`, or [`MarketError::Unauthorized`].
    fn authenticate(&self, token: &str) -> Result<UserId, MarketError>;
}

/// A registered user. Email is unique case-insensitively.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub contact_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful registration.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub user_id: UserId,
    pub token: String,
}

/// In-memory user directory issuing opaque bearer tokens.
#[derive(Default)]
pub struct UserDirectory {
    users: DashMap<UserId, User>,
    /// Lowercased email -> owner, for O(1) uniqueness checks.
    emails: DashMap<String, UserId>,
    tokens: DashMap<String, UserId>,
    next_id: AtomicU64,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            tokens: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a user and returns their id plus a bearer token.
    ///
    /// # Errors
    ///
    /// [`MarketError::Validation`] when the name is blank, the email is
    /// malformed, or the email is already registered (compared
    /// case-insensitively).
    pub fn register(
        &self,
        name: &str,
        email: &str,
        contact_number: Option<String>,
    ) -> Result<Registration, MarketError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MarketError::validation("name", "must not be empty"));
        }
        let email = normalize_email(email)?;

        // Entry API for an atomic check-and-claim of the email; the id is
        // only allocated once the claim succeeds, so rejected duplicates
        // consume nothing.
        let id = match self.emails.entry(email.clone()) {
            Entry::Occupied(_) => {
                return Err(MarketError::validation("email", "already registered"));
            }
            Entry::Vacant(entry) => {
                let id = UserId(self.next_id.fetch_add(1, Ordering::Relaxed));
                entry.insert(id);
                id
            }
        };

        let now = Utc::now();
        let token = mint_token(id, &email, now);
        self.users.insert(
            id,
            User {
                id,
                name: name.to_string(),
                email,
                contact_number,
                created_at: now,
            },
        );
        self.tokens.insert(token.clone(), id);

        info!(user_id = %id, "user registered");
        Ok(Registration { user_id: id, token })
    }

    pub fn get(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl IdentityProvider for UserDirectory {
    fn authenticate(&self, token: &str) -> Result<UserId, MarketError> {
        self.tokens
            .get(token)
            .map(|entry| *entry.value())
            .ok_or(MarketError::Unauthorized)
    }
}

fn normalize_email(raw: &str) -> Result<String, MarketError> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(MarketError::validation("email", "must be a valid address"));
    }
    Ok(email)
}

/// Opaque bearer token. Unguessable enough for an in-memory directory; a
/// real deployment would delegate token issuance entirely.
fn mint_token(id: UserId, email: &str, now: DateTime<Utc>) -> String {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    email.hash(&mut hasher);
    now.timestamp_nanos_opt().hash(&mut hasher);
    format!("bmk_{}_{:016x}", id.0, hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_authenticate() {
        let directory = UserDirectory::new();
        let registration = directory
            .register("Ada", "ada@example.com", None)
            .unwrap();

        let authenticated = directory.authenticate(&registration.token).unwrap();
        assert_eq!(authenticated, registration.user_id);
    }

    #[test]
    fn unknown_token_is_unauthorized() {
        let directory = UserDirectory::new();
        assert_eq!(
            directory.authenticate("bmk_bogus"),
            Err(MarketError::Unauthorized)
        );
    }

    #[test]
    fn email_uniqueness_is_case_insensitive() {
        let directory = UserDirectory::new();
        directory
            .register("Ada", "Ada@Example.com", None)
            .unwrap();

        let result = directory.register("Imposter", "ada@example.com", None);
        assert!(matches!(
            result,
            Err(MarketError::Validation { field: "email", .. })
        ));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn rejected_duplicate_does_not_consume_an_id() {
        let directory = UserDirectory::new();
        let first = directory.register("Ada", "ada@example.com", None).unwrap();

        directory
            .register("Imposter", "ada@example.com", None)
            .unwrap_err();

        let second = directory.register("Ben", "ben@example.com", None).unwrap();
        assert_eq!(second.user_id.0, first.user_id.0 + 1);
    }

    #[test]
    fn email_is_stored_normalized() {
        let directory = UserDirectory::new();
        let registration = directory
            .register("Ada", "  Ada@Example.COM ", Some("555-0100".to_string()))
            .unwrap();

        let user = directory.get(registration.user_id).unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.contact_number.as_deref(), Some("555-0100"));
    }

    #[test]
    fn malformed_email_is_rejected() {
        let directory = UserDirectory::new();
        for bad in ["", "no-at-sign", "@example.com", "ada@nodot"] {
            let result = directory.register("Ada", bad, None);
            assert!(
                matches!(result, Err(MarketError::Validation { field: "email", .. })),
                "expected rejection for {bad:?}"
            );
        }
    }
}
