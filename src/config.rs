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

//! Process configuration.
//!
//! Built once from the environment at startup and passed by reference into
//! the components that need it; no business logic reads environment
//! variables on its own.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Marketplace process configuration.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Root directory for the local-disk blob store.
    pub storage_root: PathBuf,
    /// Payment-processor endpoint. When unset, the server falls back to the
    /// accept-all development processor.
    pub payment_endpoint: Option<String>,
    /// Upper bound on a single payment-verification call.
    pub payment_timeout: Duration,
}

impl MarketConfig {
    pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
    pub const DEFAULT_STORAGE_ROOT: &str = "uploads";
    pub const DEFAULT_PAYMENT_TIMEOUT_MS: u64 = 5_000;

    /// Reads configuration from `BIND_ADDR`, `STORAGE_ROOT`, `PAYMENT_URL`,
    /// and `PAYMENT_TIMEOUT_MS`, falling back to defaults for anything
    /// unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| Self::DEFAULT_BIND_ADDR.to_string());
        let storage_root = std::env::var("STORAGE_ROOT")
            .unwrap_or_else(|_| Self::DEFAULT_STORAGE_ROOT.to_string());
        let payment_endpoint = std::env::var("PAYMENT_URL").ok();
        let payment_timeout_ms = std::env::var("PAYMENT_TIMEOUT_MS").ok();

        Self::build(
            &bind_addr,
            storage_root,
            payment_endpoint,
            payment_timeout_ms.as_deref(),
        )
    }

    /// Assembles a config from raw values, validating as it goes. Split out
    /// of [`MarketConfig::from_env`] so it can be tested without touching
    /// process-global environment state.
    pub fn build(
        bind_addr: &str,
        storage_root: impl Into<PathBuf>,
        payment_endpoint: Option<String>,
        payment_timeout_ms: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let bind_addr: SocketAddr = bind_addr.parse().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            reason: format!("{bind_addr:?} is not a socket address"),
        })?;

        let payment_timeout = match payment_timeout_ms {
            None => Duration::from_millis(Self::DEFAULT_PAYMENT_TIMEOUT_MS),
            Some(raw) => {
                let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    name: "PAYMENT_TIMEOUT_MS",
                    reason: format!("{raw:?} is not a number of milliseconds"),
                })?;
                if ms == 0 {
                    return Err(ConfigError::Invalid {
                        name: "PAYMENT_TIMEOUT_MS",
                        reason: "must be greater than zero".to_string(),
                    });
                }
                Duration::from_millis(ms)
            }
        };

        Ok(Self {
            bind_addr,
            storage_root: storage_root.into(),
            payment_endpoint,
            payment_timeout,
        })
    }
}
