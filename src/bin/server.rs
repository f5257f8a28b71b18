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

use bidmarket_rs::http::{AppState, router};
use bidmarket_rs::payment::{AcceptAllProcessor, HttpPaymentProcessor, PaymentProcessor};
use bidmarket_rs::storage::LocalDiskStore;
use bidmarket_rs::{BidEvaluator, MarketConfig, PaymentConfirmer, ProductLedger, UserDirectory};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Bid Market - HTTP server for the bidding marketplace
///
/// Configuration is read from the environment (BIND_ADDR, STORAGE_ROOT,
/// PAYMENT_URL, PAYMENT_TIMEOUT_MS); command line flags override it.
#[derive(Parser, Debug)]
#[command(name = "bidmarket-rs")]
#[command(about = "A bidding marketplace backend", long_about = None)]
struct Args {
    /// Address to bind, e.g. 0.0.0.0:5000
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Directory for uploaded product images
    #[arg(long, value_name = "DIR")]
    storage_root: Option<PathBuf>,

    /// Payment-processor endpoint; omit to accept every payment (development)
    #[arg(long, value_name = "URL")]
    payment_url: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let blobs = match LocalDiskStore::new(config.storage_root.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!(
                "Error preparing storage directory '{}': {}",
                config.storage_root.display(),
                e
            );
            process::exit(1);
        }
    };

    let processor: Arc<dyn PaymentProcessor> = match &config.payment_endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "using HTTP payment processor");
            Arc::new(HttpPaymentProcessor::new(endpoint.clone()))
        }
        None => {
            warn!("no payment endpoint configured, accepting every payment reference");
            Arc::new(AcceptAllProcessor)
        }
    };

    let ledger = Arc::new(ProductLedger::new());
    let state = AppState {
        evaluator: Arc::new(BidEvaluator::new(Arc::clone(&ledger))),
        confirmer: Arc::new(PaymentConfirmer::new(
            Arc::clone(&ledger),
            processor,
            config.payment_timeout,
        )),
        ledger,
        directory: Arc::new(UserDirectory::new()),
        blobs,
    };

    let listener = match TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error binding {}: {}", config.bind_addr, e);
            process::exit(1);
        }
    };

    info!(addr = %config.bind_addr, "listening");

    if let Err(e) = axum::serve(listener, router(state)).await {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}

/// Environment configuration with command line overrides applied on top.
fn load_config(args: &Args) -> Result<MarketConfig, Box<dyn std::error::Error>> {
    let mut config = MarketConfig::from_env()?;
    if let Some(bind) = &args.bind {
        config.bind_addr = bind.parse()?;
    }
    if let Some(root) = &args.storage_root {
        config.storage_root = root.clone();
    }
    if let Some(url) = &args.payment_url {
        config.payment_endpoint = Some(url.clone());
    }
    Ok(config)
}
