//! Terraform HTTP Backend Binary
//!
//! Serves Terraform remote state over HTTP from a local directory.
//!
//! # Usage
//!
//! ```bash
//! # Listen on :3001 and store states in /var/lib/terraform
//! tf_http_backend
//!
//! # Custom storage directory and address, debug logging
//! tf_http_backend --path ./states --address 127.0.0.1:8080 --debug
//! ```
//!
//! Point Terraform at it with:
//!
//! ```hcl
//! terraform {
//!   backend "http" {
//!     address        = "http://localhost:3001/my-state"
//!     lock_address   = "http://localhost:3001/my-state"
//!     unlock_address = "http://localhost:3001/my-state"
//!   }
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `TF_HTTP_ADDR`, `TF_HTTP_PATH`, `TF_HTTP_DEBUG`, `TF_HTTP_LOG_FORMAT`,
//!   `TF_HTTP_MAX_BODY_BYTES`, `TF_HTTP_REQUEST_TIMEOUT_SECS` - defaults for the matching flags
//! - `RUST_LOG` - Control logging verbosity (e.g., `RUST_LOG=info` or `RUST_LOG=debug`)

use clap::Parser;
use state_server::{init_logging, CliArgs, StateServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(&args.logging_config());

    tracing::info!("starting Terraform HTTP backend...");

    let config = args.server_config();
    tracing::debug!("storage path: {:?}", config.storage_root);
    tracing::debug!("bind address: {}", config.address);

    let server = StateServer::new(config)?;
    server.run().await?;

    Ok(())
}
