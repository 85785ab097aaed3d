#![cfg_attr(feature = "strict", deny(warnings))]

//! HTTP remote state backend.
//!
//! Exposes a [`StateStore`](state_store::StateStore) over HTTP: `GET /` lists every state with
//! its lock flag, and `/{name}` accepts `GET`, `POST`, `DELETE`, `LOCK` and `UNLOCK`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
mod server;
mod test_server;

pub use config::{CliArgs, ServerConfig};
pub use error::{Result, ServerError};
pub use handlers::{ListResponse, Operation};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use server::StateServer;
pub use test_server::TestServer;
