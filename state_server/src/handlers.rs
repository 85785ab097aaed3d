//! HTTP Request Handlers for the State Backend
//!
//! Each request is turned into one store call on tokio's blocking pool, and the outcome is
//! turned into exactly one status code. Store errors are mapped in `error_to_response`;
//! internal failures are logged with the operation and the state name, and the client only
//! ever sees a generic message.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use state_store::{StateStatus, StateStore, StoreError};
use tracing::{debug, error, warn};

/// Server state passed to all handlers.
#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<StateStore>,
}

/// Body of `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    pub status: String,
    pub states: Vec<StateStatus>,
}

/// The fixed set of operations accepted on `/{name}`, keyed by request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    CreateOrReplace,
    Delete,
    Lock,
    Unlock,
}

impl Operation {
    /// Returns `None` for any method outside the table; there is no fallback.
    pub fn from_method(method: &Method) -> Option<Self> {
        match method.as_str() {
            "GET" => Some(Operation::Get),
            "POST" => Some(Operation::CreateOrReplace),
            "DELETE" => Some(Operation::Delete),
            "LOCK" => Some(Operation::Lock),
            "UNLOCK" => Some(Operation::Unlock),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::CreateOrReplace => "create_or_replace",
            Operation::Delete => "delete",
            Operation::Lock => "lock",
            Operation::Unlock => "unlock",
        }
    }
}

/// Runs a store call on the blocking pool.
async fn run_blocking<T, F>(state: &ServerState, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&StateStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(StoreError::internal)?
}

/// Maps store errors to status codes. Only the plain status text reaches the client.
fn error_to_response(op: &str, name: &str, e: StoreError) -> Response {
    let (status, message) = match &e {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
        StoreError::AlreadyLocked(_) => {
            warn!(op, name = %name, "state is locked");
            (StatusCode::LOCKED, "Locked")
        },
        StoreError::NotLocked(_) => {
            warn!(op, name = %name, "state not locked");
            (StatusCode::CONFLICT, "Conflict")
        },
        StoreError::InvalidName(_) => {
            warn!(op, name = %name, "invalid state name");
            (StatusCode::BAD_REQUEST, "Bad Request: invalid name")
        },
        _ => {
            error!(op, name = %name, error = %e, "state operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        },
    };
    (status, message).into_response()
}

/// GET /
///
/// Lists every state in storage with its lock flag.
pub async fn list_states(State(state): State<ServerState>) -> Response {
    match run_blocking(&state, |store| store.list()).await {
        Ok(roster) => Json(ListResponse {
            status: "ok".to_string(),
            states: roster.states,
        })
        .into_response(),
        Err(e) => error_to_response("list", "", e),
    }
}

/// Any method other than GET on /.
pub async fn method_not_allowed(method: Method) -> Response {
    warn!(method = %method, "unknown method");
    (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response()
}

/// Any method on /{name}.
///
/// Dispatches on the request method through [`Operation`]; methods outside the table get 405.
pub async fn handle_state(
    State(state): State<ServerState>,
    method: Method,
    Path(name): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Bad Request: missing name").into_response();
    }

    debug!(method = %method, name = %name, "request");

    let Some(op) = Operation::from_method(&method) else {
        warn!(method = %method, name = %name, "unknown method");
        return (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response();
    };

    match op {
        Operation::Get => get_state(state, name).await,
        Operation::CreateOrReplace => match body {
            Ok(body) => post_state(state, name, body).await,
            Err(rejection) => reject_body(state, name, rejection).await,
        },
        Operation::Delete => delete_state(state, name).await,
        Operation::Lock => lock_state(state, name).await,
        Operation::Unlock => unlock_state(state, name).await,
    }
}

async fn get_state(state: ServerState, name: String) -> Response {
    let key = name.clone();
    match run_blocking(&state, move |store| store.read(&key)).await {
        Ok(data) => ([(CONTENT_TYPE, "application/json")], data).into_response(),
        Err(e) => error_to_response(Operation::Get.as_str(), &name, e),
    }
}

async fn post_state(state: ServerState, name: String, body: Bytes) -> Response {
    let key = name.clone();
    match run_blocking(&state, move |store| store.write(&key, &body)).await {
        Ok(true) => StatusCode::CREATED.into_response(),
        Ok(false) => StatusCode::OK.into_response(),
        Err(e) => error_to_response(Operation::CreateOrReplace.as_str(), &name, e),
    }
}

/// Answers a POST whose body could not be read. The lock is checked first, so a locked
/// state reports 423 regardless of what was uploaded.
async fn reject_body(state: ServerState, name: String, rejection: BytesRejection) -> Response {
    let op = Operation::CreateOrReplace.as_str();
    let key = name.clone();
    match run_blocking(&state, move |store| store.is_locked(&key)).await {
        Ok(true) => return error_to_response(op, &name, StoreError::AlreadyLocked(name.clone())),
        Ok(false) => {},
        Err(e) => return error_to_response(op, &name, e),
    }

    warn!(name = %name, error = %rejection, "failed to read request body");
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response()
    } else {
        (StatusCode::BAD_REQUEST, "Bad Request").into_response()
    }
}

async fn delete_state(state: ServerState, name: String) -> Response {
    let key = name.clone();
    match run_blocking(&state, move |store| store.delete(&key)).await {
        Ok(removed) => {
            if !removed {
                debug!(name = %name, "delete of absent state");
            }
            StatusCode::OK.into_response()
        },
        Err(e) => error_to_response(Operation::Delete.as_str(), &name, e),
    }
}

async fn lock_state(state: ServerState, name: String) -> Response {
    let key = name.clone();
    match run_blocking(&state, move |store| store.lock(&key)).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_to_response(Operation::Lock.as_str(), &name, e),
    }
}

async fn unlock_state(state: ServerState, name: String) -> Response {
    let key = name.clone();
    match run_blocking(&state, move |store| store.unlock(&key)).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_to_response(Operation::Unlock.as_str(), &name, e),
    }
}
