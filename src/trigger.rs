//! Defines the endpoint the external scheduler calls to run a batch.
//!
//! The scheduler fires on a fixed interval with at-least-once semantics;
//! the endpoint tolerates being called more often than necessary because
//! the batch it triggers is idempotent per occurrence.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde_json::json;
use sha2::{Digest, Sha512};
use time::OffsetDateTime;

use crate::{AppState, Error, batch::run_due};

/// The header carrying the scheduler's shared secret.
pub(crate) const API_KEY_HEADER: &str = "x-api-key";

/// The state needed to run a recurring batch.
#[derive(Debug, Clone)]
pub struct TriggerState {
    /// The database connection for the batch run.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The shared secret the caller must present.
    pub api_secret: String,
}

impl FromRef<AppState> for TriggerState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            api_secret: state.api_secret.clone(),
        }
    }
}

/// A route handler that processes every due recurring template and returns
/// the batch summary as JSON.
///
/// The caller must present the shared secret in the `X-Api-Key` header;
/// calls without it are rejected with 401 and run nothing.
pub async fn run_recurring_endpoint(
    State(state): State<TriggerState>,
    headers: HeaderMap,
) -> Response {
    let presented_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if !secrets_match(presented_key, &state.api_secret) {
        tracing::warn!("rejected recurring batch trigger with missing or invalid API key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing or invalid API key" })),
        )
            .into_response();
    }

    // The processing clock: templates due on or before today, UTC.
    let today = OffsetDateTime::now_utc().date();

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match run_due(today, &connection) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => {
            tracing::error!("recurring batch run failed to start: {error}");
            error.into_response()
        }
    }
}

/// Compare the presented secret against the expected one.
///
/// Both sides are hashed first so the byte comparison runs over fixed-length
/// digests, not over the secrets themselves.
fn secrets_match(presented: Option<&str>, expected: &str) -> bool {
    let Some(presented) = presented else {
        return false;
    };

    Sha512::digest(presented) == Sha512::digest(expected)
}
