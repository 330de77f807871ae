//! Autoledger is the recurring-transaction engine for a personal finance
//! ledger: it turns recurring templates ("rent, monthly, $1200") into
//! concrete ledger entries, keeps daily/monthly/yearly rollups in lockstep
//! with the ledger, and exposes a single authenticated HTTP endpoint that an
//! external scheduler calls to process everything that has come due.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod batch;
mod database_id;
mod db;
mod endpoints;
mod ledger;
mod logging;
mod processor;
mod rollup;
mod routing;
mod schedule;
mod template;
mod trigger;

pub use app_state::AppState;
pub use batch::{BatchItemError, BatchSummary, run_due};
pub use db::initialize as initialize_db;
pub use logging::logging_middleware;
pub use processor::{ProcessingOutcome, process_template};
pub use routing::build_router;
pub use schedule::{Frequency, RecurrenceRule, next_occurrence};

/// An async task that waits for either the ctrl+c or terminate signal,
/// whichever comes first, and then signals the server to shut down
/// gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the engine.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows, e.g.
    /// a recurring template was deleted between selection and processing.
    #[error("the requested resource could not be found")]
    NotFound,

    /// A recurring template row holds a frequency code that does not decode
    /// to a supported frequency.
    ///
    /// The affected template will keep failing on every batch run until it
    /// is corrected, but it cannot affect other templates.
    #[error("{0:?} is not a valid frequency")]
    InvalidFrequency(String),

    /// A stored transaction kind was neither "income" nor "expense".
    #[error("{0:?} is not a valid transaction kind")]
    InvalidKind(String),

    /// A recurring template row holds a recurrence interval below one.
    #[error("{0} is not a valid recurrence interval, intervals start at 1")]
    InvalidInterval(i64),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    ///
    /// This covers the transient store failures (connection trouble,
    /// timeouts): the affected template stays due and is retried on the
    /// next scheduled batch run.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // The error text is for the scheduler's logs, not end users.
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
