//! Implements a struct that holds the state of the engine's HTTP server.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{Error, db::initialize};

/// The state of the engine's HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The shared secret the external scheduler must present to trigger a
    /// batch run.
    pub api_secret: String,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for
    /// the engine's models. `api_secret` is compared against the trigger
    /// endpoint's `X-Api-Key` header; it is read once at start-up and passed
    /// in here rather than looked up from the environment mid-request.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(db_connection: Connection, api_secret: &str) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            api_secret: api_secret.to_owned(),
            db_connection: Arc::new(Mutex::new(db_connection)),
        })
    }
}
