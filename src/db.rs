//! Database initialization for the engine's tables.

use rusqlite::{Connection, Transaction as SqlTransaction};

use crate::{
    Error, ledger::create_ledger_entry_table, rollup::create_rollup_tables,
    template::create_recurring_template_table,
};

/// Add the tables for the engine's models to the database.
///
/// Runs inside one exclusive SQL transaction so a half-initialized schema is
/// never left behind.
///
/// # Errors
/// Returns an [Error::SqlError] if any table cannot be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_recurring_template_table(&transaction)?;
    create_ledger_entry_table(&transaction)?;
    create_rollup_tables(&transaction)?;

    transaction.commit()?;

    Ok(())
}
