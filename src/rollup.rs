//! The aggregate updater: incremental daily/monthly/yearly rollups of the
//! ledger.
//!
//! Analytics pages read these precomputed buckets instead of scanning the
//! full ledger. The rollups are written in lockstep with ledger writes: the
//! processor calls [apply_delta] exactly once per emitted entry and never
//! for a duplicate emission, which keeps the bucket sums equal to the ledger
//! sums for every period.

use rusqlite::{Connection, Row, named_params};
use time::Date;

use crate::{Error, database_id::UserId, template::TransactionKind};

/// The summed income and expense of one rollup bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollupTotals {
    /// The summed amount of income ledger entries in the bucket's period.
    pub income: f64,
    /// The summed amount of expense ledger entries in the bucket's period.
    pub expense: f64,
}

/// Add `amount` of `kind` to the daily, monthly and yearly buckets covering
/// `date` for `user_id`, creating any bucket row that does not exist yet.
///
/// Must be called exactly once per successful ledger emission, inside the
/// same SQL transaction as the insert.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn apply_delta(
    user_id: UserId,
    date: Date,
    kind: TransactionKind,
    amount: f64,
    connection: &Connection,
) -> Result<(), Error> {
    let (income, expense) = match kind {
        TransactionKind::Income => (amount, 0.0),
        TransactionKind::Expense => (0.0, amount),
    };
    let year = date.year();
    let month = date.month() as u8;
    let day = date.day();

    connection.execute(
        "INSERT INTO daily_rollup (user_id, year, month, day, income, expense)
         VALUES (:user_id, :year, :month, :day, :income, :expense)
         ON CONFLICT(user_id, year, month, day) DO UPDATE SET
             income = income + excluded.income,
             expense = expense + excluded.expense",
        named_params! {
            ":user_id": user_id,
            ":year": year,
            ":month": month,
            ":day": day,
            ":income": income,
            ":expense": expense,
        },
    )?;

    connection.execute(
        "INSERT INTO monthly_rollup (user_id, year, month, income, expense)
         VALUES (:user_id, :year, :month, :income, :expense)
         ON CONFLICT(user_id, year, month) DO UPDATE SET
             income = income + excluded.income,
             expense = expense + excluded.expense",
        named_params! {
            ":user_id": user_id,
            ":year": year,
            ":month": month,
            ":income": income,
            ":expense": expense,
        },
    )?;

    connection.execute(
        "INSERT INTO yearly_rollup (user_id, year, income, expense)
         VALUES (:user_id, :year, :income, :expense)
         ON CONFLICT(user_id, year) DO UPDATE SET
             income = income + excluded.income,
             expense = expense + excluded.expense",
        named_params! {
            ":user_id": user_id,
            ":year": year,
            ":income": income,
            ":expense": expense,
        },
    )?;

    Ok(())
}

/// Get the rollup totals for one calendar day.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if no ledger entry has ever landed on that day,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_daily_rollup(
    user_id: UserId,
    date: Date,
    connection: &Connection,
) -> Result<RollupTotals, Error> {
    connection
        .prepare(
            "SELECT income, expense FROM daily_rollup
             WHERE user_id = :user_id AND year = :year AND month = :month
                 AND day = :day",
        )?
        .query_one(
            named_params! {
                ":user_id": user_id,
                ":year": date.year(),
                ":month": date.month() as u8,
                ":day": date.day(),
            },
            map_totals_row,
        )
        .map_err(|error| error.into())
}

/// Get the rollup totals for one calendar month.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if no ledger entry has ever landed in that month,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_monthly_rollup(
    user_id: UserId,
    year: i32,
    month: u8,
    connection: &Connection,
) -> Result<RollupTotals, Error> {
    connection
        .prepare(
            "SELECT income, expense FROM monthly_rollup
             WHERE user_id = :user_id AND year = :year AND month = :month",
        )?
        .query_one(
            named_params! {":user_id": user_id, ":year": year, ":month": month},
            map_totals_row,
        )
        .map_err(|error| error.into())
}

/// Get the rollup totals for one calendar year.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if no ledger entry has ever landed in that year,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_yearly_rollup(
    user_id: UserId,
    year: i32,
    connection: &Connection,
) -> Result<RollupTotals, Error> {
    connection
        .prepare(
            "SELECT income, expense FROM yearly_rollup
             WHERE user_id = :user_id AND year = :year",
        )?
        .query_one(
            named_params! {":user_id": user_id, ":year": year},
            map_totals_row,
        )
        .map_err(|error| error.into())
}

/// Create the three rollup bucket tables in the database.
///
/// # Errors
/// Returns an error if the tables cannot be created or if there is an SQL
/// error.
pub fn create_rollup_tables(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS daily_rollup (
                user_id INTEGER NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                day INTEGER NOT NULL,
                income REAL NOT NULL DEFAULT 0,
                expense REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, year, month, day)
                )",
        (),
    )?;

    connection.execute(
        "CREATE TABLE IF NOT EXISTS monthly_rollup (
                user_id INTEGER NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                income REAL NOT NULL DEFAULT 0,
                expense REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, year, month)
                )",
        (),
    )?;

    connection.execute(
        "CREATE TABLE IF NOT EXISTS yearly_rollup (
                user_id INTEGER NOT NULL,
                year INTEGER NOT NULL,
                income REAL NOT NULL DEFAULT 0,
                expense REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, year)
                )",
        (),
    )?;

    Ok(())
}

/// Map a database row to [RollupTotals].
fn map_totals_row(row: &Row) -> Result<RollupTotals, rusqlite::Error> {
    Ok(RollupTotals {
        income: row.get(0)?,
        expense: row.get(1)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
