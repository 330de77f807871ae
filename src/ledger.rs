//! The ledger writer: materializes one occurrence of a recurring template as
//! a concrete ledger entry.
//!
//! Idempotency is enforced by the database, not by a read-then-write check:
//! a persisted unique index over `(template_id, date)` means a retried batch
//! run can never create a second entry for the same occurrence, no matter
//! how the previous run died.

use rusqlite::{Connection, Row};
use time::Date;

use crate::{
    Error,
    database_id::{LedgerEntryId, TemplateId, UserId},
    template::{RecurringTemplate, TransactionKind},
};

// ============================================================================
// MODELS
// ============================================================================

/// An expense or income recorded in the ledger.
///
/// Entries emitted from a recurring template carry the template's ID as a
/// back-reference, marking them as machine-generated; the gamification
/// engine polls the ledger for such entries.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    /// The ID of the ledger entry.
    pub id: LedgerEntryId,
    /// The ID of the user who owns the entry.
    pub user_id: UserId,
    /// The amount of money spent or earned. Positive; the direction comes
    /// from `kind`.
    pub amount: f64,
    /// Whether this entry is income or an expense.
    pub kind: TransactionKind,
    /// The display name of the entry's category, denormalized.
    pub category_name: String,
    /// The icon of the entry's category, denormalized.
    pub category_icon: String,
    /// The date the transaction happened.
    pub date: Date,
    /// A text description of what the transaction was for.
    pub description: String,
    /// The template this entry was emitted from, if it was machine-generated.
    pub template_id: Option<TemplateId>,
}

/// What happened when the ledger writer tried to emit an occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum EmitOutcome {
    /// A new ledger entry was written.
    Created(LedgerEntry),
    /// An entry for this (template, date) pair already existed, e.g. from a
    /// batch run that died after emitting but before advancing the due
    /// date. Treated as success; nothing was written.
    AlreadyEmitted,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Emit one occurrence of `template` into the ledger, dated
/// `occurrence_date`.
///
/// The amount, kind, category and description are copied from the template.
/// If an entry for this (template, date) pair already exists the unique
/// index rejects the insert and this returns [EmitOutcome::AlreadyEmitted]
/// instead of an error.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error
/// other than the uniqueness rejection.
pub fn emit_occurrence(
    template: &RecurringTemplate,
    occurrence_date: Date,
    connection: &Connection,
) -> Result<EmitOutcome, Error> {
    let result = connection
        .prepare(
            "INSERT INTO ledger_entry
                (user_id, amount, kind, category_name, category_icon, date,
                 description, template_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING id, user_id, amount, kind, category_name,
                 category_icon, date, description, template_id",
        )?
        .query_row(
            (
                template.user_id,
                template.amount,
                template.kind.as_code(),
                &template.category_name,
                &template.category_icon,
                occurrence_date,
                &template.description,
                template.id,
            ),
            map_ledger_entry_row,
        );

    match result {
        Ok(row) => {
            let entry = row.decode()?;
            tracing::info!(
                template_id = template.id,
                date = %occurrence_date,
                amount = template.amount,
                "emitted ledger entry from recurring template"
            );
            Ok(EmitOutcome::Created(entry))
        }
        Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: _,
                extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
            },
            _,
        )) => Ok(EmitOutcome::AlreadyEmitted),
        Err(error) => Err(error.into()),
    }
}

/// Count the ledger entries emitted for `template_id` on `date`.
///
/// The unique index keeps this at zero or one.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn count_occurrences(
    template_id: TemplateId,
    date: Date,
    connection: &Connection,
) -> Result<u32, Error> {
    connection
        .query_row(
            "SELECT COUNT(id) FROM ledger_entry
             WHERE template_id = :template_id AND date = :date",
            rusqlite::named_params! {":template_id": template_id, ":date": date},
            |row| row.get(0),
        )
        .map_err(|error| error.into())
}

/// Sum the ledger amounts of `kind` for `user_id` in the given month.
///
/// Used by the rollup-consistency checks; analytics endpoints read the
/// rollup tables instead of calling this.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn sum_month(
    user_id: UserId,
    year: i32,
    month: u8,
    kind: TransactionKind,
    connection: &Connection,
) -> Result<f64, Error> {
    connection
        .query_row(
            "SELECT COALESCE(SUM(amount), 0.0) FROM ledger_entry
             WHERE user_id = :user_id AND kind = :kind
                 AND CAST(strftime('%Y', date) AS INTEGER) = :year
                 AND CAST(strftime('%m', date) AS INTEGER) = :month",
            rusqlite::named_params! {
                ":user_id": user_id,
                ":kind": kind.as_code(),
                ":year": year,
                ":month": month,
            },
            |row| row.get(0),
        )
        .map_err(|error| error.into())
}

/// Create the ledger entry table and its occurrence-uniqueness index.
///
/// The unique index is partial: manually created entries have no template ID
/// and never collide with each other.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL
/// error.
pub fn create_ledger_entry_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS ledger_entry (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount REAL NOT NULL,
                kind TEXT NOT NULL,
                category_name TEXT NOT NULL,
                category_icon TEXT NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                template_id INTEGER
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('ledger_entry', 0)",
        (),
    )?;

    // One ledger entry per (template, occurrence date).
    connection.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_entry_occurrence
             ON ledger_entry(template_id, date)
             WHERE template_id IS NOT NULL;",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_entry_user_date
             ON ledger_entry(user_id, date);",
        (),
    )?;

    Ok(())
}

/// The raw column values of a ledger entry row, before the kind column is
/// decoded.
struct LedgerEntryRow {
    id: LedgerEntryId,
    user_id: UserId,
    amount: f64,
    kind: String,
    category_name: String,
    category_icon: String,
    date: Date,
    description: String,
    template_id: Option<TemplateId>,
}

impl LedgerEntryRow {
    fn decode(self) -> Result<LedgerEntry, Error> {
        Ok(LedgerEntry {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            kind: TransactionKind::from_code(&self.kind)?,
            category_name: self.category_name,
            category_icon: self.category_icon,
            date: self.date,
            description: self.description,
            template_id: self.template_id,
        })
    }
}

/// Map a database row to a [LedgerEntryRow].
fn map_ledger_entry_row(row: &Row) -> Result<LedgerEntryRow, rusqlite::Error> {
    Ok(LedgerEntryRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        kind: row.get(3)?,
        category_name: row.get(4)?,
        category_icon: row.get(5)?,
        date: row.get(6)?,
        description: row.get(7)?,
        template_id: row.get(8)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        db::initialize,
        ledger::{EmitOutcome, count_occurrences, emit_occurrence, sum_month},
        schedule::{Frequency, RecurrenceRule},
        template::{RecurringTemplate, TransactionKind, create_template},
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn create_rent_template(conn: &Connection) -> RecurringTemplate {
        create_template(
            RecurringTemplate::build(
                7,
                1200.0,
                TransactionKind::Expense,
                RecurrenceRule::new(Frequency::Month, 1),
                date!(2024 - 01 - 31),
            )
            .description("Rent")
            .category("Housing", "🏠"),
            conn,
        )
        .expect("Could not create template")
    }

    #[test]
    fn emit_copies_template_fields() {
        let conn = get_test_connection();
        let template = create_rent_template(&conn);

        let outcome = emit_occurrence(&template, date!(2024 - 01 - 31), &conn)
            .expect("Could not emit occurrence");

        let EmitOutcome::Created(entry) = outcome else {
            panic!("want Created, got {outcome:?}");
        };
        assert_eq!(entry.user_id, template.user_id);
        assert_eq!(entry.amount, 1200.0);
        assert_eq!(entry.kind, TransactionKind::Expense);
        assert_eq!(entry.category_name, "Housing");
        assert_eq!(entry.date, date!(2024 - 01 - 31));
        assert_eq!(entry.description, "Rent");
        assert_eq!(entry.template_id, Some(template.id));
    }

    #[test]
    fn emit_is_idempotent_per_occurrence() {
        let conn = get_test_connection();
        let template = create_rent_template(&conn);
        let occurrence = date!(2024 - 01 - 31);

        let first = emit_occurrence(&template, occurrence, &conn).unwrap();
        let second = emit_occurrence(&template, occurrence, &conn).unwrap();

        assert!(matches!(first, EmitOutcome::Created(_)));
        assert_eq!(second, EmitOutcome::AlreadyEmitted);
        assert_eq!(count_occurrences(template.id, occurrence, &conn), Ok(1));
    }

    #[test]
    fn emit_allows_distinct_occurrence_dates() {
        let conn = get_test_connection();
        let template = create_rent_template(&conn);

        let january = emit_occurrence(&template, date!(2024 - 01 - 31), &conn).unwrap();
        let february = emit_occurrence(&template, date!(2024 - 02 - 29), &conn).unwrap();

        assert!(matches!(january, EmitOutcome::Created(_)));
        assert!(matches!(february, EmitOutcome::Created(_)));
    }

    #[test]
    fn manual_entries_do_not_collide() {
        let conn = get_test_connection();

        // Two user-created entries on the same date: no template_id, so the
        // partial unique index must not apply.
        for _ in 0..2 {
            conn.execute(
                "INSERT INTO ledger_entry
                    (user_id, amount, kind, category_name, category_icon,
                     date, description, template_id)
                 VALUES (1, 5.0, 'expense', 'Other', '', '2024-03-01',
                     'coffee', NULL)",
                (),
            )
            .expect("manual inserts on the same date should both succeed");
        }
    }

    #[test]
    fn sum_month_filters_by_user_kind_and_period() {
        let conn = get_test_connection();
        let template = create_rent_template(&conn);

        emit_occurrence(&template, date!(2024 - 01 - 31), &conn).unwrap();
        emit_occurrence(&template, date!(2024 - 02 - 29), &conn).unwrap();

        assert_eq!(
            sum_month(7, 2024, 1, TransactionKind::Expense, &conn),
            Ok(1200.0)
        );
        assert_eq!(
            sum_month(7, 2024, 1, TransactionKind::Income, &conn),
            Ok(0.0)
        );
        assert_eq!(
            sum_month(8, 2024, 1, TransactionKind::Expense, &conn),
            Ok(0.0)
        );
    }
}
