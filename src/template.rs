//! Defines the core data models and database queries for recurring
//! transaction templates.
//!
//! A template describes a transaction that repeats on a schedule ("rent,
//! monthly, $1200"). Templates are created and deleted by user actions
//! through the CRUD endpoints; their `next_due_date` is advanced only by the
//! recurrence processor.

use rusqlite::{Connection, Row};
use time::Date;

use crate::{
    Error,
    database_id::{TemplateId, UserId},
    schedule::RecurrenceRule,
};

// ============================================================================
// MODELS
// ============================================================================

/// Whether money flows in or out when a transaction happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionKind {
    /// Money coming in, e.g. wages.
    Income,
    /// Money going out, e.g. rent.
    Expense,
}

impl TransactionKind {
    /// The text stored in the `kind` column for this kind.
    pub fn as_code(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }

    /// Decode the text stored in the `kind` column.
    ///
    /// # Errors
    /// Returns [Error::InvalidKind] if `code` is neither "income" nor
    /// "expense".
    pub fn from_code(code: &str) -> Result<Self, Error> {
        match code {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            _ => Err(Error::InvalidKind(code.to_owned())),
        }
    }
}

/// A user-defined rule describing a transaction that recurs on a schedule.
///
/// To create a new `RecurringTemplate`, use [RecurringTemplate::build].
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringTemplate {
    /// The ID of the template.
    pub id: TemplateId,
    /// The ID of the user who owns the template.
    pub user_id: UserId,
    /// The amount of money involved each time the template fires. Positive.
    pub amount: f64,
    /// A text description copied onto every emitted ledger entry.
    pub description: String,
    /// The display name of the template's category, denormalized.
    pub category_name: String,
    /// The icon of the template's category, denormalized.
    pub category_icon: String,
    /// Whether the template emits income or expenses.
    pub kind: TransactionKind,
    /// How often the template fires.
    pub rule: RecurrenceRule,
    /// The date the next occurrence falls due. Never regresses.
    pub next_due_date: Date,
    /// The date after which no more occurrences are emitted, if any.
    pub end_date: Option<Date>,
}

impl RecurringTemplate {
    /// Create a new recurring template.
    ///
    /// Shortcut for [RecurringTemplateBuilder] for discoverability.
    pub fn build(
        user_id: UserId,
        amount: f64,
        kind: TransactionKind,
        rule: RecurrenceRule,
        next_due_date: Date,
    ) -> RecurringTemplateBuilder {
        RecurringTemplateBuilder {
            user_id,
            amount,
            description: String::new(),
            category_name: "Other".to_owned(),
            category_icon: String::new(),
            kind,
            rule,
            next_due_date,
            end_date: None,
        }
    }
}

/// A builder for creating [RecurringTemplate] instances.
///
/// Provides sensible defaults for the optional presentation fields; pass the
/// finished builder to [create_template] to insert it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringTemplateBuilder {
    /// The ID of the user who owns the template.
    pub user_id: UserId,
    /// The amount of money involved each time the template fires.
    pub amount: f64,
    /// A text description copied onto every emitted ledger entry.
    pub description: String,
    /// The display name of the template's category.
    pub category_name: String,
    /// The icon of the template's category.
    pub category_icon: String,
    /// Whether the template emits income or expenses.
    pub kind: TransactionKind,
    /// How often the template fires.
    pub rule: RecurrenceRule,
    /// The date the first occurrence falls due.
    pub next_due_date: Date,
    /// The date after which no more occurrences are emitted.
    pub end_date: Option<Date>,
}

impl RecurringTemplateBuilder {
    /// Set the description copied onto emitted ledger entries.
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    /// Set the denormalized category name and icon.
    pub fn category(mut self, name: &str, icon: &str) -> Self {
        self.category_name = name.to_owned();
        self.category_icon = icon.to_owned();
        self
    }

    /// Set the date after which the template stops emitting occurrences.
    pub fn end_date(mut self, end_date: Option<Date>) -> Self {
        self.end_date = end_date;
        self
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create a new recurring template in the database from a builder.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn create_template(
    builder: RecurringTemplateBuilder,
    connection: &Connection,
) -> Result<RecurringTemplate, Error> {
    let row = connection
        .prepare(
            "INSERT INTO recurring_template
                (user_id, amount, description, category_name, category_icon,
                 kind, frequency, interval, next_due_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             RETURNING id, user_id, amount, description, category_name,
                 category_icon, kind, frequency, interval, next_due_date,
                 end_date",
        )?
        .query_row(
            (
                builder.user_id,
                builder.amount,
                builder.description,
                builder.category_name,
                builder.category_icon,
                builder.kind.as_code(),
                builder.rule.frequency.as_code(),
                builder.rule.interval,
                builder.next_due_date,
                builder.end_date,
            ),
            map_template_row,
        )?;

    row.decode()
}

/// Retrieve a recurring template from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid template,
/// - [Error::InvalidFrequency], [Error::InvalidInterval] or
///   [Error::InvalidKind] if the stored row is corrupt,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_template(id: TemplateId, connection: &Connection) -> Result<RecurringTemplate, Error> {
    let row = connection
        .prepare(
            "SELECT id, user_id, amount, description, category_name,
                 category_icon, kind, frequency, interval, next_due_date,
                 end_date
             FROM recurring_template WHERE id = :id",
        )?
        .query_one(&[(":id", &id)], map_template_row)?;

    row.decode()
}

/// Get the IDs of every template, across all users, whose next due date is
/// on or before `date`.
///
/// Only the IDs are selected; the processor re-reads each template inside
/// its own unit of work, so a template deleted mid-batch is noticed then.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn select_due_template_ids(
    date: Date,
    connection: &Connection,
) -> Result<Vec<TemplateId>, Error> {
    connection
        .prepare("SELECT id FROM recurring_template WHERE next_due_date <= :date ORDER BY id")?
        .query_map(&[(":date", &date)], |row| row.get(0))?
        .map(|maybe_id| maybe_id.map_err(Error::SqlError))
        .collect()
}

/// Advance the next due date of the template with `id` to `new_due_date`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid template,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn advance_template(
    id: TemplateId,
    new_due_date: Date,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE recurring_template SET next_due_date = :date WHERE id = :id",
        rusqlite::named_params! {":date": new_due_date, ":id": id},
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Delete the template with `id`, e.g. because its final occurrence has been
/// emitted.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid template,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn delete_template(id: TemplateId, connection: &Connection) -> Result<(), Error> {
    let rows_affected =
        connection.execute("DELETE FROM recurring_template WHERE id = :id", &[(":id", &id)])?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Create the recurring template table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL
/// error.
pub fn create_recurring_template_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS recurring_template (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount REAL NOT NULL,
                description TEXT NOT NULL,
                category_name TEXT NOT NULL,
                category_icon TEXT NOT NULL,
                kind TEXT NOT NULL,
                frequency TEXT NOT NULL,
                interval INTEGER NOT NULL,
                next_due_date TEXT NOT NULL,
                end_date TEXT
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('recurring_template', 0)",
        (),
    )?;

    // The batch runner selects due templates by date on every run.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_recurring_template_due
             ON recurring_template(next_due_date);",
        (),
    )?;

    Ok(())
}

/// The raw column values of a template row, before the text-encoded fields
/// are decoded into their domain types.
struct TemplateRow {
    id: TemplateId,
    user_id: UserId,
    amount: f64,
    description: String,
    category_name: String,
    category_icon: String,
    kind: String,
    frequency: String,
    interval: i64,
    next_due_date: Date,
    end_date: Option<Date>,
}

impl TemplateRow {
    /// Decode the text-encoded kind and rule columns.
    fn decode(self) -> Result<RecurringTemplate, Error> {
        Ok(RecurringTemplate {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            description: self.description,
            category_name: self.category_name,
            category_icon: self.category_icon,
            kind: TransactionKind::from_code(&self.kind)?,
            rule: RecurrenceRule::decode(&self.frequency, self.interval)?,
            next_due_date: self.next_due_date,
            end_date: self.end_date,
        })
    }
}

/// Map a database row to a [TemplateRow].
fn map_template_row(row: &Row) -> Result<TemplateRow, rusqlite::Error> {
    Ok(TemplateRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        description: row.get(3)?,
        category_name: row.get(4)?,
        category_icon: row.get(5)?,
        kind: row.get(6)?,
        frequency: row.get(7)?,
        interval: row.get(8)?,
        next_due_date: row.get(9)?,
        end_date: row.get(10)?,
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
        Error,
        db::initialize,
        schedule::{Frequency, RecurrenceRule},
        template::{
            RecurringTemplate, TransactionKind, advance_template, create_template,
            delete_template, get_template, select_due_template_ids,
        },
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn create_and_get_roundtrip() {
        let conn = get_test_connection();
        let builder = RecurringTemplate::build(
            7,
            1200.0,
            TransactionKind::Expense,
            RecurrenceRule::new(Frequency::Month, 1),
            date!(2024 - 01 - 31),
        )
        .description("Rent")
        .category("Housing", "🏠")
        .end_date(Some(date!(2025 - 01 - 31)));

        let created = create_template(builder, &conn).expect("Could not create template");
        let fetched = get_template(created.id, &conn).expect("Could not get template");

        assert_eq!(created, fetched);
        assert_eq!(fetched.user_id, 7);
        assert_eq!(fetched.description, "Rent");
        assert_eq!(fetched.category_name, "Housing");
        assert_eq!(fetched.rule, RecurrenceRule::new(Frequency::Month, 1));
        assert_eq!(fetched.end_date, Some(date!(2025 - 01 - 31)));
    }

    #[test]
    fn get_fails_on_invalid_id() {
        let conn = get_test_connection();

        let result = get_template(42, &conn);

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn select_due_returns_only_due_ids_in_order() {
        let conn = get_test_connection();
        let rule = RecurrenceRule::new(Frequency::Month, 1);
        let due = create_template(
            RecurringTemplate::build(
                1,
                10.0,
                TransactionKind::Expense,
                rule,
                date!(2024 - 03 - 01),
            ),
            &conn,
        )
        .unwrap();
        let due_today = create_template(
            RecurringTemplate::build(
                2,
                20.0,
                TransactionKind::Income,
                rule,
                date!(2024 - 03 - 15),
            ),
            &conn,
        )
        .unwrap();
        let _future = create_template(
            RecurringTemplate::build(
                3,
                30.0,
                TransactionKind::Expense,
                rule,
                date!(2024 - 04 - 01),
            ),
            &conn,
        )
        .unwrap();

        let ids = select_due_template_ids(date!(2024 - 03 - 15), &conn)
            .expect("Could not select due templates");

        assert_eq!(ids, vec![due.id, due_today.id]);
    }

    #[test]
    fn advance_updates_next_due_date() {
        let conn = get_test_connection();
        let template = create_template(
            RecurringTemplate::build(
                1,
                10.0,
                TransactionKind::Expense,
                RecurrenceRule::new(Frequency::Week, 1),
                date!(2024 - 03 - 01),
            ),
            &conn,
        )
        .unwrap();

        advance_template(template.id, date!(2024 - 03 - 08), &conn)
            .expect("Could not advance template");

        let updated = get_template(template.id, &conn).unwrap();
        assert_eq!(updated.next_due_date, date!(2024 - 03 - 08));
    }

    #[test]
    fn advance_fails_on_invalid_id() {
        let conn = get_test_connection();

        let result = advance_template(42, date!(2024 - 03 - 08), &conn);

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn delete_removes_template() {
        let conn = get_test_connection();
        let template = create_template(
            RecurringTemplate::build(
                1,
                10.0,
                TransactionKind::Expense,
                RecurrenceRule::new(Frequency::Day, 1),
                date!(2024 - 03 - 01),
            ),
            &conn,
        )
        .unwrap();

        delete_template(template.id, &conn).expect("Could not delete template");

        assert_eq!(get_template(template.id, &conn), Err(Error::NotFound));
        assert_eq!(delete_template(template.id, &conn), Err(Error::NotFound));
    }

    #[test]
    fn get_fails_on_corrupt_frequency() {
        let conn = get_test_connection();
        conn.execute(
            "INSERT INTO recurring_template
                (user_id, amount, description, category_name, category_icon,
                 kind, frequency, interval, next_due_date)
             VALUES (1, 10.0, '', 'Other', '', 'expense', 'fortnight', 1,
                 '2024-03-01')",
            (),
        )
        .unwrap();

        let result = get_template(1, &conn);

        assert_eq!(result, Err(Error::InvalidFrequency("fortnight".to_owned())));
    }
}
