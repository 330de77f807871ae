//! The batch runner: one sequential pass over every template that has come
//! due, across all users.
//!
//! Failures are isolated per template. The pass is an explicit fold over
//! per-item results: a failed item is recorded in the summary and the loop
//! moves on, so one broken template can never stall the rest. There is no
//! in-process retry; the external scheduler's fixed-interval trigger retries
//! naturally, and the ledger's unique occurrence index makes those retries
//! safe.

use rusqlite::Connection;
use serde::Serialize;
use time::Date;

use crate::{
    Error,
    database_id::TemplateId,
    processor::{ProcessingOutcome, process_template},
    template::select_due_template_ids,
};

/// The result of one batch run, returned to the trigger caller as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    /// How many due templates were processed without error.
    pub processed: usize,
    /// How many templates were due when the run started.
    pub total: usize,
    /// The templates that failed, with the failure text. Each stays due and
    /// will be retried on the next scheduled run.
    pub errors: Vec<BatchItemError>,
}

/// One failed item in a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemError {
    /// The ID of the template that failed.
    pub template_id: TemplateId,
    /// The failure, rendered for the scheduler's logs.
    pub message: String,
}

/// Process every template whose next due date is on or before `today` and
/// report how it went.
///
/// Items are processed sequentially; recurring volume is low and a
/// sequential pass avoids contention on shared rollup rows when one user
/// has several templates due in the same run.
///
/// # Errors
/// This function will return an [Error::SqlError] if the due templates
/// cannot be selected. Per-item failures do not abort the run; they are
/// collected into the summary.
pub fn run_due(today: Date, connection: &Connection) -> Result<BatchSummary, Error> {
    let due_ids = select_due_template_ids(today, connection)?;
    let total = due_ids.len();
    let mut processed = 0;
    let mut errors = Vec::new();

    for template_id in due_ids {
        match process_template(template_id, today, connection) {
            Ok(ProcessingOutcome::TemplateNotFound) => {
                // Deleted mid-batch by the user; not worth surfacing loudly.
                tracing::debug!(template_id, "template vanished before processing, skipping");
                processed += 1;
            }
            Ok(outcome) => {
                tracing::debug!(template_id, ?outcome, "processed recurring template");
                processed += 1;
            }
            Err(error) => {
                tracing::warn!(template_id, %error, "failed to process recurring template");
                errors.push(BatchItemError {
                    template_id,
                    message: error.to_string(),
                });
            }
        }
    }

    tracing::info!(
        processed,
        total,
        failed = errors.len(),
        "recurring batch run complete"
    );

    Ok(BatchSummary {
        processed,
        total,
        errors,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod run_due_tests {
    use rusqlite::Connection;
    use time::{Date, macros::date};

    use crate::{
        batch::run_due,
        database_id::TemplateId,
        db::initialize,
        ledger::sum_month,
        rollup::{RollupTotals, get_monthly_rollup},
        schedule::{Frequency, RecurrenceRule},
        template::{
            RecurringTemplate, TransactionKind, create_template, get_template,
        },
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn create_due_template(
        conn: &Connection,
        user_id: i64,
        amount: f64,
        kind: TransactionKind,
        due: Date,
    ) -> TemplateId {
        create_template(
            RecurringTemplate::build(
                user_id,
                amount,
                kind,
                RecurrenceRule::new(Frequency::Month, 1),
                due,
            ),
            conn,
        )
        .expect("Could not create template")
        .id
    }

    /// Insert a template row whose frequency text no release ever wrote,
    /// standing in for a transient per-item failure.
    fn create_corrupt_template(conn: &Connection, due: Date) -> TemplateId {
        conn.execute(
            "INSERT INTO recurring_template
                (user_id, amount, description, category_name, category_icon,
                 kind, frequency, interval, next_due_date)
             VALUES (1, 10.0, '', 'Other', '', 'expense', 'fortnight', 1,
                 :due)",
            &[(":due", &due)],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn failing_item_is_recorded_and_skipped() {
        let conn = get_test_connection();
        let today = date!(2024 - 03 - 15);
        let first =
            create_due_template(&conn, 1, 10.0, TransactionKind::Expense, date!(2024 - 03 - 01));
        let broken = create_corrupt_template(&conn, date!(2024 - 03 - 02));
        let third =
            create_due_template(&conn, 2, 20.0, TransactionKind::Income, date!(2024 - 03 - 03));

        let summary = run_due(today, &conn).expect("Could not run batch");

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].template_id, broken);

        // The healthy templates advanced past their old due dates.
        assert!(get_template(first, &conn).unwrap().next_due_date > date!(2024 - 03 - 01));
        assert!(get_template(third, &conn).unwrap().next_due_date > date!(2024 - 03 - 03));
        // The broken one is untouched and stays due for the next run.
        let broken_row: String = conn
            .query_row(
                "SELECT next_due_date FROM recurring_template WHERE id = :id",
                &[(":id", &broken)],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(broken_row, "2024-03-02");
    }

    #[test]
    fn run_with_nothing_due_is_a_no_op() {
        let conn = get_test_connection();
        create_due_template(&conn, 1, 10.0, TransactionKind::Expense, date!(2024 - 03 - 01));

        let first = run_due(date!(2024 - 03 - 01), &conn).unwrap();
        let second = run_due(date!(2024 - 03 - 01), &conn).unwrap();

        assert_eq!(first.processed, 1);
        assert_eq!(second.processed, 0);
        assert_eq!(second.total, 0);
        assert!(second.errors.is_empty());

        let entry_count: u32 = conn
            .query_row("SELECT COUNT(id) FROM ledger_entry", [], |row| row.get(0))
            .unwrap();
        assert_eq!(entry_count, 1);
        assert_eq!(
            get_monthly_rollup(1, 2024, 3, &conn),
            Ok(RollupTotals {
                income: 0.0,
                expense: 10.0
            })
        );
    }

    #[test]
    fn rollups_match_ledger_after_a_run() {
        let conn = get_test_connection();
        let today = date!(2024 - 03 - 15);
        create_due_template(&conn, 1, 1200.0, TransactionKind::Expense, date!(2024 - 03 - 01));
        create_due_template(&conn, 1, 42.5, TransactionKind::Expense, date!(2024 - 03 - 10));
        create_due_template(&conn, 1, 3000.0, TransactionKind::Income, date!(2024 - 03 - 05));

        let summary = run_due(today, &conn).unwrap();
        assert_eq!(summary.processed, 3);

        let rollup = get_monthly_rollup(1, 2024, 3, &conn).unwrap();
        assert_eq!(
            rollup.expense,
            sum_month(1, 2024, 3, TransactionKind::Expense, &conn).unwrap()
        );
        assert_eq!(
            rollup.income,
            sum_month(1, 2024, 3, TransactionKind::Income, &conn).unwrap()
        );
        assert_eq!(rollup.expense, 1242.5);
        assert_eq!(rollup.income, 3000.0);
    }

    #[test]
    fn summary_serializes_for_the_trigger_response() {
        let conn = get_test_connection();
        create_corrupt_template(&conn, date!(2024 - 03 - 01));

        let summary = run_due(date!(2024 - 03 - 15), &conn).unwrap();
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["processed"], 0);
        assert_eq!(json["total"], 1);
        assert_eq!(json["errors"][0]["template_id"], 1);
        assert!(
            json["errors"][0]["message"]
                .as_str()
                .unwrap()
                .contains("fortnight")
        );
    }
}
