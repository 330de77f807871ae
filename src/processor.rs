//! The recurrence processor: one template's due-date transition as a single
//! unit of work.
//!
//! Emitting the ledger entry, bumping the rollups and advancing the
//! template's due date happen inside one SQL transaction, so a crash in the
//! middle cannot leave the ledger and the template disagreeing. If the
//! process dies between commit-less steps anyway (or the batch is triggered
//! twice), the ledger's unique occurrence index turns the replay into a
//! harmless no-op emit.

use rusqlite::Connection;
use time::Date;

use crate::{
    Error,
    database_id::TemplateId,
    ledger::{EmitOutcome, emit_occurrence},
    rollup::apply_delta,
    schedule::next_occurrence,
    template::{advance_template, delete_template, get_template},
};

/// How processing one recurring template ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    /// An occurrence fell due and was processed; holds the occurrence date.
    ///
    /// Also returned when the ledger entry already existed from an earlier
    /// partial run: the entry is not duplicated but the due date still
    /// advances.
    Emitted(Date),
    /// The template's next due date is still in the future. Nothing to do.
    ///
    /// Defensive: the batch runner only selects due templates, so this
    /// appears only if the template advanced between selection and
    /// processing.
    AlreadyUpToDate,
    /// The newly computed due date passed the template's end date, so the
    /// final occurrence was emitted and the template deleted.
    TemplateExpired,
    /// The template vanished between selection and processing, e.g. the
    /// user deleted it mid-batch. Nothing to do.
    TemplateNotFound,
}

/// Process the recurring template with `id` against the processing clock
/// `today`: emit its due occurrence, update the rollups, and advance or
/// expire the template.
///
/// The whole transition runs inside one SQL transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidFrequency], [Error::InvalidInterval] or
///   [Error::InvalidKind] if the stored template row is corrupt,
/// - or [Error::SqlError] if there is an SQL error.
///
/// A missing template is not an error; it is reported as
/// [ProcessingOutcome::TemplateNotFound].
pub fn process_template(
    id: TemplateId,
    today: Date,
    connection: &Connection,
) -> Result<ProcessingOutcome, Error> {
    let transaction = connection.unchecked_transaction()?;

    let template = match get_template(id, &transaction) {
        Ok(template) => template,
        Err(Error::NotFound) => return Ok(ProcessingOutcome::TemplateNotFound),
        Err(error) => return Err(error),
    };

    if template.next_due_date > today {
        return Ok(ProcessingOutcome::AlreadyUpToDate);
    }

    let occurrence_date = template.next_due_date;

    match emit_occurrence(&template, occurrence_date, &transaction)? {
        EmitOutcome::Created(entry) => {
            apply_delta(
                entry.user_id,
                entry.date,
                entry.kind,
                entry.amount,
                &transaction,
            )?;
        }
        // The entry exists from an earlier partial run. The rollups were
        // already bumped when it was written, so they must not be bumped
        // again.
        EmitOutcome::AlreadyEmitted => {
            tracing::debug!(
                template_id = id,
                date = %occurrence_date,
                "occurrence already in the ledger, skipping rollup update"
            );
        }
    }

    let new_due_date = next_occurrence(occurrence_date, &template.rule);

    let outcome = match template.end_date {
        Some(end_date) if new_due_date > end_date => {
            delete_template(id, &transaction)?;
            tracing::info!(template_id = id, "recurring template expired after final occurrence");
            ProcessingOutcome::TemplateExpired
        }
        _ => {
            advance_template(id, new_due_date, &transaction)?;
            ProcessingOutcome::Emitted(occurrence_date)
        }
    };

    transaction.commit()?;

    Ok(outcome)
}

// ============================================================================
// TESTS
// ============================================================================
