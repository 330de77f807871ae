//! Database ID type definitions.

/// The ID of a recurring transaction template.
pub type TemplateId = i64;
/// The ID of a concrete ledger entry.
pub type LedgerEntryId = i64;
/// The ID of the user owning a template or ledger entry.
pub type UserId = i64;
