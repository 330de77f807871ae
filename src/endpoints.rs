//! The API endpoint URIs.

/// The route the external scheduler calls to process due recurring
/// templates.
pub const RUN_RECURRING: &str = "/api/recurring/run";
