//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Question schema and draft lookup (the portfolio backend)
//! - Saving drafts and final submissions
//! - Re-downloading stored files
//! - Clock/autosave timer (for testing)

mod error;
mod external;
mod testing;

pub use error::TransportError;

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    Credentials, DraftLookup, DraftSource, FileDownloader, SchemaSource, SubmissionApi,
};

#[cfg(test)]
pub use external::{MockDraftSource, MockFileDownloader, MockSchemaSource, MockSubmissionApi};

// =============================================================================
// Testability Ports
// =============================================================================
pub use testing::{AutosaveScheduler, ClockPort};

#[cfg(test)]
pub use testing::{MockAutosaveScheduler, MockClockPort};
