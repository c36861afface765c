//! Portfolio intake engine library.
//!
//! Runs the multi-step intake questionnaire on top of `intake-domain`.
//!
//! ## Structure
//!
//! - `use_cases/` - Field rendering and the form session
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `app` - Application composition

pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
