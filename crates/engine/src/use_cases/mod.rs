//! Use cases - User story orchestration.
//!
//! `render` turns questions and answers into field views and applies field
//! edits. `session` drives one questionnaire from load to final submission.

pub mod render;
pub mod session;

pub use render::{FieldChange, FieldView, FieldWidget, StepView};
pub use session::{FormSession, SessionContext, SessionError, SessionPorts, SessionSettings};
