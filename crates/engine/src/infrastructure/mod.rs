//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod clock;
pub mod config;
pub mod in_memory;
pub mod ports;
pub mod scheduler;
pub mod telemetry;
