//! Observability module
//!
//! Structured logging setup and helpers shared by the backend client and
//! the lesson flow.

pub mod telemetry;
