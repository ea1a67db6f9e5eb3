//! Observability for the meeting broker.
//!
//! Provides metrics definitions and recording helpers.

pub mod metrics;
