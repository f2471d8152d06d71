//! Deterministic, pure logic for the verification loop.
//!
//! Core modules are free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod analytics;
pub mod script;
pub mod status;
pub mod tags;
pub mod types;
