//! Core domain types with no I/O: jobs going out and results coming back.

pub mod job;
pub mod result;
