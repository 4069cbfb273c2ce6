//! Command-line argument definitions, one module per binary.

pub mod coordinator;
pub mod worker;
