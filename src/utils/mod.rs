//! Shared utilities.
pub mod cli;
