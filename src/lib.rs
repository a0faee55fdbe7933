//! patchbot library crate
//!
//! Exposes the worker's modules so integration tooling and tests can
//! exercise the reconciliation engine without going through CLI startup.

pub mod config;
pub mod engine;
pub mod github;
pub mod host;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod proposal;
