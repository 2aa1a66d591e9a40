//! Integration tests for the reconciliation engine.

mod common;
mod convergence;
mod discovery_fallback;
mod end_to_end;
