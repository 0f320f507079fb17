//! End-to-end tests that run the supervisor binary.
//!
//! Run with: `cargo test --test integration`

mod cli_scenarios;
mod supervise_api;
