//! Integration tests for the upkeep self-update engine
//!
//! Every test talks to a local wiremock server standing in for the release
//! registry and CDN, so the suite runs offline and deterministically.
//!
//! Run with: `cargo test --test integration`

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod release_selection;
mod service;
mod state;
mod transfer;
