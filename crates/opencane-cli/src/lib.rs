//! CLI entry point for the opencane runtime (spec §6.2): argument parsing
//! and the exit-code contract (`0` normal, `1` config invalid, `2`
//! strict-startup dependency failure). Grounded on the teacher's
//! `gglib-cli` shape (a `clap`-derived `Cli` in `parser.rs`, dispatch in
//! `main.rs`), scoped down to a single-purpose server binary — CLI
//! packaging concerns (install scripts, shell completions, model/download
//! management) are out of scope here (spec §9 Design Notes).

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Silence unused dev-dependency warnings for test-only infrastructure.
#[cfg(test)]
use tokio_test as _;

// These are used by `main.rs` (a separate compilation unit from this lib
// target), not by this crate's own library code.
use dotenvy as _;
use opencane_axum as _;
use opencane_bootstrap as _;
use opencane_core as _;
use tokio as _;
use tracing as _;
use tracing_subscriber as _;

pub mod parser;

pub use parser::Cli;
