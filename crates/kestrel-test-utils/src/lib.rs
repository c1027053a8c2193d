//! Utilities shared by Kestrel tests.
//!
//! - [`FixtureDb`]: parses a small Kotlin-like fixture language into
//!   declaration trees and bodies and answers [`kestrel_resolve::ResolutionContext`]
//!   queries over them.
//! - `/*start*/ ... /*end*/` selection markers ([`extract_range`]) and `$0`
//!   cursor markers ([`extract_offset`]).
//!
//! The fixture language is intentionally small; unsupported syntax panics with
//! the offending offset so broken fixtures fail loudly.

mod db;
mod fixtures;
mod lexer;
mod parser;
mod types;

pub use db::FixtureDb;
pub use fixtures::{extract_offset, extract_range, find_span};
pub use parser::FunctionFixture;
pub use types::{parse_type, qualify};
