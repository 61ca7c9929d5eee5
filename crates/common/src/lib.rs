//! Fern Common Library
//!
//! Shared data model, request ledger and error taxonomy for the Fern PM
//! tool emulators.

pub mod error;
pub mod ledger;
pub mod types;

pub use error::{Error, Result};
pub use ledger::{response_key, MockRequest, MockResponse, RequestLedger};
pub use types::*;

/// Fern emulator version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current wall-clock time used for all emulator timestamps
pub fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
