//! JSON-file backend for the Cadence timeline store.
//!
//! Writes the layout the browser viewer reads:
//!
//! ```text
//! <root>/messages.json
//! <root>/decisions/<decision_id>.json
//! ```

mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DECISIONS_DIR, FileStore, MESSAGES_FILE};
