//! Error type for `cadence-generator`.
//!
//! Only construction can fail here. Failures during generation are
//! [`cadence_core::GenerationError`]s and are absorbed by the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to build HTTP client: {0}")]
  Client(#[from] reqwest::Error),

  #[error("invalid generator configuration: {0}")]
  Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
