//! Text generation backends for Cadence, selected by configuration.
//!
//! [`GeneratorConfig::build`] turns a `backend = "template" | "http" |
//! "disabled"` setting into an [`AnyGenerator`], which the scheduler and the
//! API use like any other [`TextGenerator`](cadence_core::TextGenerator).

#![allow(async_fn_in_trait)]

mod any;
mod config;
mod http;

pub mod error;

pub use any::AnyGenerator;
pub use config::{Backend, GeneratorConfig, HttpConfig};
pub use error::{Error, Result};
pub use http::HttpGenerator;
