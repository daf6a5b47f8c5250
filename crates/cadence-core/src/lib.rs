//! Core types and the deterministic conversation scheduler for Cadence.
//!
//! This crate is deliberately free of HTTP and database dependencies. Text
//! generation and persistence are reached through the [`TextGenerator`] and
//! [`store::TimelineStore`] traits; other crates supply the backends.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod decision;
pub mod error;
pub mod factory;
pub mod generate;
pub mod member;
pub mod message;
pub mod rationale;
pub mod schedule;
pub mod store;
pub mod timeline;
pub mod validate;
pub mod variety;

pub use error::{Error, Result};
pub use generate::{GenerationError, TextGenerator};
