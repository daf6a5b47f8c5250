//! JSON API over a stored Cadence timeline.
//!
//! Exposes an axum [`Router`] backed by any
//! [`cadence_core::store::TimelineStore`]. Rationales missing from the store
//! can be synthesised on request with the configured text generator.
//! Transport concerns (binding, TLS, tracing middleware) belong to the caller.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", cadence_api::api_router(store.clone(), generator.clone(), 8))
//! ```

pub mod error;
pub mod rationales;
pub mod timeline;

use std::sync::Arc;

use axum::{Router, routing::get};
use cadence_core::{TextGenerator, rationale::RationaleGenerator, store::TimelineStore};

pub use error::ApiError;

/// Shared handler state.
pub struct AppState<S, G> {
  pub store:      Arc<S>,
  pub rationales: Arc<RationaleGenerator<G>>,
}

impl<S, G> Clone for AppState<S, G> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), rationales: self.rationales.clone() }
  }
}

/// Build the API router for `store`. On-demand rationales read the `window`
/// messages preceding the requesting message and are generated with
/// `generator`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, G>(store: Arc<S>, generator: Arc<G>, window: usize) -> Router<()>
where
  S: TimelineStore + 'static,
  G: TextGenerator + 'static,
{
  let state = AppState {
    store,
    rationales: Arc::new(RationaleGenerator::new(generator, window)),
  };

  Router::new()
    .route("/timeline", get(timeline::full::<S, G>))
    .route("/timeline/summary", get(timeline::summary::<S, G>))
    .route("/messages", get(timeline::messages::<S, G>))
    .route("/rationales", get(rationales::list::<S, G>))
    .route("/rationales/{decision_id}", get(rationales::get_one::<S, G>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
