//! Feature modules implementing the MedCat API
//!
//! Each feature is a vertical slice with its own commands, queries, and
//! routes. Commands and queries implement the mediator pattern using the
//! `mediator` crate.
//!
//! # Features
//!
//! - **datasets**: dataset sources, their snapshot history, and on-demand ingestion

pub mod datasets;

use axum::Router;

pub use datasets::DatasetState;

/// Creates the API router with all feature routes mounted
///
/// - `/datasets` - Dataset sources and snapshots
pub fn router(state: DatasetState) -> Router<()> {
    Router::new().nest("/datasets", datasets::datasets_routes().with_state(state))
}
