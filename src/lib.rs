//! joinflow: team-join approval service.
//!
//! Library crate shared by the binary and the integration tests in `tests/`.

pub mod api;
pub mod config;
pub mod directory;
pub mod errors;
pub mod github;
pub mod join;
pub mod models;
pub mod notification;
pub mod org;
pub mod store;

use join::{JoinPipeline, JoinServices};
use store::postgres::PgStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: config::Config,
    pub db: PgStore,
    pub services: JoinServices,
    pub pipeline: JoinPipeline,
}
