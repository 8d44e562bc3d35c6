//! Users CRUD over a single PostgreSQL table.
//!
//! Layers, leaf first: `contract` (plain models), `infra::storage` (sqlx
//! repository), `domain` (service rules and errors), `api::rest` (axum
//! handlers and routes).

// === PUBLIC CONTRACT ===
pub mod contract;
pub use contract::model;

// === INTERNAL MODULES ===
// Exposed for the server binary and for tests.
#[doc(hidden)]
pub mod api;
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod infra;

pub use api::rest::handlers::RequestCancellation;
pub use api::rest::routes::register_routes;
