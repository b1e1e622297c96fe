//! HTTP API

pub mod api;

pub use api::{router, run_server, AppState};
