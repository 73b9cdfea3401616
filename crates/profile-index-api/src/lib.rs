//! Profile Index API
//!
//! HTTP boundary and process wiring around `profile-index-core`: node
//! registration, lookup, search and deletion over axum, plus the
//! `profile-index` binary with `serve`, `revalidate` and `cleanup`
//! subcommands.

pub mod app;
pub mod handler;

pub use app::{App, AppOptions};
pub use handler::{create_router, ApiError, ApiResponse, AppState, ErrorObject};
