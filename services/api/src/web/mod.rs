pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

pub use state::{AppState, SessionStore};

/// Upper bound on an uploaded document.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Build the web router over the shared application state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index_handler))
        .route("/generate", get(handlers::generate_handler))
        .route("/create", post(handlers::create_handler))
        .route("/login", post(handlers::login_handler))
        .route("/lookup", get(handlers::lookup_handler))
        .route("/submit", post(handlers::submit_handler))
        .route("/delete", post(handlers::delete_handler))
        .route("/delete-all", post(handlers::delete_all_handler))
        .route("/logout", get(handlers::logout_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
