//! HTTP surface of the paste engine.
//!
//! Handlers translate requests into [`cinder_engine::PasteService`] calls
//! on the blocking pool and map engine errors to status codes. No paste
//! logic lives here.

pub mod auth;
pub mod error;
pub mod pastes;
pub mod state;
pub mod viewer;


use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Room for JSON escaping and the other request fields around the content.
const BODY_OVERHEAD: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_paste_bytes * 2 + BODY_OVERHEAD;

    Router::new()
        .route("/pastes", post(pastes::create_paste))
        .route("/pastes/recent", get(pastes::recent_pastes))
        .route(
            "/pastes/{short_id}",
            get(pastes::view_paste)
                .put(pastes::edit_paste)
                .delete(pastes::delete_paste),
        )
        .route("/pastes/{short_id}/fork", post(pastes::fork_paste))
        .route("/pastes/{short_id}/revisions", get(pastes::list_revisions))
        .route(
            "/pastes/{short_id}/revisions/{revision}",
            get(pastes::get_revision),
        )
        .route("/raw/{short_id}", get(pastes::raw_paste))
        .route("/health", get(pastes::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
