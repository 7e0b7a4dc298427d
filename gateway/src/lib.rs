pub mod api;
pub mod handlers;
pub mod sessions;
pub mod telephony;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use council_core::QueryRouter;

use crate::sessions::SessionStore;

// Application State
// The Router (Logic + Body) and the live conversations
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<QueryRouter>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(router: Arc<QueryRouter>) -> Self {
        Self {
            router,
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/tools", get(handlers::list_tools))
        .route("/chat", post(handlers::chat))
        .route("/chat/{session_id}", delete(handlers::end_chat))
        .route("/api/incoming-call", post(telephony::incoming_call))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
