pub mod chat;
pub mod logs;

use axum::Router;

use crate::state::AppState;

/// All adapter routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(chat::routes(state.clone()))
        .merge(logs::routes(state))
}
