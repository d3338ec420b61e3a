use axum::{
    Router,
    routing::{get, patch},
};

use crate::state::AppState;

use super::controller;

pub fn init_users_router() -> Router<AppState> {
    Router::new()
        .route("/", get(controller::list_users))
        .route(
            "/me",
            get(controller::get_me).patch(controller::update_me),
        )
        .route("/{id}/role", patch(controller::update_role))
        .route("/{id}/activation", patch(controller::update_activation))
}
