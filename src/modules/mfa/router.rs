use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

use super::controller;

pub fn init_twofa_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(controller::twofa_status))
        .route("/enable", post(controller::enable_twofa))
        .route("/confirm", post(controller::confirm_twofa))
        .route("/disable", post(controller::disable_twofa))
}
