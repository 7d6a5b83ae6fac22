use axum::http::Method;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

use crate::handler::{self, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::healthcheck))
        .route("/books", get(handler::list_books))
        .route("/books", post(handler::create_book))
        .route("/books/:id", get(handler::get_book))
        .route("/books/:book_id/borrow/:user_id", post(handler::borrow_book))
        .route("/books/:book_id/return/:user_id", post(handler::return_book))
        .route("/users", get(handler::list_users))
        .route("/users", post(handler::create_user))
        .route("/users/:id", get(handler::get_user))
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    routes().layer(cors).with_state(state)
}
