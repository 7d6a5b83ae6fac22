use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use mockable::Clock;
use tracing::info;

use crate::api::{created, success};
use crate::db::Database;
use crate::error::LedgerError;
use crate::ledger::{Ledger, LendingPolicy};
use crate::model::{CreateBook, CreateUser};
use crate::registry::{BookRegistry, UserRegistry};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub clock: Arc<dyn Clock + Send + Sync>,
    pub policy: LendingPolicy,
}

impl AppState {
    pub fn ledger(&self) -> Ledger<'_> {
        Ledger::new(&self.db, self.clock.as_ref(), self.policy)
    }

    pub fn books(&self) -> BookRegistry<'_> {
        BookRegistry::new(&self.db)
    }

    pub fn users(&self) -> UserRegistry<'_> {
        UserRegistry::new(&self.db)
    }
}

fn failure(action: &str, err: LedgerError) -> Response {
    if err.is_domain() {
        tracing::warn!(error = %err, "{} rejected", action);
    } else {
        tracing::error!(error = %crate::unpack_error(&err), "failed to {}", action);
    }
    err.into_response()
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    success("ok")
}

pub async fn create_book(State(state): State<AppState>, Json(payload): Json<CreateBook>) -> Response {
    match state.books().create(payload).await {
        Ok(book) => {
            info!(book_id = book.id, "created book");
            created(book)
        }
        Err(e) => failure("create book", e),
    }
}

pub async fn list_books(State(state): State<AppState>) -> Response {
    match state.books().list().await {
        Ok(books) => success(books),
        Err(e) => failure("list books", e),
    }
}

pub async fn get_book(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    match state.books().get(id).await {
        Ok(Some(book)) => success(book),
        Ok(None) => failure("get book", LedgerError::book_not_found(id)),
        Err(e) => failure("get book", e),
    }
}

pub async fn create_user(State(state): State<AppState>, Json(payload): Json<CreateUser>) -> Response {
    match state.users().find_by_name(&payload.name).await {
        Ok(Some(_)) => return failure("create user", LedgerError::DuplicateName(payload.name)),
        Ok(None) => {}
        Err(e) => return failure("create user", e),
    }

    match state.users().create(payload).await {
        Ok(user) => {
            info!(user_id = user.id, "created user");
            created(user)
        }
        Err(e) => failure("create user", e),
    }
}

pub async fn list_users(State(state): State<AppState>) -> Response {
    match state.users().list().await {
        Ok(users) => success(users),
        Err(e) => failure("list users", e),
    }
}

pub async fn get_user(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    match state.users().get(id).await {
        Ok(Some(user)) => success(user),
        Ok(None) => failure("get user", LedgerError::user_not_found(id)),
        Err(e) => failure("get user", e),
    }
}

pub async fn borrow_book(State(state): State<AppState>, Path((book_id, user_id)): Path<(i32, i32)>) -> Response {
    match state.ledger().borrow(book_id, user_id).await {
        Ok(book) => success(book),
        Err(e) => failure("borrow book", e),
    }
}

pub async fn return_book(State(state): State<AppState>, Path((book_id, user_id)): Path<(i32, i32)>) -> Response {
    match state.ledger().return_book(book_id, user_id).await {
        Ok(book) => success(book),
        Err(e) => failure("return book", e),
    }
}
