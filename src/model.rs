use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub available: bool,
    pub borrower_id: Option<i32>,
    pub due_date: Option<NaiveDate>,
}

impl Book {
    pub fn is_borrowed_by(&self, user_id: i32) -> bool {
        self.borrower_id == Some(user_id)
    }
}

/// A library member. `borrowed_books` is derived from `books.borrower_id` on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub total_fines: i64,
    pub borrowed_books: Vec<Book>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub name: String,
}
