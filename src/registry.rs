//! Book and user registries.
//!
//! A user's borrowed books are never stored on the user; they are read back from
//! `books.borrower_id` every time a [`User`] is loaded.

use chrono::NaiveDate;
use libsql::Row;
use std::collections::HashMap;

use crate::db::Database;
use crate::error::{LedgerError, LedgerResult};
use crate::model::{Book, CreateBook, CreateUser, User};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

const BOOK_COLUMNS: &str = "id, title, author, available, borrower_id, due_date";

pub(crate) fn row_to_book(row: &Row) -> LedgerResult<Book> {
    let id: i32 = row.get(0)?;
    let available: i32 = row.get(3)?;
    let due_date = match row.get::<Option<String>>(5)? {
        Some(raw) => Some(
            NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                .map_err(|e| LedgerError::Corrupt(format!("book {id} has due_date '{raw}': {e}")))?,
        ),
        None => None,
    };

    Ok(Book {
        id,
        title: row.get(1)?,
        author: row.get(2)?,
        available: available != 0,
        borrower_id: row.get(4)?,
        due_date,
    })
}

pub struct BookRegistry<'a> {
    db: &'a Database,
}

impl<'a> BookRegistry<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: CreateBook) -> LedgerResult<Book> {
        let _tx = self.db.begin().await?;
        let result = self.insert(&input).await;
        self.db.finish(result).await
    }

    async fn insert(&self, input: &CreateBook) -> LedgerResult<Book> {
        let query = format!(
            "INSERT INTO books (title, author, available) VALUES (?, ?, 1) RETURNING {BOOK_COLUMNS}"
        );
        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![input.title.as_str(), input.author.as_str()])
            .await?;

        match rows.next().await? {
            Some(row) => row_to_book(&row),
            None => Err(LedgerError::Corrupt("insert into books returned no row".to_string())),
        }
    }

    pub async fn get(&self, id: i32) -> LedgerResult<Option<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?");
        let mut rows = self.db.connection().query(&query, libsql::params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_book(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self) -> LedgerResult<Vec<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY id");
        self.collect(&query, ()).await
    }

    pub async fn borrowed_by(&self, user_id: i32) -> LedgerResult<Vec<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE borrower_id = ? ORDER BY id");
        self.collect(&query, libsql::params![user_id]).await
    }

    async fn collect(&self, query: &str, params: impl libsql::params::IntoParams) -> LedgerResult<Vec<Book>> {
        let mut rows = self.db.connection().query(query, params).await?;
        let mut books = vec![];
        while let Some(row) = rows.next().await? {
            books.push(row_to_book(&row)?);
        }
        Ok(books)
    }
}

pub struct UserRegistry<'a> {
    db: &'a Database,
}

impl<'a> UserRegistry<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Inserts a user. Callers are expected to check [`UserRegistry::find_by_name`] first,
    /// but a name collision that slips past them still fails with `DuplicateName`.
    pub async fn create(&self, input: CreateUser) -> LedgerResult<User> {
        let _tx = self.db.begin().await?;
        let result = self.insert(&input).await;
        self.db.finish(result).await
    }

    async fn insert(&self, input: &CreateUser) -> LedgerResult<User> {
        let query = "INSERT INTO users (name) VALUES (?) RETURNING id, name, total_fines";
        let duplicate = |e: libsql::Error| {
            if e.to_string().contains("UNIQUE constraint failed") {
                LedgerError::DuplicateName(input.name.clone())
            } else {
                LedgerError::Storage(e)
            }
        };

        let mut rows = self
            .db
            .connection()
            .query(query, libsql::params![input.name.as_str()])
            .await
            .map_err(duplicate)?;

        match rows.next().await.map_err(duplicate)? {
            Some(row) => Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                total_fines: row.get(2)?,
                borrowed_books: vec![],
            }),
            None => Err(LedgerError::Corrupt("insert into users returned no row".to_string())),
        }
    }

    pub async fn get(&self, id: i32) -> LedgerResult<Option<User>> {
        let query = "SELECT id, name, total_fines FROM users WHERE id = ?";
        self.fetch_one(query, libsql::params![id]).await
    }

    pub async fn find_by_name(&self, name: &str) -> LedgerResult<Option<User>> {
        let query = "SELECT id, name, total_fines FROM users WHERE name = ?";
        self.fetch_one(query, libsql::params![name]).await
    }

    async fn fetch_one(&self, query: &str, params: impl libsql::params::IntoParams) -> LedgerResult<Option<User>> {
        let mut rows = self.db.connection().query(query, params).await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let id: i32 = row.get(0)?;
        Ok(Some(User {
            id,
            name: row.get(1)?,
            total_fines: row.get(2)?,
            borrowed_books: BookRegistry::new(self.db).borrowed_by(id).await?,
        }))
    }

    pub async fn list(&self) -> LedgerResult<Vec<User>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE borrower_id IS NOT NULL ORDER BY id");
        let mut borrowed: HashMap<i32, Vec<Book>> = HashMap::new();
        for book in BookRegistry::new(self.db).collect(&query, ()).await? {
            if let Some(user_id) = book.borrower_id {
                borrowed.entry(user_id).or_default().push(book);
            }
        }

        let mut rows = self
            .db
            .connection()
            .query("SELECT id, name, total_fines FROM users ORDER BY id", ())
            .await?;
        let mut users = vec![];
        while let Some(row) = rows.next().await? {
            let id: i32 = row.get(0)?;
            users.push(User {
                id,
                name: row.get(1)?,
                total_fines: row.get(2)?,
                borrowed_books: borrowed.remove(&id).unwrap_or_default(),
            });
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, author: &str) -> CreateBook {
        CreateBook {
            title: title.to_string(),
            author: author.to_string(),
        }
    }

    fn user(name: &str) -> CreateUser {
        CreateUser { name: name.to_string() }
    }

    #[tokio::test]
    async fn created_books_start_available() {
        let db = Database::in_memory().await.unwrap();
        let books = BookRegistry::new(&db);

        let created = books.create(book("1984", "George Orwell")).await.unwrap();
        assert_eq!(created.title, "1984");
        assert_eq!(created.author, "George Orwell");
        assert!(created.available);
        assert_eq!(created.borrower_id, None);
        assert_eq!(created.due_date, None);

        assert_eq!(books.get(created.id).await.unwrap(), Some(created));
        assert_eq!(books.get(999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_titles_are_accepted() {
        let db = Database::in_memory().await.unwrap();
        let created = BookRegistry::new(&db).create(book("", "")).await.unwrap();
        assert_eq!(created.title, "");
    }

    #[tokio::test]
    async fn list_books_in_id_order() {
        let db = Database::in_memory().await.unwrap();
        let books = BookRegistry::new(&db);
        let a = books.create(book("1984", "George Orwell")).await.unwrap();
        let b = books.create(book("Brave New World", "Aldous Huxley")).await.unwrap();

        let listed = books.list().await.unwrap();
        assert_eq!(listed.iter().map(|b| b.id).collect::<Vec<_>>(), vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRegistry::new(&db);

        let alice = users.create(user("Alice")).await.unwrap();
        assert_eq!(alice.total_fines, 0);
        assert!(alice.borrowed_books.is_empty());

        let err = users.create(user("Alice")).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateName(ref n) if n == "Alice"));

        // the failed insert must not leave the connection inside a transaction
        users.create(user("Bob")).await.unwrap();
        assert_eq!(users.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn find_by_name_and_get() {
        let db = Database::in_memory().await.unwrap();
        let users = UserRegistry::new(&db);
        let alice = users.create(user("Alice")).await.unwrap();

        assert_eq!(users.find_by_name("Alice").await.unwrap(), Some(alice.clone()));
        assert_eq!(users.get(alice.id).await.unwrap(), Some(alice));
        assert_eq!(users.find_by_name("alice").await.unwrap(), None);
        assert_eq!(users.get(42).await.unwrap(), None);
    }
}
