//! Borrow and return transitions.
//!
//! A book's `available`, `borrower_id` and `due_date` always change together in a single
//! UPDATE, and every precondition is checked before that UPDATE runs. Each transition runs
//! in its own write transaction, so a rejected borrow or return leaves nothing behind.

use chrono::{Days, NaiveDate};
use mockable::Clock;
use serde::Deserialize;

use crate::db::Database;
use crate::error::{LedgerError, LedgerResult};
use crate::model::{Book, User};
use crate::registry::{BookRegistry, DATE_FORMAT, UserRegistry};

pub const BORROW_LIMIT: u32 = 2;
pub const LOAN_PERIOD_DAYS: u32 = 14;
pub const FINE_PER_DAY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LendingPolicy {
    pub borrow_limit: u32,
    pub loan_period_days: u32,
    pub fine_per_day: u32,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        LendingPolicy {
            borrow_limit: BORROW_LIMIT,
            loan_period_days: LOAN_PERIOD_DAYS,
            fine_per_day: FINE_PER_DAY,
        }
    }
}

impl LendingPolicy {
    pub fn due_date(&self, borrowed_on: NaiveDate) -> LedgerResult<NaiveDate> {
        borrowed_on
            .checked_add_days(Days::new(u64::from(self.loan_period_days)))
            .ok_or_else(|| LedgerError::Corrupt(format!("due date overflows from {borrowed_on}")))
    }

    /// Fine owed when returning on `returned_on`. Zero on or before the due date.
    pub fn fine(&self, due_date: NaiveDate, returned_on: NaiveDate) -> i64 {
        let overdue_days = (returned_on - due_date).num_days();
        if overdue_days > 0 {
            overdue_days * i64::from(self.fine_per_day)
        } else {
            0
        }
    }
}

pub struct Ledger<'a> {
    db: &'a Database,
    clock: &'a (dyn Clock + Send + Sync),
    policy: LendingPolicy,
}

impl<'a> Ledger<'a> {
    pub fn new(db: &'a Database, clock: &'a (dyn Clock + Send + Sync), policy: LendingPolicy) -> Self {
        Self { db, clock, policy }
    }

    fn today(&self) -> NaiveDate {
        self.clock.local().date_naive()
    }

    async fn load(&self, book_id: i32, user_id: i32) -> LedgerResult<(Book, User)> {
        let book = BookRegistry::new(self.db)
            .get(book_id)
            .await?
            .ok_or_else(|| LedgerError::book_not_found(book_id))?;
        let user = UserRegistry::new(self.db)
            .get(user_id)
            .await?
            .ok_or_else(|| LedgerError::user_not_found(user_id))?;
        Ok((book, user))
    }

    async fn already_borrowed(&self, requester: &User, book: &Book) -> LedgerResult<LedgerError> {
        let borrower = match book.borrower_id {
            Some(id) => UserRegistry::new(self.db).get(id).await?.map(|u| u.name),
            None => None,
        };
        Ok(LedgerError::AlreadyBorrowed {
            requester: requester.name.clone(),
            title: book.title.clone(),
            borrower: borrower.unwrap_or_else(|| "another user".to_string()),
        })
    }

    pub async fn borrow(&self, book_id: i32, user_id: i32) -> LedgerResult<Book> {
        let _tx = self.db.begin().await?;
        let result = self.borrow_internal(book_id, user_id).await;
        self.db.finish(result).await
    }

    async fn borrow_internal(&self, book_id: i32, user_id: i32) -> LedgerResult<Book> {
        let (book, user) = self.load(book_id, user_id).await?;

        if !book.available {
            return Err(self.already_borrowed(&user, &book).await?);
        }

        if user.borrowed_books.len() >= self.policy.borrow_limit as usize {
            return Err(LedgerError::LimitReached {
                name: user.name,
                limit: self.policy.borrow_limit,
            });
        }

        let due_date = self.policy.due_date(self.today())?;
        if !self.claim(book_id, user_id, due_date).await? {
            let current = BookRegistry::new(self.db).get(book_id).await?.unwrap_or(book);
            return Err(self.already_borrowed(&user, &current).await?);
        }

        tracing::info!(book_id, user_id, %due_date, "book borrowed");
        BookRegistry::new(self.db)
            .get(book_id)
            .await?
            .ok_or_else(|| LedgerError::book_not_found(book_id))
    }

    /// Hands an available book to `user_id`. Returns false, writing nothing, when the
    /// book is no longer available at the time of the write.
    async fn claim(&self, book_id: i32, user_id: i32, due_date: NaiveDate) -> LedgerResult<bool> {
        let updated = self
            .db
            .connection()
            .execute(
                "UPDATE books SET available = 0, borrower_id = ?, due_date = ? WHERE id = ? AND available = 1",
                libsql::params![user_id, due_date.format(DATE_FORMAT).to_string(), book_id],
            )
            .await?;
        Ok(updated == 1)
    }

    pub async fn return_book(&self, book_id: i32, user_id: i32) -> LedgerResult<Book> {
        let _tx = self.db.begin().await?;
        let result = self.return_internal(book_id, user_id).await;
        self.db.finish(result).await
    }

    async fn return_internal(&self, book_id: i32, user_id: i32) -> LedgerResult<Book> {
        let (book, user) = self.load(book_id, user_id).await?;

        if !book.is_borrowed_by(user_id) {
            return Err(LedgerError::NotBorrower {
                name: user.name,
                title: book.title,
            });
        }

        let fine = match book.due_date {
            Some(due_date) => self.policy.fine(due_date, self.today()),
            None => 0,
        };
        if fine > 0 {
            self.db
                .connection()
                .execute(
                    "UPDATE users SET total_fines = total_fines + ? WHERE id = ?",
                    libsql::params![fine, user_id],
                )
                .await?;
        }

        self.db
            .connection()
            .execute(
                "UPDATE books SET available = 1, borrower_id = NULL, due_date = NULL WHERE id = ? AND borrower_id = ?",
                libsql::params![book_id, user_id],
            )
            .await?;

        tracing::info!(book_id, user_id, fine, "book returned");
        BookRegistry::new(self.db)
            .get(book_id)
            .await?
            .ok_or_else(|| LedgerError::book_not_found(book_id))
    }
}
