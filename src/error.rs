use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    #[error("Hi {requester}, the book '{title}' is not available, it is already borrowed to {borrower}")]
    AlreadyBorrowed {
        requester: String,
        title: String,
        borrower: String,
    },

    #[error("{name} has reached the borrowing limit of {limit} books")]
    LimitReached { name: String, limit: u32 },

    #[error("the book '{title}' was not borrowed by {name}")]
    NotBorrower { name: String, title: String },

    #[error("a user with the name '{0}' already exists, please choose a different name")]
    DuplicateName(String),

    #[error("storage error: {0}")]
    Storage(#[from] libsql::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl LedgerError {
    pub fn book_not_found(id: i32) -> Self {
        LedgerError::NotFound { entity: "book", id }
    }

    pub fn user_not_found(id: i32) -> Self {
        LedgerError::NotFound { entity: "user", id }
    }

    /// True for rejected transitions, false for infrastructure failures.
    pub fn is_domain(&self) -> bool {
        !matches!(self, LedgerError::Storage(_) | LedgerError::Corrupt(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
