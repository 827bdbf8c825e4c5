//! Book entity.

use super::lending::{Borrower, LendingFlags, LendingState, Loan, non_blank};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum length of an author name part.
pub const MAX_AUTHOR_LEN: usize = 100;
/// Maximum length of a title.
pub const MAX_TITLE_LEN: usize = 200;
/// Maximum length of a non-user name.
pub const MAX_NONUSER_LEN: usize = 200;
/// Maximum length of a comment.
pub const MAX_COMMENT_LEN: usize = 300;

/// Rejected book input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    /// Flags that cannot hold together, e.g. wished and recommended.
    #[error("mutually exclusive state: {0}")]
    MutuallyExclusiveState(&'static str),

    /// Loan flag set without everything a loan needs.
    #[error("invalid loan state: {0}")]
    InvalidLoanState(&'static str),

    /// Loan details given for a book that is not loaned.
    #[error("a book that is not loaned cannot have a borrower or a loan date")]
    InconsistentClearState,

    /// Required field left blank.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// Field over its length limit.
    #[error("{field} must be at most {max} characters")]
    FieldTooLong {
        /// Field name.
        field: &'static str,
        /// Limit in characters.
        max: usize,
    },
}

/// Descriptive fields shared by every kind of book.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BookDetails {
    /// Author family name.
    pub author_last_name: String,
    /// Author given name.
    pub author_first_name: String,
    /// Title.
    pub title: String,
    /// Genre reference.
    #[serde(default)]
    pub genre_id: Option<i64>,
    /// Language reference.
    #[serde(default)]
    pub language_id: Option<i64>,
    /// Free-text comment shown to friends.
    #[serde(default)]
    pub comment: String,
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), BookError> {
    if value.chars().count() > max {
        return Err(BookError::FieldTooLong { field, max });
    }
    Ok(())
}

impl BookDetails {
    /// Trim text fields and check their limits.
    pub fn normalized(mut self) -> Result<Self, BookError> {
        self.author_last_name = self.author_last_name.trim().to_string();
        self.author_first_name = self.author_first_name.trim().to_string();
        self.title = self.title.trim().to_string();
        self.comment = self.comment.trim().to_string();

        if self.title.is_empty() {
            return Err(BookError::EmptyField("title"));
        }
        if self.author_last_name.is_empty() {
            return Err(BookError::EmptyField("author_last_name"));
        }
        if self.author_first_name.is_empty() {
            return Err(BookError::EmptyField("author_first_name"));
        }
        check_len("author_last_name", &self.author_last_name, MAX_AUTHOR_LEN)?;
        check_len("author_first_name", &self.author_first_name, MAX_AUTHOR_LEN)?;
        check_len("title", &self.title, MAX_TITLE_LEN)?;
        check_len("comment", &self.comment, MAX_COMMENT_LEN)?;
        Ok(self)
    }
}

/// How the record keeper holds the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Holding {
    /// The keeper owns it.
    Own {
        /// Recommended / wished / loaned facet.
        lending: LendingState,
    },
    /// Physically borrowed from someone who is not a user here.
    BorrowedFromNonUser {
        /// Name of the real owner.
        owner_name: String,
        /// When the keeper received it.
        received: NaiveDate,
    },
}

impl Holding {
    /// Validate a non-user owner name and build the holding.
    pub fn from_nonuser(owner_name: &str, received: NaiveDate) -> Result<Self, BookError> {
        let owner_name =
            non_blank(Some(owner_name)).ok_or(BookError::EmptyField("owner_nonuser"))?;
        check_len("owner_nonuser", &owner_name, MAX_NONUSER_LEN)?;
        Ok(Holding::BorrowedFromNonUser {
            owner_name,
            received,
        })
    }

    /// Validate lending flags and build an owned holding.
    pub fn owned(flags: &LendingFlags) -> Result<Self, BookError> {
        if let Some(name) = flags.borrower_nonuser.as_deref() {
            check_len("borrower_nonuser", name.trim(), MAX_NONUSER_LEN)?;
        }
        Ok(Holding::Own {
            lending: LendingState::from_flags(flags)?,
        })
    }
}

/// A book record kept by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Unique identifier.
    pub id: String,
    /// User keeping this record.
    pub owner_id: String,
    /// Descriptive fields.
    pub details: BookDetails,
    /// Ownership and lending state.
    pub holding: Holding,
}

impl Book {
    /// Create a book with a fresh ID.
    pub fn new(owner_id: &str, details: BookDetails, holding: Holding) -> Result<Self, BookError> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            details: details.normalized()?,
            holding,
        })
    }

    /// Lending state, for books the keeper owns.
    pub fn lending(&self) -> Option<&LendingState> {
        match &self.holding {
            Holding::Own { lending } => Some(lending),
            Holding::BorrowedFromNonUser { .. } => None,
        }
    }

    /// Whether the real owner is not a user.
    pub fn is_from_nonuser(&self) -> bool {
        matches!(self.holding, Holding::BorrowedFromNonUser { .. })
    }

    /// Storage view of the holding: `(owner_nonuser, flags)`.
    ///
    /// A non-user book stores its received date as the loan date and no flags.
    pub fn storage_flags(&self) -> (Option<String>, LendingFlags) {
        match &self.holding {
            Holding::Own { lending } => (None, lending.flags()),
            Holding::BorrowedFromNonUser {
                owner_name,
                received,
            } => (
                Some(owner_name.clone()),
                LendingFlags {
                    loan_date: Some(*received),
                    ..LendingFlags::default()
                },
            ),
        }
    }

    /// The borrowing user left: keep the loan on record under their name.
    pub fn release_departed_borrower(&mut self, user_id: &str, username: &str) -> bool {
        match &mut self.holding {
            Holding::Own { lending } => lending.release_user_borrower(user_id, username),
            Holding::BorrowedFromNonUser { .. } => false,
        }
    }

    /// The owner left while the book was lent to a user: the borrower keeps it.
    ///
    /// The borrower becomes the keeper and the departed owner is recorded by
    /// name; the loan date becomes the received date. Returns the new keeper.
    pub fn settle_for_departed_owner(&mut self, username: &str) -> Option<String> {
        let Holding::Own {
            lending:
                LendingState::Loaned(Loan {
                    borrower: Borrower::User(borrower_id),
                    date,
                }),
        } = &self.holding
        else {
            return None;
        };

        let new_owner = borrower_id.clone();
        let received = *date;
        self.owner_id = new_owner.clone();
        self.holding = Holding::BorrowedFromNonUser {
            owner_name: username.to_string(),
            received,
        };
        Some(new_owner)
    }
}
