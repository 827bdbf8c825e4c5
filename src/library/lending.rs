//! Lending facet of an owned book.
//!
//! A book is shelved, recommended, loaned out (which implies recommended) or
//! wished for. The raw flag triple clients submit is only accepted through
//! [`LendingState::from_flags`], so a stored book can never be wished and
//! loaned at once, or loaned without a borrower and a date.

use super::book::BookError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Who holds a loaned book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Borrower {
    /// A registered user, by ID.
    User(String),
    /// Someone known only by name.
    NonUser(String),
}

/// An outstanding loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Who has the book.
    pub borrower: Borrower,
    /// When it was handed over.
    pub date: NaiveDate,
}

/// Lending state of a book the owner physically has (or lent out).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LendingState {
    /// Owned, not offered to friends.
    #[default]
    Shelved,
    /// Owned and offered to friends.
    Recommended,
    /// Recommended and currently lent out.
    Loaned(Loan),
    /// Not owned, on the wish list.
    Wished,
}

/// Flat flag representation, as submitted by clients and stored in the database.
///
/// `borrower` carries a user ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingFlags {
    /// Offered to friends.
    #[serde(default)]
    pub recommended: bool,
    /// On the wish list.
    #[serde(default)]
    pub wished: bool,
    /// Lent out.
    #[serde(default)]
    pub loaned: bool,
    /// Borrowing user ID.
    #[serde(default)]
    pub borrower: Option<String>,
    /// Borrower known only by name.
    #[serde(default)]
    pub borrower_nonuser: Option<String>,
    /// Date of the loan.
    #[serde(default)]
    pub loan_date: Option<NaiveDate>,
}

/// Trim a free-text name, treating blank input as absent.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl LendingState {
    /// Validate a flag set and build the state it describes.
    pub fn from_flags(flags: &LendingFlags) -> Result<Self, BookError> {
        let borrower_user = non_blank(flags.borrower.as_deref());
        let borrower_nonuser = non_blank(flags.borrower_nonuser.as_deref());

        if flags.wished {
            if flags.recommended {
                return Err(BookError::MutuallyExclusiveState(
                    "a book cannot be both recommended and wished",
                ));
            }
            if flags.loaned {
                return Err(BookError::MutuallyExclusiveState(
                    "a wished book cannot be loaned",
                ));
            }
        }

        if flags.loaned {
            let borrower = match (borrower_user, borrower_nonuser) {
                (None, None) => {
                    return Err(BookError::InvalidLoanState("a loaned book needs a borrower"));
                }
                (Some(_), Some(_)) => {
                    return Err(BookError::InvalidLoanState(
                        "a loaned book has exactly one borrower",
                    ));
                }
                (Some(user), None) => Borrower::User(user),
                (None, Some(name)) => Borrower::NonUser(name),
            };
            let Some(date) = flags.loan_date else {
                return Err(BookError::InvalidLoanState("a loaned book needs a loan date"));
            };
            if !flags.recommended {
                return Err(BookError::InvalidLoanState(
                    "only recommended books can be loaned",
                ));
            }
            return Ok(LendingState::Loaned(Loan { borrower, date }));
        }

        if borrower_user.is_some() || borrower_nonuser.is_some() || flags.loan_date.is_some() {
            return Err(BookError::InconsistentClearState);
        }

        Ok(if flags.wished {
            LendingState::Wished
        } else if flags.recommended {
            LendingState::Recommended
        } else {
            LendingState::Shelved
        })
    }

    /// Flatten back into flags.
    pub fn flags(&self) -> LendingFlags {
        match self {
            LendingState::Shelved => LendingFlags::default(),
            LendingState::Recommended => LendingFlags {
                recommended: true,
                ..LendingFlags::default()
            },
            LendingState::Wished => LendingFlags {
                wished: true,
                ..LendingFlags::default()
            },
            LendingState::Loaned(loan) => {
                let (borrower, borrower_nonuser) = match &loan.borrower {
                    Borrower::User(id) => (Some(id.clone()), None),
                    Borrower::NonUser(name) => (None, Some(name.clone())),
                };
                LendingFlags {
                    recommended: true,
                    wished: false,
                    loaned: true,
                    borrower,
                    borrower_nonuser,
                    loan_date: Some(loan.date),
                }
            }
        }
    }

    /// Offered to friends (loaned books stay recommended).
    pub fn is_recommended(&self) -> bool {
        matches!(self, LendingState::Recommended | LendingState::Loaned(_))
    }

    /// On the wish list.
    pub fn is_wished(&self) -> bool {
        matches!(self, LendingState::Wished)
    }

    /// The outstanding loan, if any.
    pub fn loan(&self) -> Option<&Loan> {
        match self {
            LendingState::Loaned(loan) => Some(loan),
            _ => None,
        }
    }

    /// Borrowing user ID, if the book is lent to a registered user.
    pub fn borrower_user(&self) -> Option<&str> {
        match self.loan().map(|l| &l.borrower) {
            Some(Borrower::User(id)) => Some(id),
            _ => None,
        }
    }

    /// Keep a loan on record after the borrowing user leaves, naming them instead.
    ///
    /// Returns whether anything changed.
    pub fn release_user_borrower(&mut self, user_id: &str, username: &str) -> bool {
        match self {
            LendingState::Loaned(Loan { borrower, .. })
                if *borrower == Borrower::User(user_id.to_string()) =>
            {
                *borrower = Borrower::NonUser(username.to_string());
                true
            }
            _ => false,
        }
    }
}
