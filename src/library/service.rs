//! Book operations on behalf of a user.

use super::book::{Book, BookDetails, Holding};
use super::lending::{LendingFlags, non_blank};
use crate::db::{self, BookRow, Database, User, books as store, friends as friend_store};
use crate::error::{AppError, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Input for a book the user owns.
///
/// `borrower` names a user by username.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookForm {
    /// Descriptive fields.
    #[serde(flatten)]
    pub details: BookDetails,
    /// Offered to friends.
    #[serde(default)]
    pub recommended: bool,
    /// On the wish list.
    #[serde(default)]
    pub wished: bool,
    /// Lent out.
    #[serde(default)]
    pub loaned: bool,
    /// Borrowing user's username.
    #[serde(default)]
    pub borrower: Option<String>,
    /// Borrower known only by name.
    #[serde(default)]
    pub borrower_nonuser: Option<String>,
    /// Date of the loan.
    #[serde(default)]
    pub loan_date: Option<NaiveDate>,
}

/// Input for a book borrowed from someone who is not a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonUserBookForm {
    /// Name of the real owner.
    pub owner_nonuser: String,
    /// Descriptive fields.
    #[serde(flatten)]
    pub details: BookDetails,
    /// When the book was received.
    pub received: NaiveDate,
}

/// Book service.
pub struct BookService {
    db: Database,
}

fn check_references(conn: &Connection, details: &BookDetails) -> Result<()> {
    if let Some(id) = details.genre_id
        && !db::genre_exists(conn, id)?
    {
        return Err(AppError::NotFound(format!("Genre not found: {}", id)));
    }
    if let Some(id) = details.language_id
        && !db::language_exists(conn, id)?
    {
        return Err(AppError::NotFound(format!("Language not found: {}", id)));
    }
    Ok(())
}

/// Resolve the form's borrower and validate the lending state.
fn owned_holding(conn: &Connection, owner: &User, form: &BookForm) -> Result<Holding> {
    let borrower = match non_blank(form.borrower.as_deref()) {
        Some(username) => Some(
            db::find_user_by_username(conn, &username)?
                .ok_or_else(|| AppError::NotFound(format!("User not found: {}", username)))?
                .id,
        ),
        None => None,
    };

    let holding = Holding::owned(&LendingFlags {
        recommended: form.recommended,
        wished: form.wished,
        loaned: form.loaned,
        borrower,
        borrower_nonuser: form.borrower_nonuser.clone(),
        loan_date: form.loan_date,
    })?;

    if let Holding::Own { lending } = &holding
        && let Some(borrower_id) = lending.borrower_user()
    {
        if borrower_id == owner.id {
            return Err(AppError::InvalidTarget(
                "You cannot lend a book to yourself".to_string(),
            ));
        }
        if friend_store::find_friendship(conn, &owner.id, borrower_id)?.is_none() {
            return Err(AppError::InvalidTarget(
                "Books can only be lent to friends".to_string(),
            ));
        }
    }

    Ok(holding)
}

fn load_owned(conn: &Connection, owner: &User, id: &str) -> Result<Book> {
    let row = store::get_book_row(conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))?;
    if row.owner_id != owner.id {
        return Err(AppError::PermissionDenied(
            "Only the owner can change this book".to_string(),
        ));
    }
    row.into_book()
}

fn reload(conn: &Connection, id: &str) -> Result<BookRow> {
    store::get_book_row(conn, id)?
        .ok_or_else(|| AppError::Internal(format!("Book {} vanished after write", id)))
}

impl BookService {
    /// Create a new book service.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add a book the user owns.
    pub fn create_book(&self, owner: &User, form: BookForm) -> Result<BookRow> {
        self.db.transaction(|tx| {
            let holding = owned_holding(tx, owner, &form)?;
            let book = Book::new(&owner.id, form.details, holding)?;
            check_references(tx, &book.details)?;
            store::insert_book(tx, &book)?;

            tracing::info!(owner = %owner.username, book = %book.id, "Book added");
            reload(tx, &book.id)
        })
    }

    /// Add a book the user holds for a non-user.
    pub fn create_nonuser_book(&self, keeper: &User, form: NonUserBookForm) -> Result<BookRow> {
        self.db.transaction(|tx| {
            let holding = Holding::from_nonuser(&form.owner_nonuser, form.received)?;
            let book = Book::new(&keeper.id, form.details, holding)?;
            check_references(tx, &book.details)?;
            store::insert_book(tx, &book)?;

            tracing::info!(keeper = %keeper.username, book = %book.id, "Non-user book added");
            reload(tx, &book.id)
        })
    }

    /// Replace the fields of a book the user owns.
    pub fn update_book(&self, owner: &User, id: &str, form: BookForm) -> Result<BookRow> {
        self.db.transaction(|tx| {
            let mut book = load_owned(tx, owner, id)?;
            if book.is_from_nonuser() {
                return Err(AppError::InvalidTarget(
                    "This book belongs to a non-user".to_string(),
                ));
            }

            book.holding = owned_holding(tx, owner, &form)?;
            book.details = form.details.normalized()?;
            check_references(tx, &book.details)?;
            store::update_book(tx, &book)?;

            tracing::info!(owner = %owner.username, book = %book.id, "Book updated");
            reload(tx, &book.id)
        })
    }

    /// Replace the fields of a book the user holds for a non-user.
    pub fn update_nonuser_book(
        &self,
        keeper: &User,
        id: &str,
        form: NonUserBookForm,
    ) -> Result<BookRow> {
        self.db.transaction(|tx| {
            let mut book = load_owned(tx, keeper, id)?;
            if !book.is_from_nonuser() {
                return Err(AppError::InvalidTarget(
                    "This book is not held for a non-user".to_string(),
                ));
            }

            book.holding = Holding::from_nonuser(&form.owner_nonuser, form.received)?;
            book.details = form.details.normalized()?;
            check_references(tx, &book.details)?;
            store::update_book(tx, &book)?;

            tracing::info!(keeper = %keeper.username, book = %book.id, "Non-user book updated");
            reload(tx, &book.id)
        })
    }

    /// Delete a book the user keeps.
    pub fn delete_book(&self, owner: &User, id: &str) -> Result<()> {
        self.db.transaction(|tx| {
            load_owned(tx, owner, id)?;
            store::delete_book(tx, id)?;
            tracing::info!(owner = %owner.username, book = %id, "Book deleted");
            Ok(())
        })
    }

    /// Book detail, visible to its keeper, its borrower and the keeper's friends.
    pub fn get_book(&self, viewer: &User, id: &str) -> Result<BookRow> {
        self.db.read(|conn| {
            let row = store::get_book_row(conn, id)?
                .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))?;

            let visible = row.owner_id == viewer.id
                || row.borrower_id.as_deref() == Some(viewer.id.as_str())
                || friend_store::find_friendship(conn, &row.owner_id, &viewer.id)?.is_some();
            if !visible {
                return Err(AppError::PermissionDenied(
                    "You cannot see this book".to_string(),
                ));
            }
            Ok(row)
        })
    }
}
