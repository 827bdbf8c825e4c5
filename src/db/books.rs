//! Book storage.

use crate::db::now_timestamp;
use crate::error::{AppError, Result, storage_error};
use crate::library::{Book, BookDetails, Holding, LendingFlags, LendingState};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::{Deserialize, Serialize};

/// Stored book joined with the names it references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRow {
    /// Book ID.
    pub id: String,
    /// Record keeper's user ID.
    pub owner_id: String,
    /// Record keeper's username.
    pub owner_username: String,
    /// Real owner, when they are not a user.
    pub owner_nonuser: Option<String>,
    /// Author family name.
    pub author_last_name: String,
    /// Author given name.
    pub author_first_name: String,
    /// Title.
    pub title: String,
    /// Genre ID.
    pub genre_id: Option<i64>,
    /// Genre name.
    pub genre_name: Option<String>,
    /// Language ID.
    pub language_id: Option<i64>,
    /// Language name.
    pub language_name: Option<String>,
    /// Offered to friends.
    pub recommended: bool,
    /// On the wish list.
    pub wished: bool,
    /// Lent out.
    pub loaned: bool,
    /// Borrowing user ID.
    pub borrower_id: Option<String>,
    /// Borrowing username.
    pub borrower_username: Option<String>,
    /// Borrower known only by name.
    pub borrower_nonuser: Option<String>,
    /// Loan date, or received date for books of non-users.
    pub loan_date: Option<NaiveDate>,
    /// Comment.
    pub comment: String,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

impl BookRow {
    /// Rebuild the validated entity.
    pub fn into_book(self) -> Result<Book> {
        let holding = match self.owner_nonuser {
            Some(owner_name) => Holding::BorrowedFromNonUser {
                owner_name,
                received: self.loan_date.ok_or_else(|| {
                    AppError::Internal(format!("Stored book {} has no received date", self.id))
                })?,
            },
            None => {
                let flags = LendingFlags {
                    recommended: self.recommended,
                    wished: self.wished,
                    loaned: self.loaned,
                    borrower: self.borrower_id,
                    borrower_nonuser: self.borrower_nonuser,
                    loan_date: self.loan_date,
                };
                let lending = LendingState::from_flags(&flags).map_err(|e| {
                    AppError::Internal(format!("Stored book {} is inconsistent: {}", self.id, e))
                })?;
                Holding::Own { lending }
            }
        };

        Ok(Book {
            id: self.id,
            owner_id: self.owner_id,
            details: BookDetails {
                author_last_name: self.author_last_name,
                author_first_name: self.author_first_name,
                title: self.title,
                genre_id: self.genre_id,
                language_id: self.language_id,
                comment: self.comment,
            },
            holding,
        })
    }
}

/// Which books a listing covers.
#[derive(Debug, Clone)]
pub enum BookFilter {
    /// Books the user owns (excluding books of non-users).
    OwnedBy(String),
    /// The user's recommended books.
    RecommendedBy(String),
    /// The user's loaned books.
    LoanedBy(String),
    /// The user's wish list.
    WishedBy(String),
    /// Books lent to the user.
    BorrowedBy(String),
    /// Books the user holds for non-users.
    FromNonUsersHeldBy(String),
    /// Recommended books of any of these owners.
    RecommendedByAny(Vec<String>),
    /// Wished books of any of these owners.
    WishedByAny(Vec<String>),
}

impl BookFilter {
    fn clause(&self) -> (String, Vec<String>) {
        match self {
            BookFilter::OwnedBy(id) => (
                "b.owner_id = ?1 AND b.owner_nonuser IS NULL".to_string(),
                vec![id.clone()],
            ),
            BookFilter::RecommendedBy(id) => (
                "b.owner_id = ?1 AND b.recommended = 1".to_string(),
                vec![id.clone()],
            ),
            BookFilter::LoanedBy(id) => (
                "b.owner_id = ?1 AND b.loaned = 1".to_string(),
                vec![id.clone()],
            ),
            BookFilter::WishedBy(id) => (
                "b.owner_id = ?1 AND b.wished = 1".to_string(),
                vec![id.clone()],
            ),
            BookFilter::BorrowedBy(id) => ("b.borrower_id = ?1".to_string(), vec![id.clone()]),
            BookFilter::FromNonUsersHeldBy(id) => (
                "b.owner_id = ?1 AND b.owner_nonuser IS NOT NULL".to_string(),
                vec![id.clone()],
            ),
            BookFilter::RecommendedByAny(ids) => (
                format!("b.owner_id IN ({}) AND b.recommended = 1", placeholders(ids.len())),
                ids.clone(),
            ),
            BookFilter::WishedByAny(ids) => (
                format!("b.owner_id IN ({}) AND b.wished = 1", placeholders(ids.len())),
                ids.clone(),
            ),
        }
    }
}

fn placeholders(n: usize) -> String {
    if n == 0 {
        // Matches nothing.
        return "NULL".to_string();
    }
    (1..=n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

const BOOK_SELECT: &str = "SELECT b.id, b.owner_id, o.username, b.owner_nonuser,
        b.author_last_name, b.author_first_name, b.title,
        b.genre_id, g.name, b.language_id, l.name,
        b.recommended, b.wished, b.loaned,
        b.borrower_id, br.username, b.borrower_nonuser, b.loan_date,
        b.comment, b.created_at, b.updated_at
     FROM books b
     JOIN users o ON o.id = b.owner_id
     LEFT JOIN users br ON br.id = b.borrower_id
     LEFT JOIN genres g ON g.id = b.genre_id
     LEFT JOIN languages l ON l.id = b.language_id";

fn row_to_book_row(row: &Row<'_>) -> rusqlite::Result<BookRow> {
    Ok(BookRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        owner_username: row.get(2)?,
        owner_nonuser: row.get(3)?,
        author_last_name: row.get(4)?,
        author_first_name: row.get(5)?,
        title: row.get(6)?,
        genre_id: row.get(7)?,
        genre_name: row.get(8)?,
        language_id: row.get(9)?,
        language_name: row.get(10)?,
        recommended: row.get(11)?,
        wished: row.get(12)?,
        loaned: row.get(13)?,
        borrower_id: row.get(14)?,
        borrower_username: row.get(15)?,
        borrower_nonuser: row.get(16)?,
        loan_date: row.get(17)?,
        comment: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

/// Insert a new book.
pub fn insert_book(conn: &Connection, book: &Book) -> Result<()> {
    let (owner_nonuser, flags) = book.storage_flags();
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO books (id, owner_id, owner_nonuser, author_last_name, author_first_name, title,
                            genre_id, language_id, recommended, wished, loaned,
                            borrower_id, borrower_nonuser, loan_date, comment, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            book.id,
            book.owner_id,
            owner_nonuser,
            book.details.author_last_name,
            book.details.author_first_name,
            book.details.title,
            book.details.genre_id,
            book.details.language_id,
            flags.recommended,
            flags.wished,
            flags.loaned,
            flags.borrower,
            flags.borrower_nonuser,
            flags.loan_date,
            book.details.comment,
            now,
            now,
        ],
    )
    .map_err(storage_error("book"))?;
    Ok(())
}

/// Overwrite a stored book, keeper included.
pub fn update_book(conn: &Connection, book: &Book) -> Result<bool> {
    let (owner_nonuser, flags) = book.storage_flags();
    let rows = conn
        .execute(
            "UPDATE books SET owner_id = ?2, owner_nonuser = ?3, author_last_name = ?4,
                 author_first_name = ?5, title = ?6, genre_id = ?7, language_id = ?8,
                 recommended = ?9, wished = ?10, loaned = ?11, borrower_id = ?12,
                 borrower_nonuser = ?13, loan_date = ?14, comment = ?15, updated_at = ?16
             WHERE id = ?1",
            params![
                book.id,
                book.owner_id,
                owner_nonuser,
                book.details.author_last_name,
                book.details.author_first_name,
                book.details.title,
                book.details.genre_id,
                book.details.language_id,
                flags.recommended,
                flags.wished,
                flags.loaned,
                flags.borrower,
                flags.borrower_nonuser,
                flags.loan_date,
                book.details.comment,
                now_timestamp(),
            ],
        )
        .map_err(storage_error("book"))?;
    Ok(rows > 0)
}

/// Delete a book.
pub fn delete_book(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn
        .execute("DELETE FROM books WHERE id = ?1", params![id])
        .map_err(|e| AppError::Internal(format!("Failed to delete book: {}", e)))?;
    Ok(rows > 0)
}

/// Get a book row by ID.
pub fn get_book_row(conn: &Connection, id: &str) -> Result<Option<BookRow>> {
    conn.query_row(
        &format!("{} WHERE b.id = ?1", BOOK_SELECT),
        params![id],
        row_to_book_row,
    )
    .optional()
    .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
}

/// List book rows matching a filter, in storage order.
pub fn list_book_rows(conn: &Connection, filter: &BookFilter) -> Result<Vec<BookRow>> {
    let (clause, args) = filter.clause();
    let mut stmt = conn
        .prepare(&format!("{} WHERE {}", BOOK_SELECT, clause))
        .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map(params_from_iter(args.iter()), row_to_book_row)
        .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

    Ok(rows)
}

/// Count books matching a filter.
pub fn count_books(conn: &Connection, filter: &BookFilter) -> Result<usize> {
    let (clause, args) = filter.clause();
    conn.query_row(
        &format!("SELECT COUNT(*) FROM books b WHERE {}", clause),
        params_from_iter(args.iter()),
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as usize)
    .map_err(|e| AppError::Internal(format!("Failed to count books: {}", e)))
}

/// Load validated books matching a filter.
pub fn load_books(conn: &Connection, filter: &BookFilter) -> Result<Vec<Book>> {
    list_book_rows(conn, filter)?
        .into_iter()
        .map(BookRow::into_book)
        .collect()
}

/// Books the user owns that are lent to another user.
pub fn load_books_lent_to_users(conn: &Connection, owner_id: &str) -> Result<Vec<Book>> {
    let mut stmt = conn
        .prepare(&format!(
            "{} WHERE b.owner_id = ?1 AND b.borrower_id IS NOT NULL",
            BOOK_SELECT
        ))
        .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map(params![owner_id], row_to_book_row)
        .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

    rows.into_iter().map(BookRow::into_book).collect()
}
