//! Re-homing of loaned books when a user leaves.

use crate::db::{User, books as store, books::BookFilter};
use crate::error::Result;
use rusqlite::Connection;
use serde::Serialize;

/// What a departure changed before the user row went away.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Departure {
    /// Books the user had borrowed, now recorded as lent to them by name.
    pub released: usize,
    /// Books the user had lent to users, now kept by their borrowers.
    pub handed_over: usize,
}

/// Rewrite every loan the departing user takes part in.
///
/// Must run in the same transaction that deletes the user.
pub(crate) fn settle_loans(conn: &Connection, user: &User) -> Result<Departure> {
    let mut departure = Departure::default();

    for mut book in store::load_books(conn, &BookFilter::BorrowedBy(user.id.clone()))? {
        if book.release_departed_borrower(&user.id, &user.username) {
            store::update_book(conn, &book)?;
            departure.released += 1;
        }
    }

    for mut book in store::load_books_lent_to_users(conn, &user.id)? {
        if let Some(keeper) = book.settle_for_departed_owner(&user.username) {
            store::update_book(conn, &book)?;
            tracing::debug!(book = %book.id, keeper = %keeper, "Book handed over to borrower");
            departure.handed_over += 1;
        }
    }

    Ok(departure)
}
