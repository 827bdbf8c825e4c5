//! Books and their lending state.

pub mod book;
mod departure;
pub mod lending;
mod service;

pub use book::{Book, BookDetails, BookError, Holding};
pub use departure::Departure;
pub(crate) use departure::settle_loans;
pub use lending::{Borrower, LendingFlags, LendingState, Loan};
pub use service::{BookForm, BookService, NonUserBookForm};
