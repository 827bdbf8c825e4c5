//! Read-only book listings, collated and paginated.

use crate::collation::{Collation, Collator};
use crate::db::{
    self, BookRow, Database, User,
    books::{self as store, BookFilter},
    friends as friend_store,
};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// 1-based page number.
    pub page: usize,
    /// Configured page size.
    pub page_size: usize,
    /// Items across all pages.
    pub total: usize,
    /// Number of pages.
    pub pages: usize,
}

impl<T> Page<T> {
    /// Cut page `page` out of a sorted listing. Page 0 is treated as page 1.
    pub fn paginate(items: Vec<T>, page: usize, page_size: usize) -> Self {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total = items.len();
        let pages = total.div_ceil(page_size);
        let start = (page - 1).saturating_mul(page_size);

        let items = items.into_iter().skip(start).take(page_size).collect();
        Self {
            items,
            page,
            page_size,
            total,
            pages,
        }
    }
}

/// Order of the friends' recommended listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedSort {
    /// By owner username.
    #[default]
    Owner,
    /// By author.
    Author,
    /// By language name.
    Language,
    /// By genre name.
    Genre,
}

/// Order of the friends' wished listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WishedSort {
    /// By owner username.
    #[default]
    Owner,
    /// By author.
    Author,
}

/// Books the user has borrowed.
#[derive(Debug, Clone, Serialize)]
pub struct BorrowedBooks {
    /// Lent by other users.
    pub from_users: Page<BookRow>,
    /// Held for non-users.
    pub from_nonusers: Page<BookRow>,
}

/// Dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HomeStats {
    /// Books the user owns.
    pub books: usize,
    /// Of those, lent out.
    pub loaned: usize,
    /// Borrowed from users.
    pub borrowed: usize,
    /// Held for non-users.
    pub borrowed_from_nonusers: usize,
    /// Friends.
    pub friends: usize,
    /// Requests the user sent.
    pub outgoing_requests: usize,
    /// Requests the user received.
    pub incoming_requests: usize,
    /// Rejections not yet dismissed.
    pub unread_rejections: usize,
}

fn by_author(c: &mut Collation<'_>, a: &BookRow, b: &BookRow) -> Ordering {
    c.compare_fields(
        &[
            a.author_last_name.as_str(),
            a.author_first_name.as_str(),
            a.title.as_str(),
        ],
        &[
            b.author_last_name.as_str(),
            b.author_first_name.as_str(),
            b.title.as_str(),
        ],
    )
}

fn by_owner(c: &mut Collation<'_>, a: &BookRow, b: &BookRow) -> Ordering {
    c.compare(&a.owner_username, &b.owner_username)
        .then_with(|| by_author(c, a, b))
}

/// Listing service.
pub struct Catalog {
    db: Database,
    collator: &'static Collator,
    page_size: usize,
}

impl Catalog {
    /// Create a new catalog.
    pub fn new(db: Database, collator: &'static Collator, page_size: usize) -> Self {
        Self {
            db,
            collator,
            page_size,
        }
    }

    fn by_author(&self, filter: BookFilter, page: usize) -> Result<Page<BookRow>> {
        let mut rows = self.db.read(|conn| store::list_book_rows(conn, &filter))?;
        self.collator.sort_by(&mut rows, by_author);
        Ok(Page::paginate(rows, page, self.page_size))
    }

    /// Books the user owns, excluding those held for non-users.
    pub fn my_books(&self, user: &User, page: usize) -> Result<Page<BookRow>> {
        self.by_author(BookFilter::OwnedBy(user.id.clone()), page)
    }

    /// The user's recommended books.
    pub fn my_recommended(&self, user: &User, page: usize) -> Result<Page<BookRow>> {
        self.by_author(BookFilter::RecommendedBy(user.id.clone()), page)
    }

    /// The user's loaned books.
    pub fn my_loaned(&self, user: &User, page: usize) -> Result<Page<BookRow>> {
        self.by_author(BookFilter::LoanedBy(user.id.clone()), page)
    }

    /// The user's wish list.
    pub fn my_wished(&self, user: &User, page: usize) -> Result<Page<BookRow>> {
        self.by_author(BookFilter::WishedBy(user.id.clone()), page)
    }

    /// Books lent to the user and books the user holds for non-users.
    pub fn borrowed(&self, user: &User, page: usize) -> Result<BorrowedBooks> {
        Ok(BorrowedBooks {
            from_users: self.by_author(BookFilter::BorrowedBy(user.id.clone()), page)?,
            from_nonusers: self
                .by_author(BookFilter::FromNonUsersHeldBy(user.id.clone()), page)?,
        })
    }

    /// Recommended books of all the user's friends.
    pub fn friends_recommended(
        &self,
        user: &User,
        sort: RecommendedSort,
        page: usize,
    ) -> Result<Page<BookRow>> {
        let mut rows = self.db.read(|conn| {
            let ids = friend_store::friend_ids(conn, &user.id)?;
            store::list_book_rows(conn, &BookFilter::RecommendedByAny(ids))
        })?;

        let c = self.collator;
        match sort {
            RecommendedSort::Owner => c.sort_by(&mut rows, by_owner),
            RecommendedSort::Author => c.sort_by(&mut rows, by_author),
            RecommendedSort::Language => c.sort_by(&mut rows, |c, a, b| {
                c.compare_optional(a.language_name.as_deref(), b.language_name.as_deref())
                    .then_with(|| by_author(c, a, b))
            }),
            RecommendedSort::Genre => c.sort_by(&mut rows, |c, a, b| {
                c.compare_optional(a.genre_name.as_deref(), b.genre_name.as_deref())
                    .then_with(|| by_author(c, a, b))
            }),
        }
        Ok(Page::paginate(rows, page, self.page_size))
    }

    /// Wished books of all the user's friends.
    pub fn friends_wished(
        &self,
        user: &User,
        sort: WishedSort,
        page: usize,
    ) -> Result<Page<BookRow>> {
        let mut rows = self.db.read(|conn| {
            let ids = friend_store::friend_ids(conn, &user.id)?;
            store::list_book_rows(conn, &BookFilter::WishedByAny(ids))
        })?;

        match sort {
            WishedSort::Owner => self.collator.sort_by(&mut rows, by_owner),
            WishedSort::Author => self.collator.sort_by(&mut rows, by_author),
        }
        Ok(Page::paginate(rows, page, self.page_size))
    }

    fn friend_id(&self, user: &User, username: &str) -> Result<String> {
        self.db.read(|conn| {
            let friend = db::find_user_by_username(conn, username)?
                .ok_or_else(|| AppError::NotFound(format!("User not found: {}", username)))?;
            if friend_store::find_friendship(conn, &user.id, &friend.id)?.is_none() {
                return Err(AppError::PermissionDenied(format!(
                    "You are not friends with {}",
                    friend.username
                )));
            }
            Ok(friend.id)
        })
    }

    /// Recommended books of one friend.
    pub fn friend_recommended(
        &self,
        user: &User,
        username: &str,
        page: usize,
    ) -> Result<Page<BookRow>> {
        let id = self.friend_id(user, username)?;
        self.by_author(BookFilter::RecommendedBy(id), page)
    }

    /// Wish list of one friend.
    pub fn friend_wished(&self, user: &User, username: &str, page: usize) -> Result<Page<BookRow>> {
        let id = self.friend_id(user, username)?;
        self.by_author(BookFilter::WishedBy(id), page)
    }

    /// Dashboard counters for the user.
    pub fn home_stats(&self, user: &User) -> Result<HomeStats> {
        let id = &user.id;
        self.db.read(|conn| {
            Ok(HomeStats {
                books: store::count_books(conn, &BookFilter::OwnedBy(id.clone()))?,
                loaned: store::count_books(conn, &BookFilter::LoanedBy(id.clone()))?,
                borrowed: store::count_books(conn, &BookFilter::BorrowedBy(id.clone()))?,
                borrowed_from_nonusers: store::count_books(
                    conn,
                    &BookFilter::FromNonUsersHeldBy(id.clone()),
                )?,
                friends: friend_store::friend_ids(conn, id)?.len(),
                outgoing_requests: friend_store::outgoing_requests(conn, id)?.len(),
                incoming_requests: friend_store::incoming_requests(conn, id)?.len(),
                unread_rejections: friend_store::unread_rejections(conn, id)?.len(),
            })
        })
    }
}
