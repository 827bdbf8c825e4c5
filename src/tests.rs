use crate::auth::{AuthService, ProfileUpdate, Registration};
use crate::catalog::{Catalog, RecommendedSort, WishedSort};
use crate::collation::Collator;
use crate::config::Config;
use crate::db::friends as friend_store;
use crate::db::{BookRow, Database, DEFAULT_PROFILE_IMAGE, Session, User, now_timestamp};
use crate::error::AppError;
use crate::friends::{FriendService, NotificationAction, NotificationOutcome};
use crate::library::{BookDetails, BookError, BookForm, BookService, NonUserBookForm};
use chrono::NaiveDate;

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn create_user(db: &Database, id: &str, username: &str) -> User {
    let user = User {
        id: id.to_string(),
        username: username.to_string(),
        password_hash: "hash".to_string(),
        first_name: None,
        last_name: None,
        role: "user".to_string(),
        created_at: now_timestamp(),
        last_login: None,
    };
    db.create_user(&user).unwrap();
    user
}

fn friend_service(db: &Database) -> FriendService {
    FriendService::new(db.clone(), Collator::shared())
}

fn befriend(friends: &FriendService, a: &User, b: &User) {
    friends.request_friend(a, &b.username).unwrap();
    friends.confirm_request(b, &a.username).unwrap();
}

fn details(last: &str, first: &str, title: &str) -> BookDetails {
    BookDetails {
        author_last_name: last.to_string(),
        author_first_name: first.to_string(),
        title: title.to_string(),
        ..BookDetails::default()
    }
}

fn form(last: &str, title: &str) -> BookForm {
    BookForm {
        details: details(last, "Ferenc", title),
        ..BookForm::default()
    }
}

fn recommended(last: &str, title: &str) -> BookForm {
    BookForm {
        recommended: true,
        ..form(last, title)
    }
}

fn loan_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
}

fn lent_to(borrower: &str, last: &str, title: &str) -> BookForm {
    BookForm {
        loaned: true,
        borrower: Some(borrower.to_string()),
        loan_date: Some(loan_date()),
        ..recommended(last, title)
    }
}

fn titles(rows: &[BookRow]) -> Vec<&str> {
    rows.iter().map(|r| r.title.as_str()).collect()
}

// ========== DATABASE ==========

#[test]
fn db_create_and_get_user() {
    let db = test_db();
    let user = User {
        id: "user-1".to_string(),
        username: "alice".to_string(),
        password_hash: "hash".to_string(),
        first_name: Some("Alice".to_string()),
        last_name: Some("Kovács".to_string()),
        role: "user".to_string(),
        created_at: now_timestamp(),
        last_login: None,
    };

    db.create_user(&user).unwrap();

    let found = db.get_user_by_username("alice").unwrap().unwrap();
    assert_eq!(found.id, "user-1");
    assert_eq!(found.last_name.as_deref(), Some("Kovács"));
    assert_eq!(found.label(), "alice (Kovács Alice)");

    let profile = db.get_profile("user-1").unwrap().unwrap();
    assert_eq!(profile.image, DEFAULT_PROFILE_IMAGE);
}

#[test]
fn db_duplicate_username_fails() {
    let db = test_db();
    create_user(&db, "user-1", "alice");

    let twin = User {
        id: "user-2".to_string(),
        ..db.get_user_by_username("alice").unwrap().unwrap()
    };
    assert!(matches!(db.create_user(&twin), Err(AppError::Conflict(_))));
}

#[test]
fn db_create_and_delete_session() {
    let db = test_db();
    create_user(&db, "user-1", "testuser");

    let session = Session {
        token: "token123".to_string(),
        user_id: "user-1".to_string(),
        expires_at: now_timestamp() + 3600,
    };

    db.create_session(&session).unwrap();
    assert_eq!(db.get_session("token123").unwrap().unwrap().user_id, "user-1");

    db.delete_session("token123").unwrap();
    assert!(db.get_session("token123").unwrap().is_none());
}

#[test]
fn db_expired_sessions_cleanup() {
    let db = test_db();
    create_user(&db, "user-1", "testuser");

    let expired = Session {
        token: "expired".to_string(),
        user_id: "user-1".to_string(),
        expires_at: now_timestamp() - 3600,
    };
    let valid = Session {
        token: "valid".to_string(),
        user_id: "user-1".to_string(),
        expires_at: now_timestamp() + 3600,
    };

    db.create_session(&expired).unwrap();
    db.create_session(&valid).unwrap();

    assert_eq!(db.cleanup_expired_sessions().unwrap(), 1);

    assert!(db.get_session("expired").unwrap().is_none());
    assert!(db.get_session("valid").unwrap().is_some());
}

#[test]
fn db_genres_and_languages() {
    let db = test_db();
    db.create_genre("Regény").unwrap();
    db.create_genre("Dráma").unwrap();
    db.create_language("magyar").unwrap();

    let names: Vec<String> = db.list_genres().unwrap().into_iter().map(|g| g.name).collect();
    assert_eq!(names, vec!["Dráma", "Regény"]);
    assert_eq!(db.list_languages().unwrap().len(), 1);

    assert!(matches!(db.create_genre("Dráma"), Err(AppError::Conflict(_))));
}

#[test]
fn db_file_backed_database_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("bookfriends.db");

    {
        let db = Database::open(&path).unwrap();
        create_user(&db, "user-1", "alice");
    }

    let db = Database::open(&path).unwrap();
    assert!(db.get_user_by_username("alice").unwrap().is_some());
}

// ========== FRIENDSHIPS ==========

#[test]
fn friends_request_is_unique_per_pair() {
    let db = test_db();
    let friends = friend_service(&db);
    let a = create_user(&db, "a", "anna");
    let b = create_user(&db, "b", "bela");

    friends.request_friend(&a, "bela").unwrap();

    assert!(matches!(
        friends.request_friend(&a, "bela"),
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        friends.request_friend(&b, "anna"),
        Err(AppError::Conflict(_))
    ));

    assert_eq!(friends.outgoing_requests(&a).unwrap().len(), 1);
    assert_eq!(friends.incoming_requests(&b).unwrap().len(), 1);
    assert_eq!(friends.incoming_requests(&b).unwrap()[0].username, "anna");
    assert!(friends.outgoing_requests(&b).unwrap().is_empty());
}

#[test]
fn friends_request_targets() {
    let db = test_db();
    let friends = friend_service(&db);
    let a = create_user(&db, "a", "anna");

    assert!(matches!(
        friends.request_friend(&a, "anna"),
        Err(AppError::InvalidTarget(_))
    ));
    assert!(matches!(
        friends.request_friend(&a, "nobody"),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn friends_confirm_creates_one_friendship() {
    let db = test_db();
    let friends = friend_service(&db);
    let a = create_user(&db, "a", "anna");
    let b = create_user(&db, "b", "bela");

    friends.request_friend(&a, "bela").unwrap();
    let friendship = friends.confirm_request(&b, "anna").unwrap();
    assert_eq!(friendship.confirmed_user_id, "a");
    assert_eq!(friendship.requested_user_id, "b");

    assert!(friends.are_friends("a", "b").unwrap());
    assert!(friends.are_friends("b", "a").unwrap());
    assert!(friends.outgoing_requests(&a).unwrap().is_empty());
    assert!(friends.incoming_requests(&b).unwrap().is_empty());

    assert!(matches!(
        friends.confirm_request(&b, "anna"),
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        friends.request_friend(&b, "anna"),
        Err(AppError::Conflict(_))
    ));
}

#[test]
fn friends_reject_leaves_one_notice() {
    let db = test_db();
    let friends = friend_service(&db);
    let a = create_user(&db, "a", "anna");
    let b = create_user(&db, "b", "bela");

    friends.request_friend(&a, "bela").unwrap();
    friends.reject_request(&b, "anna").unwrap();

    assert!(friends.outgoing_requests(&a).unwrap().is_empty());
    assert!(friends.incoming_requests(&b).unwrap().is_empty());
    assert!(!friends.are_friends("a", "b").unwrap());

    let notices = friends.unread_rejections(&a).unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].username, "bela");
    assert!(friends.unread_rejections(&b).unwrap().is_empty());

    assert_eq!(friends.acknowledge_rejection(&a, "bela").unwrap(), 1);
    assert!(friends.unread_rejections(&a).unwrap().is_empty());
    assert!(matches!(
        friends.acknowledge_rejection(&a, "bela"),
        Err(AppError::NotFound(_))
    ));

    // A rejection does not stop a new request.
    friends.request_friend(&a, "bela").unwrap();
}

#[test]
fn friends_withdraw_request() {
    let db = test_db();
    let friends = friend_service(&db);
    let a = create_user(&db, "a", "anna");
    let b = create_user(&db, "b", "bela");

    friends.request_friend(&a, "bela").unwrap();

    assert!(matches!(
        friends.withdraw_request(&b, "anna"),
        Err(AppError::NotFound(_))
    ));
    friends.withdraw_request(&a, "bela").unwrap();
    assert!(friends.incoming_requests(&b).unwrap().is_empty());
    assert!(matches!(
        friends.withdraw_request(&a, "bela"),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn friends_remove_twice() {
    let db = test_db();
    let friends = friend_service(&db);
    let a = create_user(&db, "a", "anna");
    let b = create_user(&db, "b", "bela");
    let c = create_user(&db, "c", "csaba");
    let d = create_user(&db, "d", "dora");

    befriend(&friends, &a, &b);
    befriend(&friends, &c, &d);

    friends.remove_friendship(&b, "anna").unwrap();
    assert!(!friends.are_friends("a", "b").unwrap());
    assert!(matches!(
        friends.remove_friendship(&a, "bela"),
        Err(AppError::NotFound(_))
    ));

    assert!(friends.are_friends("c", "d").unwrap());
}

#[test]
fn friends_end_to_end() {
    let db = test_db();
    let friends = friend_service(&db);
    let a = create_user(&db, "a", "anna");
    let b = create_user(&db, "b", "bela");
    let c = create_user(&db, "c", "csaba");

    friends.request_friend(&a, "bela").unwrap();
    friends.request_friend(&a, "csaba").unwrap();
    friends.confirm_request(&b, "anna").unwrap();
    friends.reject_request(&c, "anna").unwrap();

    let list = friends.list_friends(&a).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].username, "bela");

    assert!(friends.outgoing_requests(&a).unwrap().is_empty());

    let notices = friends.unread_rejections(&a).unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].username, "csaba");
}

#[test]
fn friends_notifications_dispatch() {
    let db = test_db();
    let friends = friend_service(&db);
    let a = create_user(&db, "a", "anna");
    let b = create_user(&db, "b", "bela");

    friends.request_friend(&a, "bela").unwrap();
    let outcome = friends
        .handle_notification(&b, &NotificationAction::Reject("anna".to_string()))
        .unwrap();
    assert!(matches!(outcome, NotificationOutcome::Rejected { .. }));

    let outcome = friends
        .handle_notification(
            &a,
            &NotificationAction::AcknowledgeRejection("bela".to_string()),
        )
        .unwrap();
    assert!(matches!(outcome, NotificationOutcome::Acknowledged { count: 1 }));

    assert!(matches!(
        friends.handle_notification(&b, &NotificationAction::Confirm("anna".to_string())),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn friends_candidates_and_listing_order() {
    let db = test_db();
    let friends = friend_service(&db);
    let me = create_user(&db, "me", "me");
    let zoltan = create_user(&db, "z", "Zoltán");
    let odon = create_user(&db, "o", "Ödön");
    let pal = create_user(&db, "p", "Pál");
    let oszkar = create_user(&db, "q", "Oszkár");
    create_user(&db, "r", "Rita");
    let sara = create_user(&db, "s", "Sára");
    create_user(&db, "l", "Łukasz");

    befriend(&friends, &me, &zoltan);
    befriend(&friends, &odon, &me);
    befriend(&friends, &pal, &oszkar);
    friends.request_friend(&me, "Rita").unwrap();
    friends.request_friend(&sara, "me").unwrap();

    let names: Vec<String> = friends
        .list_friends(&me)
        .unwrap()
        .into_iter()
        .map(|f| f.username)
        .collect();
    assert_eq!(names, vec!["Ödön", "Zoltán"]);

    let candidates: Vec<String> = friends
        .candidates(&me)
        .unwrap()
        .into_iter()
        .map(|c| c.username)
        .collect();
    assert_eq!(candidates, vec!["Łukasz", "Oszkár", "Pál"]);
}

#[test]
fn friends_pair_uniqueness_is_enforced_by_storage() {
    let db = test_db();
    create_user(&db, "a", "anna");
    create_user(&db, "b", "bela");

    db.transaction(|tx| friend_store::insert_request(tx, "a", "b"))
        .unwrap();
    assert!(matches!(
        db.transaction(|tx| friend_store::insert_request(tx, "b", "a")),
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        db.transaction(|tx| friend_store::insert_request(tx, "a", "b")),
        Err(AppError::Conflict(_))
    ));

    db.transaction(|tx| friend_store::insert_friendship(tx, "a", "b"))
        .unwrap();
    assert!(matches!(
        db.transaction(|tx| friend_store::insert_friendship(tx, "b", "a")),
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        db.transaction(|tx| friend_store::insert_friendship(tx, "a", "b")),
        Err(AppError::Conflict(_))
    ));
}

// ========== BOOKS ==========

#[test]
fn books_invalid_lending_is_rejected() {
    let db = test_db();
    let books = BookService::new(db.clone());
    let a = create_user(&db, "a", "anna");

    let no_borrower = BookForm {
        loaned: true,
        loan_date: Some(loan_date()),
        ..recommended("Ottlik", "Iskola a határon")
    };
    assert!(matches!(
        books.create_book(&a, no_borrower),
        Err(AppError::Validation(BookError::InvalidLoanState(_)))
    ));

    let not_recommended = BookForm {
        recommended: false,
        borrower_nonuser: Some("Aunt Mary".to_string()),
        ..lent_to("", "Ottlik", "Iskola a határon")
    };
    assert!(matches!(
        books.create_book(&a, not_recommended),
        Err(AppError::Validation(BookError::InvalidLoanState(_)))
    ));

    let wished_and_recommended = BookForm {
        wished: true,
        ..recommended("Ottlik", "Iskola a határon")
    };
    assert!(matches!(
        books.create_book(&a, wished_and_recommended),
        Err(AppError::Validation(BookError::MutuallyExclusiveState(_)))
    ));

    assert!(matches!(
        books.create_book(&a, form("", "No author")),
        Err(AppError::Validation(BookError::EmptyField(_)))
    ));

    let mut no_first_name = form("Ottlik", "Iskola a határon");
    no_first_name.details.author_first_name = String::new();
    assert!(matches!(
        books.create_book(&a, no_first_name),
        Err(AppError::Validation(BookError::EmptyField("author_first_name")))
    ));
}

#[test]
fn books_user_borrower_must_be_a_friend() {
    let db = test_db();
    let friends = friend_service(&db);
    let books = BookService::new(db.clone());
    let a = create_user(&db, "a", "anna");
    let b = create_user(&db, "b", "bela");
    create_user(&db, "c", "csaba");
    befriend(&friends, &a, &b);

    assert!(matches!(
        books.create_book(&a, lent_to("csaba", "Ottlik", "Iskola a határon")),
        Err(AppError::InvalidTarget(_))
    ));
    assert!(matches!(
        books.create_book(&a, lent_to("anna", "Ottlik", "Iskola a határon")),
        Err(AppError::InvalidTarget(_))
    ));
    assert!(matches!(
        books.create_book(&a, lent_to("nobody", "Ottlik", "Iskola a határon")),
        Err(AppError::NotFound(_))
    ));

    let row = books
        .create_book(&a, lent_to("bela", "Ottlik", "Iskola a határon"))
        .unwrap();
    assert!(row.loaned && row.recommended);
    assert_eq!(row.borrower_id.as_deref(), Some("b"));
    assert_eq!(row.borrower_username.as_deref(), Some("bela"));
    assert_eq!(row.loan_date, Some(loan_date()));
}

#[test]
fn books_nonuser_borrower() {
    let db = test_db();
    let books = BookService::new(db.clone());
    let a = create_user(&db, "a", "anna");

    let lent = BookForm {
        borrower: None,
        borrower_nonuser: Some("  Aunt Mary ".to_string()),
        ..lent_to("", "Szabó", "Az ajtó")
    };
    let row = books.create_book(&a, lent).unwrap();
    assert_eq!(row.borrower_nonuser.as_deref(), Some("Aunt Mary"));
    assert_eq!(row.borrower_id, None);

    // Returning the book clears the loan.
    let returned = books
        .update_book(&a, &row.id, recommended("Szabó", "Az ajtó"))
        .unwrap();
    assert!(returned.recommended && !returned.loaned);
    assert_eq!(returned.borrower_nonuser, None);
    assert_eq!(returned.loan_date, None);
}

#[test]
fn books_only_owner_may_change() {
    let db = test_db();
    let friends = friend_service(&db);
    let books = BookService::new(db.clone());
    let a = create_user(&db, "a", "anna");
    let b = create_user(&db, "b", "bela");
    befriend(&friends, &a, &b);

    let row = books.create_book(&a, form("Móricz", "Légy jó mindhalálig")).unwrap();

    assert!(matches!(
        books.update_book(&b, &row.id, form("Móricz", "Hijacked")),
        Err(AppError::PermissionDenied(_))
    ));
    assert!(matches!(
        books.delete_book(&b, &row.id),
        Err(AppError::PermissionDenied(_))
    ));
    assert!(matches!(
        books.delete_book(&a, "missing"),
        Err(AppError::NotFound(_))
    ));

    books.delete_book(&a, &row.id).unwrap();
    assert!(matches!(
        books.get_book(&a, &row.id),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn books_detail_visibility() {
    let db = test_db();
    let friends = friend_service(&db);
    let books = BookService::new(db.clone());
    let a = create_user(&db, "a", "anna");
    let b = create_user(&db, "b", "bela");
    let c = create_user(&db, "c", "csaba");
    befriend(&friends, &a, &b);

    let row = books
        .create_book(&a, lent_to("bela", "Kosztolányi", "Édes Anna"))
        .unwrap();

    assert!(books.get_book(&a, &row.id).is_ok());
    assert!(books.get_book(&b, &row.id).is_ok());
    assert!(matches!(
        books.get_book(&c, &row.id),
        Err(AppError::PermissionDenied(_))
    ));

    // The borrower keeps access after the friendship ends.
    friends.remove_friendship(&a, "bela").unwrap();
    assert!(books.get_book(&b, &row.id).is_ok());
}

#[test]
fn books_unknown_genre_is_not_found() {
    let db = test_db();
    let books = BookService::new(db.clone());
    let a = create_user(&db, "a", "anna");
    let genre = db.create_genre("Regény").unwrap();

    let mut unknown = form("Jókai", "Az arany ember");
    unknown.details.genre_id = Some(genre.id + 100);
    assert!(matches!(
        books.create_book(&a, unknown),
        Err(AppError::NotFound(_))
    ));

    let mut known = form("Jókai", "Az arany ember");
    known.details.genre_id = Some(genre.id);
    let row = books.create_book(&a, known).unwrap();
    assert_eq!(row.genre_name.as_deref(), Some("Regény"));
}

#[test]
fn books_nonuser_owner_kind_is_preserved() {
    let db = test_db();
    let books = BookService::new(db.clone());
    let a = create_user(&db, "a", "anna");

    let held = NonUserBookForm {
        owner_nonuser: "Uncle Joe".to_string(),
        details: details("Petőfi", "Sándor", "János vitéz"),
        received: loan_date(),
    };
    let row = books.create_nonuser_book(&a, held.clone()).unwrap();
    assert_eq!(row.owner_nonuser.as_deref(), Some("Uncle Joe"));
    assert_eq!(row.loan_date, Some(loan_date()));
    assert!(!row.recommended && !row.loaned && !row.wished);

    assert!(matches!(
        books.update_book(&a, &row.id, form("Petőfi", "János vitéz")),
        Err(AppError::InvalidTarget(_))
    ));

    let renamed = NonUserBookForm {
        owner_nonuser: "Aunt Mary".to_string(),
        ..held
    };
    let row = books.update_nonuser_book(&a, &row.id, renamed).unwrap();
    assert_eq!(row.owner_nonuser.as_deref(), Some("Aunt Mary"));

    let blank = NonUserBookForm {
        owner_nonuser: " ".to_string(),
        details: details("Petőfi", "Sándor", "János vitéz"),
        received: loan_date(),
    };
    assert!(matches!(
        books.create_nonuser_book(&a, blank),
        Err(AppError::Validation(BookError::EmptyField(_)))
    ));
}

// ========== DEPARTURE ==========

#[test]
fn departure_rehomes_loans() {
    let db = test_db();
    let friends = friend_service(&db);
    let books = BookService::new(db.clone());
    let auth = AuthService::new(db.clone(), 30, true);
    let u = create_user(&db, "u", "ursula");
    let v = create_user(&db, "v", "vilma");
    let w = create_user(&db, "w", "walter");
    befriend(&friends, &u, &v);
    befriend(&friends, &w, &u);

    let lent_by_u = books
        .create_book(&u, lent_to("vilma", "Arany", "Toldi"))
        .unwrap();
    let shelved_by_u = books.create_book(&u, form("Arany", "Buda halála")).unwrap();
    let lent_to_u = books
        .create_book(&w, lent_to("ursula", "Madách", "Az ember tragédiája"))
        .unwrap();

    let departure = auth.delete_account(&u).unwrap();
    assert_eq!(departure.released, 1);
    assert_eq!(departure.handed_over, 1);

    let x = books.get_book(&v, &lent_by_u.id).unwrap();
    assert_eq!(x.owner_id, "v");
    assert_eq!(x.owner_nonuser.as_deref(), Some("ursula"));
    assert!(!x.recommended);
    assert!(!x.loaned);
    assert_eq!(x.borrower_id, None);
    assert_eq!(x.loan_date, Some(loan_date()));

    let y = books.get_book(&w, &lent_to_u.id).unwrap();
    assert!(y.loaned);
    assert_eq!(y.borrower_id, None);
    assert_eq!(y.borrower_nonuser.as_deref(), Some("ursula"));

    assert!(matches!(
        books.get_book(&v, &shelved_by_u.id),
        Err(AppError::NotFound(_))
    ));
    assert!(db.get_user_by_username("ursula").unwrap().is_none());
    assert!(friends.list_friends(&v).unwrap().is_empty());
}

#[test]
fn departure_via_admin_delete() {
    let db = test_db();
    let auth = AuthService::new(db.clone(), 30, true);
    create_user(&db, "u", "ursula");

    assert!(auth.delete_user("ursula").unwrap());
    assert!(!auth.delete_user("ursula").unwrap());
}

// ========== CATALOG ==========

#[test]
fn catalog_my_books_are_collated_by_author() {
    let db = test_db();
    let books = BookService::new(db.clone());
    let catalog = Catalog::new(db.clone(), Collator::shared(), 50);
    let a = create_user(&db, "a", "anna");

    books.create_book(&a, form("Zsolt", "Z")).unwrap();
    books.create_book(&a, form("Ottlik", "O")).unwrap();
    books.create_book(&a, form("Örkény", "Ö")).unwrap();
    books.create_book(&a, form("Ottlik", "A")).unwrap();
    books
        .create_nonuser_book(
            &a,
            NonUserBookForm {
                owner_nonuser: "Uncle Joe".to_string(),
                details: details("Ady", "Endre", "Held"),
                received: loan_date(),
            },
        )
        .unwrap();

    let page = catalog.my_books(&a, 1).unwrap();
    assert_eq!(titles(&page.items), vec!["Ö", "A", "O", "Z"]);

    let borrowed = catalog.borrowed(&a, 1).unwrap();
    assert!(borrowed.from_users.items.is_empty());
    assert_eq!(titles(&borrowed.from_nonusers.items), vec!["Held"]);
}

#[test]
fn catalog_pagination() {
    let db = test_db();
    let books = BookService::new(db.clone());
    let catalog = Catalog::new(db.clone(), Collator::shared(), 2);
    let a = create_user(&db, "a", "anna");

    for last in ["A", "B", "C", "D", "E"] {
        books.create_book(&a, form(last, last)).unwrap();
    }

    assert_eq!(titles(&catalog.my_books(&a, 0).unwrap().items), vec!["A", "B"]);
    assert_eq!(titles(&catalog.my_books(&a, 3).unwrap().items), vec!["E"]);

    let past = catalog.my_books(&a, 4).unwrap();
    assert!(past.items.is_empty());
    assert_eq!(past.total, 5);
    assert_eq!(past.pages, 3);
}

#[test]
fn catalog_friends_recommended_sorting() {
    let db = test_db();
    let friends = friend_service(&db);
    let books = BookService::new(db.clone());
    let catalog = Catalog::new(db.clone(), Collator::shared(), 50);
    let me = create_user(&db, "me", "me");
    let b = create_user(&db, "b", "bela");
    let c = create_user(&db, "c", "csilla");
    let stranger = create_user(&db, "s", "stranger");
    befriend(&friends, &me, &b);
    befriend(&friends, &c, &me);

    let drama = db.create_genre("Dráma").unwrap();
    let novel = db.create_genre("Regény").unwrap();

    let mut x = recommended("Katona", "Bánk bán");
    x.details.genre_id = Some(drama.id);
    books.create_book(&c, x).unwrap();

    let mut y = recommended("Jókai", "Az arany ember");
    y.details.genre_id = Some(novel.id);
    books.create_book(&b, y).unwrap();

    books.create_book(&b, recommended("Ady", "Versek")).unwrap();
    books.create_book(&b, form("Ady", "Not offered")).unwrap();
    books.create_book(&stranger, recommended("Aaa", "Hidden")).unwrap();

    let by_genre = catalog
        .friends_recommended(&me, RecommendedSort::Genre, 1)
        .unwrap();
    assert_eq!(
        titles(&by_genre.items),
        vec!["Bánk bán", "Az arany ember", "Versek"]
    );

    let by_author = catalog
        .friends_recommended(&me, RecommendedSort::Author, 1)
        .unwrap();
    assert_eq!(
        titles(&by_author.items),
        vec!["Versek", "Az arany ember", "Bánk bán"]
    );

    let by_owner = catalog
        .friends_recommended(&me, RecommendedSort::Owner, 1)
        .unwrap();
    assert_eq!(
        titles(&by_owner.items),
        vec!["Versek", "Az arany ember", "Bánk bán"]
    );

    let by_language = catalog
        .friends_recommended(&me, RecommendedSort::Language, 1)
        .unwrap();
    assert_eq!(by_language.total, 3);
}

#[test]
fn catalog_friend_listings_require_friendship() {
    let db = test_db();
    let friends = friend_service(&db);
    let books = BookService::new(db.clone());
    let catalog = Catalog::new(db.clone(), Collator::shared(), 50);
    let me = create_user(&db, "me", "me");
    let b = create_user(&db, "b", "bela");
    let c = create_user(&db, "c", "csaba");
    befriend(&friends, &me, &b);

    let wish = BookForm {
        wished: true,
        ..form("Karinthy", "Így írtok ti")
    };
    books.create_book(&b, wish.clone()).unwrap();
    books.create_book(&c, wish).unwrap();

    assert_eq!(catalog.friend_wished(&me, "bela", 1).unwrap().total, 1);
    assert_eq!(
        catalog
            .friends_wished(&me, WishedSort::Owner, 1)
            .unwrap()
            .total,
        1
    );
    assert!(matches!(
        catalog.friend_wished(&me, "csaba", 1),
        Err(AppError::PermissionDenied(_))
    ));
    assert!(matches!(
        catalog.friend_recommended(&me, "nobody", 1),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn catalog_home_stats() {
    let db = test_db();
    let friends = friend_service(&db);
    let books = BookService::new(db.clone());
    let catalog = Catalog::new(db.clone(), Collator::shared(), 50);
    let a = create_user(&db, "a", "anna");
    let b = create_user(&db, "b", "bela");
    create_user(&db, "c", "csaba");
    let d = create_user(&db, "d", "dora");
    befriend(&friends, &a, &b);
    friends.request_friend(&a, "csaba").unwrap();
    friends.request_friend(&d, "anna").unwrap();

    books.create_book(&a, form("Ady", "Versek")).unwrap();
    books
        .create_book(&a, lent_to("bela", "Arany", "Toldi"))
        .unwrap();
    books
        .create_nonuser_book(
            &a,
            NonUserBookForm {
                owner_nonuser: "Uncle Joe".to_string(),
                details: details("Petőfi", "Sándor", "János vitéz"),
                received: loan_date(),
            },
        )
        .unwrap();

    let stats = catalog.home_stats(&a).unwrap();
    assert_eq!(stats.books, 2);
    assert_eq!(stats.loaned, 1);
    assert_eq!(stats.borrowed, 0);
    assert_eq!(stats.borrowed_from_nonusers, 1);
    assert_eq!(stats.friends, 1);
    assert_eq!(stats.outgoing_requests, 1);
    assert_eq!(stats.incoming_requests, 1);
    assert_eq!(stats.unread_rejections, 0);

    assert_eq!(catalog.home_stats(&b).unwrap().borrowed, 1);
}

// ========== AUTH ==========

#[test]
fn auth_create_user_and_login() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    let user = auth.create_user("testuser", "password123", "user").unwrap();
    assert_eq!(user.username, "testuser");
    assert_eq!(user.role, "user");

    let (logged_in, token) = auth.login("testuser", "password123").unwrap();
    assert_eq!(logged_in.username, "testuser");
    assert!(!token.is_empty());
}

#[test]
fn auth_validate_token() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("alice", "pass1234", "admin").unwrap();
    let (_, token) = auth.login("alice", "pass1234").unwrap();

    let user = auth.validate_token(&token).unwrap().unwrap();
    assert_eq!(user.username, "alice");
    assert!(auth.is_admin(&user));
    assert!(auth.require_admin(&user).is_ok());

    assert!(auth.validate_token("invalid_token").unwrap().is_none());

    auth.logout(&token).unwrap();
    assert!(auth.validate_token(&token).unwrap().is_none());
}

#[test]
fn auth_register_with_names() {
    let db = test_db();
    let auth = AuthService::new(db.clone(), 30, true);

    let user = auth
        .register(&Registration {
            username: "magda".to_string(),
            password: "secret".to_string(),
            first_name: Some(" Magda ".to_string()),
            last_name: Some("Szabó".to_string()),
        })
        .unwrap();
    assert_eq!(user.first_name.as_deref(), Some("Magda"));
    assert_eq!(user.label(), "magda (Szabó Magda)");
    assert!(!auth.is_admin(&user));
    assert!(matches!(
        auth.require_admin(&user),
        Err(AppError::PermissionDenied(_))
    ));

    let closed = AuthService::new(db, 30, false);
    assert!(matches!(
        closed.register(&Registration {
            username: "other".to_string(),
            password: "secret".to_string(),
            first_name: None,
            last_name: None,
        }),
        Err(AppError::InvalidFormat(_))
    ));
}

#[test]
fn auth_password_rules() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("user", "oldpass", "user").unwrap();
    assert!(auth.login("user", "wrong").is_err());

    auth.change_password("user", "newpass").unwrap();
    assert!(auth.login("user", "oldpass").is_err());
    assert!(auth.login("user", "newpass").is_ok());

    assert!(auth.create_user("short", "abc", "user").is_err());
    assert!(auth.create_user("user@email", "password", "user").is_err());
    assert!(auth.create_user("user name", "password", "user").is_err());
    assert!(auth.create_user("", "password", "user").is_err());
    assert!(auth.create_user("norole", "password", "root").is_err());
}

#[test]
fn auth_update_profile() {
    let db = test_db();
    let auth = AuthService::new(db.clone(), 30, true);
    let user = create_user(&db, "u", "ursula");
    create_user(&db, "v", "vilma");

    let updated = auth
        .update_profile(
            &user,
            &ProfileUpdate {
                first_name: Some("Orsolya".to_string()),
                image: Some("ursula.png".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.username, "ursula");
    assert_eq!(updated.first_name.as_deref(), Some("Orsolya"));
    assert_eq!(auth.profile(&updated).unwrap().image, "ursula.png");

    assert!(matches!(
        auth.update_profile(
            &updated,
            &ProfileUpdate {
                username: Some("vilma".to_string()),
                ..ProfileUpdate::default()
            },
        ),
        Err(AppError::Conflict(_))
    ));
}

// ========== CONFIG ==========

#[test]
fn config_parse_toml() {
    let toml = r#"
[server]
bind = "127.0.0.1:9090"
title = "Test Shelf"

[database]
path = "/tmp/test.db"

[auth]
registration = "disabled"
session_days = 7

[catalog]
page_size = 20
"#;
    let config = Config::parse(toml).unwrap();
    assert_eq!(config.server.bind.port(), 9090);
    assert_eq!(config.server.title, "Test Shelf");
    assert!(!config.auth.registration_enabled());
    assert_eq!(config.auth.session_days, 7);
    assert_eq!(config.catalog.page_size, 20);
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.server.bind.port(), 8080);
    assert!(config.auth.registration_enabled());
    assert_eq!(config.catalog.page_size, 50);

    let generated = Config::parse(&Config::generate_default()).unwrap();
    assert_eq!(generated.catalog.page_size, 50);

    assert!(matches!(
        Config::parse("[catalog]\npage_size = 0\n"),
        Err(AppError::Config(_))
    ));
}
