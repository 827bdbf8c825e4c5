//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::catalog::Catalog;
use crate::collation::Collator;
use crate::config::Config;
use crate::db::Database;
use crate::friends::FriendService;
use crate::library::BookService;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Friendship service.
    pub friends: Arc<FriendService>,
    /// Book service.
    pub books: Arc<BookService>,
    /// Listings.
    pub catalog: Arc<Catalog>,
}

impl AppState {
    /// Create new application state with database.
    pub fn new_with_db(config: Config, db: Database, auth: AuthService) -> Self {
        Self::with_collator(config, db, auth, Collator::shared())
    }

    /// Create application state with an explicit collator.
    pub fn with_collator(
        config: Config,
        db: Database,
        auth: AuthService,
        collator: &'static Collator,
    ) -> Self {
        let page_size = config.catalog.page_size;
        Self {
            friends: Arc::new(FriendService::new(db.clone(), collator)),
            books: Arc::new(BookService::new(db.clone())),
            catalog: Arc::new(Catalog::new(db.clone(), collator, page_size)),
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
        }
    }

    /// Drop sessions past their expiry.
    pub fn cleanup_sessions(&self) {
        match self.db.cleanup_expired_sessions() {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "Expired sessions removed"),
            Err(e) => tracing::warn!(error = %e, "Failed to clean up sessions"),
        }
    }
}
