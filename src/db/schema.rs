use crate::db::*;
use crate::error::{AppError, Result, storage_error};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use std::path::Path;
use std::sync::Arc;

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                first_name TEXT,
                last_name TEXT,
                role TEXT NOT NULL DEFAULT 'user',
                created_at INTEGER NOT NULL,
                last_login INTEGER
            );

            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Profiles table (one per user)
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                image TEXT NOT NULL DEFAULT 'default.jpg',
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Lookup tables
            CREATE TABLE IF NOT EXISTS genres (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS languages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            );

            -- Books table
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                owner_nonuser TEXT,
                author_last_name TEXT NOT NULL,
                author_first_name TEXT NOT NULL,
                title TEXT NOT NULL,
                genre_id INTEGER,
                language_id INTEGER,
                recommended INTEGER NOT NULL DEFAULT 0,
                wished INTEGER NOT NULL DEFAULT 0,
                loaned INTEGER NOT NULL DEFAULT 0,
                borrower_id TEXT,
                borrower_nonuser TEXT,
                loan_date TEXT,
                comment TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                CHECK (NOT (wished AND (recommended OR loaned))),
                CHECK (NOT loaned OR (recommended AND loan_date IS NOT NULL
                    AND ((borrower_id IS NULL) <> (borrower_nonuser IS NULL)))),
                CHECK (loaned OR (borrower_id IS NULL AND borrower_nonuser IS NULL)),
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (borrower_id) REFERENCES users(id) ON DELETE SET NULL,
                FOREIGN KEY (genre_id) REFERENCES genres(id) ON DELETE SET NULL,
                FOREIGN KEY (language_id) REFERENCES languages(id) ON DELETE SET NULL
            );

            -- Pending friend requests, at most one per pair of users
            CREATE TABLE IF NOT EXISTS friend_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                requester_id TEXT NOT NULL,
                requested_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                CHECK (requester_id <> requested_id),
                FOREIGN KEY (requester_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (requested_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Friendships, at most one per pair of users
            CREATE TABLE IF NOT EXISTS friendships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                confirmed_user_id TEXT NOT NULL,
                requested_user_id TEXT NOT NULL,
                confirmed_at INTEGER NOT NULL,
                CHECK (confirmed_user_id <> requested_user_id),
                FOREIGN KEY (confirmed_user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (requested_user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Rejections waiting to be seen by the rejected user
            CREATE TABLE IF NOT EXISTS rejected_friendships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rejecter_id TEXT NOT NULL,
                rejected_id TEXT NOT NULL,
                rejected_at INTEGER NOT NULL,
                notif_deleted INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (rejecter_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (rejected_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE UNIQUE INDEX IF NOT EXISTS idx_friend_requests_pair ON friend_requests(
                min(requester_id, requested_id), max(requester_id, requested_id));
            CREATE UNIQUE INDEX IF NOT EXISTS idx_friendships_pair ON friendships(
                min(confirmed_user_id, requested_user_id), max(confirmed_user_id, requested_user_id));
            CREATE INDEX IF NOT EXISTS idx_friend_requests_requested ON friend_requests(requested_id);
            CREATE INDEX IF NOT EXISTS idx_friendships_requested ON friendships(requested_user_id);
            CREATE INDEX IF NOT EXISTS idx_rejections_rejected ON rejected_friendships(rejected_id);
            CREATE INDEX IF NOT EXISTS idx_books_owner ON books(owner_id);
            CREATE INDEX IF NOT EXISTS idx_books_borrower ON books(borrower_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Run `f` inside a single transaction; it commits only if `f` succeeds.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;
        Ok(value)
    }

    /// Run read-only queries against the connection.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user together with an empty profile.
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.transaction(|tx| {
            tx.execute(
                "INSERT INTO users (id, username, password_hash, first_name, last_name, role, created_at, last_login)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id,
                    user.username,
                    user.password_hash,
                    user.first_name,
                    user.last_name,
                    user.role,
                    user.created_at,
                    user.last_login,
                ],
            )
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint") {
                    AppError::Conflict(format!("Username '{}' already exists", user.username))
                } else {
                    AppError::Internal(format!("Failed to create user: {}", e))
                }
            })?;

            tx.execute(
                "INSERT INTO profiles (user_id, image) VALUES (?1, ?2)",
                params![user.id, DEFAULT_PROFILE_IMAGE],
            )
            .map_err(|e| AppError::Internal(format!("Failed to create profile: {}", e)))?;
            Ok(())
        })
    }

    /// Get user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.read(|conn| find_user_by_username(conn, username))
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.read(|conn| find_user_by_id(conn, id))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("{} ORDER BY username", USER_SELECT))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], user_from_row)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Update user password.
    pub fn update_user_password(&self, username: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE username = ?2",
                params![password_hash, username],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update password: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update username and real name.
    pub fn update_user_names(
        &self,
        user_id: &str,
        username: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET username = ?1, first_name = ?2, last_name = ?3 WHERE id = ?4",
                params![username, first_name, last_name, user_id],
            )
            .map_err(storage_error("username"))?;
        Ok(rows > 0)
    }

    /// Update user last login.
    pub fn update_user_last_login(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_timestamp(), user_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update last login: {}", e)))?;
        Ok(())
    }

    // ========== SESSION OPERATIONS ==========

    /// Create session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;
        Ok(())
    }

    /// Get session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    /// Cleanup expired sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                params![now_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to cleanup sessions: {}", e)))?;
        Ok(rows)
    }

    // ========== PROFILE OPERATIONS ==========

    /// Get a user's profile.
    pub fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT user_id, image FROM profiles WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(Profile {
                    user_id: row.get(0)?,
                    image: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get profile: {}", e)))
    }

    /// Set a user's profile image.
    pub fn update_profile_image(&self, user_id: &str, image: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO profiles (user_id, image) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET image = excluded.image",
            params![user_id, image],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update profile: {}", e)))?;
        Ok(())
    }

    // ========== GENRE / LANGUAGE OPERATIONS ==========

    /// Create a genre.
    pub fn create_genre(&self, name: &str) -> Result<Genre> {
        let conn = self.conn.lock();
        conn.execute("INSERT INTO genres (name) VALUES (?1)", params![name])
            .map_err(storage_error("genre"))?;
        Ok(Genre {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    /// List genres by name.
    pub fn list_genres(&self) -> Result<Vec<Genre>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, name FROM genres ORDER BY name")
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let genres = stmt
            .query_map([], |row| {
                Ok(Genre {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list genres: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect genres: {}", e)))?;

        Ok(genres)
    }

    /// Create a language.
    pub fn create_language(&self, name: &str) -> Result<Language> {
        let conn = self.conn.lock();
        conn.execute("INSERT INTO languages (name) VALUES (?1)", params![name])
            .map_err(storage_error("language"))?;
        Ok(Language {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    /// List languages by name.
    pub fn list_languages(&self) -> Result<Vec<Language>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, name FROM languages ORDER BY name")
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let languages = stmt
            .query_map([], |row| {
                Ok(Language {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list languages: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect languages: {}", e)))?;

        Ok(languages)
    }
}

const USER_SELECT: &str =
    "SELECT id, username, password_hash, first_name, last_name, role, created_at, last_login FROM users";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        role: row.get(5)?,
        created_at: row.get(6)?,
        last_login: row.get(7)?,
    })
}

/// Look up a user by username on an open connection or transaction.
pub(crate) fn find_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    conn.query_row(
        &format!("{} WHERE username = ?1", USER_SELECT),
        params![username],
        user_from_row,
    )
    .optional()
    .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
}

/// Look up a user by ID on an open connection or transaction.
pub(crate) fn find_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    conn.query_row(
        &format!("{} WHERE id = ?1", USER_SELECT),
        params![id],
        user_from_row,
    )
    .optional()
    .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
}

/// Load several users by ID.
pub(crate) fn users_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<User>> {
    let mut users = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(user) = find_user_by_id(conn, id)? {
            users.push(user);
        }
    }
    Ok(users)
}

/// Users with no request either way and no friendship with `user_id`, excluding the user.
pub(crate) fn candidate_users(conn: &Connection, user_id: &str) -> Result<Vec<User>> {
    let mut stmt = conn
        .prepare(&format!(
            "{} WHERE id <> ?1
               AND id NOT IN (
                   SELECT requested_id FROM friend_requests WHERE requester_id = ?1
                   UNION SELECT requester_id FROM friend_requests WHERE requested_id = ?1)
               AND id NOT IN (
                   SELECT requested_user_id FROM friendships WHERE confirmed_user_id = ?1
                   UNION SELECT confirmed_user_id FROM friendships WHERE requested_user_id = ?1)",
            USER_SELECT
        ))
        .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

    let users = stmt
        .query_map(params![user_id], user_from_row)
        .map_err(|e| AppError::Internal(format!("Failed to list candidates: {}", e)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AppError::Internal(format!("Failed to collect candidates: {}", e)))?;

    Ok(users)
}

/// Delete a user row; dependent rows follow through foreign keys.
pub(crate) fn delete_user_row(conn: &Connection, user_id: &str) -> Result<bool> {
    let rows = conn
        .execute("DELETE FROM users WHERE id = ?1", params![user_id])
        .map_err(|e| AppError::Internal(format!("Failed to delete user: {}", e)))?;
    Ok(rows > 0)
}

/// Whether a genre exists.
pub(crate) fn genre_exists(conn: &Connection, id: i64) -> Result<bool> {
    conn.query_row("SELECT 1 FROM genres WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
        .map_err(|e| AppError::Internal(format!("Failed to get genre: {}", e)))
}

/// Whether a language exists.
pub(crate) fn language_exists(conn: &Connection, id: i64) -> Result<bool> {
    conn.query_row("SELECT 1 FROM languages WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
        .map_err(|e| AppError::Internal(format!("Failed to get language: {}", e)))
}
