//! Accounts, sessions and profiles.

use crate::db::{self, Database, Profile, Session, User, now_timestamp};
use crate::error::{AppError, Result};
use crate::library::{self, Departure};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::Deserialize;

/// Longest accepted first or last name.
pub const MAX_NAME_LEN: usize = 100;

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Generate a secure random token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Sign-up input.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    /// Login name.
    pub username: String,
    /// Plain password.
    pub password: String,
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Profile edit input. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    /// New login name.
    #[serde(default)]
    pub username: Option<String>,
    /// New given name; blank clears it.
    #[serde(default)]
    pub first_name: Option<String>,
    /// New family name; blank clears it.
    #[serde(default)]
    pub last_name: Option<String>,
    /// New profile image file name.
    #[serde(default)]
    pub image: Option<String>,
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() || username.len() > 64 {
        return Err(AppError::InvalidFormat(
            "Username must be 1-64 characters".to_string(),
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::InvalidFormat(
            "Username can only contain letters, numbers, _ and -".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.len() < 4 {
        return Err(AppError::InvalidFormat(
            "Password must be at least 4 characters".to_string(),
        ));
    }
    Ok(())
}

fn clean_name(field: &str, value: Option<&str>) -> Result<Option<String>> {
    let value = value.map(str::trim).filter(|v| !v.is_empty());
    if let Some(v) = value
        && v.chars().count() > MAX_NAME_LEN
    {
        return Err(AppError::InvalidFormat(format!(
            "{} must be at most {} characters",
            field, MAX_NAME_LEN
        )));
    }
    Ok(value.map(str::to_string))
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    session_duration_days: u32,
    registration_enabled: bool,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, session_duration_days: u32, registration_enabled: bool) -> Self {
        Self {
            db,
            session_duration_days,
            registration_enabled,
        }
    }

    /// Register a new user.
    pub fn register(&self, registration: &Registration) -> Result<User> {
        if !self.registration_enabled {
            return Err(AppError::InvalidFormat(
                "Registration is disabled".to_string(),
            ));
        }

        let user = self.build_user(
            &registration.username,
            &registration.password,
            "user",
            clean_name("first_name", registration.first_name.as_deref())?,
            clean_name("last_name", registration.last_name.as_deref())?,
        )?;
        self.db.create_user(&user)?;
        tracing::info!(username = %user.username, "User registered");
        Ok(user)
    }

    /// Create a new user (admin function).
    pub fn create_user(&self, username: &str, password: &str, role: &str) -> Result<User> {
        let user = self.build_user(username, password, role, None, None)?;
        self.db.create_user(&user)?;
        Ok(user)
    }

    fn build_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<User> {
        validate_username(username)?;
        validate_password(password)?;

        if role != "admin" && role != "user" {
            return Err(AppError::InvalidFormat(
                "Role must be 'admin' or 'user'".to_string(),
            ));
        }

        Ok(User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: hash_password(password)?,
            first_name,
            last_name,
            role: role.to_string(),
            created_at: now_timestamp(),
            last_login: None,
        })
    }

    /// Login and create a session.
    pub fn login(&self, username: &str, password: &str) -> Result<(User, String)> {
        let user = self
            .db
            .get_user_by_username(username)?
            .ok_or_else(|| AppError::InvalidFormat("Invalid username or password".to_string()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::InvalidFormat(
                "Invalid username or password".to_string(),
            ));
        }

        self.db.update_user_last_login(&user.id)?;

        let token = generate_token();
        let expires_at = now_timestamp() + (self.session_duration_days as i64 * 24 * 60 * 60);

        let session = Session {
            token: token.clone(),
            user_id: user.id.clone(),
            expires_at,
        };

        self.db.create_session(&session)?;

        Ok((user, token))
    }

    /// Validate a session token and return the user.
    pub fn validate_token(&self, token: &str) -> Result<Option<User>> {
        let session = match self.db.get_session(token)? {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.expires_at < now_timestamp() {
            self.db.delete_session(token)?;
            return Ok(None);
        }

        self.db.get_user_by_id(&session.user_id)
    }

    /// Logout (delete session).
    pub fn logout(&self, token: &str) -> Result<()> {
        self.db.delete_session(token)
    }

    /// Change user password.
    pub fn change_password(&self, username: &str, new_password: &str) -> Result<bool> {
        validate_password(new_password)?;

        let password_hash = hash_password(new_password)?;
        self.db.update_user_password(username, &password_hash)
    }

    /// The user's profile.
    pub fn profile(&self, user: &User) -> Result<Profile> {
        self.db
            .get_profile(&user.id)?
            .ok_or_else(|| AppError::NotFound(format!("Profile not found: {}", user.username)))
    }

    /// Edit username, real name and profile image.
    pub fn update_profile(&self, user: &User, update: &ProfileUpdate) -> Result<User> {
        let username = match update.username.as_deref().map(str::trim) {
            Some(name) => {
                validate_username(name)?;
                name.to_string()
            }
            None => user.username.clone(),
        };
        let first_name = match &update.first_name {
            Some(v) => clean_name("first_name", Some(v))?,
            None => user.first_name.clone(),
        };
        let last_name = match &update.last_name {
            Some(v) => clean_name("last_name", Some(v))?,
            None => user.last_name.clone(),
        };

        if !self.db.update_user_names(
            &user.id,
            &username,
            first_name.as_deref(),
            last_name.as_deref(),
        )? {
            return Err(AppError::NotFound(format!("User not found: {}", user.username)));
        }

        if let Some(image) = update.image.as_deref().map(str::trim)
            && !image.is_empty()
        {
            self.db.update_profile_image(&user.id, image)?;
        }

        self.db
            .get_user_by_id(&user.id)?
            .ok_or_else(|| AppError::NotFound(format!("User not found: {}", username)))
    }

    /// Delete an account, re-homing the books it lent or borrowed first.
    pub fn delete_account(&self, user: &User) -> Result<Departure> {
        let departure = self.db.transaction(|tx| {
            let departure = library::settle_loans(tx, user)?;
            if !db::delete_user_row(tx, &user.id)? {
                return Err(AppError::NotFound(format!("User not found: {}", user.username)));
            }
            Ok(departure)
        })?;

        tracing::info!(
            username = %user.username,
            released = departure.released,
            handed_over = departure.handed_over,
            "User departed"
        );
        Ok(departure)
    }

    /// Delete a user by username (admin function). Returns false if unknown.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        match self.db.get_user_by_username(username)? {
            Some(user) => self.delete_account(&user).map(|_| true),
            None => Ok(false),
        }
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.list_users()
    }

    /// Check if a user is admin.
    pub fn is_admin(&self, user: &User) -> bool {
        user.role == "admin"
    }

    /// Fail with `PermissionDenied` unless the user is an admin.
    pub fn require_admin(&self, user: &User) -> Result<()> {
        if !self.is_admin(user) {
            return Err(AppError::PermissionDenied(
                "Only admins can do this".to_string(),
            ));
        }
        Ok(())
    }
}
