//! Friendship state machine.
//!
//! Between two users there is nothing, a pending request in one direction, or
//! a friendship. A rejection leaves a notification for the requester but does
//! not stop them from asking again.

use crate::collation::Collator;
use crate::db::{
    self, Database, FriendRequest, Friendship, RejectedFriendship, User, friends as store,
};
use crate::error::{AppError, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Answer to an entry on the notifications page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "username", rename_all = "snake_case")]
pub enum NotificationAction {
    /// Accept a pending request from this user.
    Confirm(String),
    /// Turn down a pending request from this user.
    Reject(String),
    /// Dismiss the notice that this user rejected us.
    AcknowledgeRejection(String),
}

/// What a handled notification changed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// A friendship was created.
    Confirmed {
        /// The new friendship.
        friendship: Friendship,
    },
    /// A request was rejected.
    Rejected {
        /// The stored rejection.
        rejection: RejectedFriendship,
    },
    /// Rejection notices were dismissed.
    Acknowledged {
        /// How many notices were dismissed.
        count: usize,
    },
}

/// A pending request seen from one side, with the other user resolved.
#[derive(Debug, Clone, Serialize)]
pub struct PendingRequest {
    /// Request ID.
    pub id: i64,
    /// The other user.
    pub username: String,
    /// When it was sent.
    pub created_at: i64,
}

/// An unacknowledged rejection, with the rejecter resolved.
#[derive(Debug, Clone, Serialize)]
pub struct RejectionNotice {
    /// Who rejected the request.
    pub username: String,
    /// When.
    pub rejected_at: i64,
}

/// Someone the user may send a request to.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    /// Username.
    pub username: String,
    /// `username (last first)` when both names are known.
    pub label: String,
}

/// Friend listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct FriendEntry {
    /// User ID.
    pub id: String,
    /// Username.
    pub username: String,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
}

impl From<User> for FriendEntry {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

/// Friendship service.
pub struct FriendService {
    db: Database,
    collator: &'static Collator,
}

fn resolve(conn: &Connection, username: &str) -> Result<User> {
    db::find_user_by_username(conn, username)?
        .ok_or_else(|| AppError::NotFound(format!("User not found: {}", username)))
}

fn username_of(conn: &Connection, user_id: &str) -> Result<String> {
    Ok(db::find_user_by_id(conn, user_id)?
        .map(|u| u.username)
        .unwrap_or_default())
}

impl FriendService {
    /// Create a new friendship service.
    pub fn new(db: Database, collator: &'static Collator) -> Self {
        Self { db, collator }
    }

    /// Ask `target` to become friends with `requester`.
    pub fn request_friend(&self, requester: &User, target: &str) -> Result<FriendRequest> {
        self.db.transaction(|tx| {
            let target = resolve(tx, target)?;

            if target.id == requester.id {
                return Err(AppError::InvalidTarget(
                    "You cannot send a friend request to yourself".to_string(),
                ));
            }
            if store::find_friendship(tx, &requester.id, &target.id)?.is_some() {
                return Err(AppError::Conflict(format!(
                    "You are already friends with {}",
                    target.username
                )));
            }
            if let Some(existing) = store::request_between(tx, &requester.id, &target.id)? {
                let message = if existing.requester_id == requester.id {
                    format!("You already sent a request to {}", target.username)
                } else {
                    format!("{} already sent you a request", target.username)
                };
                return Err(AppError::Conflict(message));
            }

            let request = store::insert_request(tx, &requester.id, &target.id)?;
            tracing::info!(from = %requester.username, to = %target.username, "Friend request sent");
            Ok(request)
        })
    }

    /// Take back a request `requester` sent to `target`.
    pub fn withdraw_request(&self, requester: &User, target: &str) -> Result<()> {
        self.db.transaction(|tx| {
            let target = resolve(tx, target)?;
            if !store::delete_request(tx, &requester.id, &target.id)? {
                return Err(AppError::NotFound(format!(
                    "No pending request to {}",
                    target.username
                )));
            }
            tracing::info!(from = %requester.username, to = %target.username, "Friend request withdrawn");
            Ok(())
        })
    }

    /// Accept the request `requester` sent to `confirmer`.
    pub fn confirm_request(&self, confirmer: &User, requester: &str) -> Result<Friendship> {
        self.db.transaction(|tx| {
            let requester = resolve(tx, requester)?;
            if store::find_request(tx, &requester.id, &confirmer.id)?.is_none() {
                return Err(AppError::NotFound(format!(
                    "No pending request from {}",
                    requester.username
                )));
            }

            let friendship = store::insert_friendship(tx, &requester.id, &confirmer.id)?;
            store::delete_request(tx, &requester.id, &confirmer.id)?;

            tracing::info!(a = %requester.username, b = %confirmer.username, "Friendship confirmed");
            Ok(friendship)
        })
    }

    /// Turn down the request `requester` sent to `rejecter`.
    pub fn reject_request(&self, rejecter: &User, requester: &str) -> Result<RejectedFriendship> {
        self.db.transaction(|tx| {
            let requester = resolve(tx, requester)?;
            if !store::delete_request(tx, &requester.id, &rejecter.id)? {
                return Err(AppError::NotFound(format!(
                    "No pending request from {}",
                    requester.username
                )));
            }

            let rejection = store::insert_rejection(tx, &rejecter.id, &requester.id)?;
            tracing::info!(by = %rejecter.username, from = %requester.username, "Friend request rejected");
            Ok(rejection)
        })
    }

    /// Dismiss the notices that `rejecter` turned `viewer` down.
    pub fn acknowledge_rejection(&self, viewer: &User, rejecter: &str) -> Result<usize> {
        self.db.transaction(|tx| {
            let rejecter = resolve(tx, rejecter)?;
            let count = store::acknowledge_rejections(tx, &rejecter.id, &viewer.id)?;
            if count == 0 {
                return Err(AppError::NotFound(format!(
                    "No rejection notice from {}",
                    rejecter.username
                )));
            }
            Ok(count)
        })
    }

    /// End the friendship between `user` and `other`.
    ///
    /// Any request left between them is removed too.
    pub fn remove_friendship(&self, user: &User, other: &str) -> Result<()> {
        self.db.transaction(|tx| {
            let other = resolve(tx, other)?;
            if !store::delete_friendship(tx, &user.id, &other.id)? {
                return Err(AppError::NotFound(format!(
                    "You are not friends with {}",
                    other.username
                )));
            }

            let leftover = store::delete_requests_between(tx, &user.id, &other.id)?;
            if leftover > 0 {
                tracing::warn!(a = %user.username, b = %other.username, leftover, "Removed stale friend requests");
            }
            tracing::info!(a = %user.username, b = %other.username, "Friendship removed");
            Ok(())
        })
    }

    /// Dispatch a notification answer.
    pub fn handle_notification(
        &self,
        viewer: &User,
        action: &NotificationAction,
    ) -> Result<NotificationOutcome> {
        match action {
            NotificationAction::Confirm(username) => self
                .confirm_request(viewer, username)
                .map(|friendship| NotificationOutcome::Confirmed { friendship }),
            NotificationAction::Reject(username) => self
                .reject_request(viewer, username)
                .map(|rejection| NotificationOutcome::Rejected { rejection }),
            NotificationAction::AcknowledgeRejection(username) => self
                .acknowledge_rejection(viewer, username)
                .map(|count| NotificationOutcome::Acknowledged { count }),
        }
    }

    // ========== LISTINGS ==========

    /// Whether two users are friends.
    pub fn are_friends(&self, a: &str, b: &str) -> Result<bool> {
        self.db
            .read(|conn| Ok(store::find_friendship(conn, a, b)?.is_some()))
    }

    /// IDs of the user's friends.
    pub fn friend_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.db.read(|conn| store::friend_ids(conn, user_id))
    }

    /// The user's friends, collated by username.
    pub fn list_friends(&self, user: &User) -> Result<Vec<FriendEntry>> {
        let mut friends: Vec<FriendEntry> = self.db.read(|conn| {
            let ids = store::friend_ids(conn, &user.id)?;
            db::users_by_ids(conn, &ids)
        })?
        .into_iter()
        .map(FriendEntry::from)
        .collect();

        self.collator
            .sort_by(&mut friends, |c, a, b| c.compare(&a.username, &b.username));
        Ok(friends)
    }

    /// Requests the user sent that are still pending.
    pub fn outgoing_requests(&self, user: &User) -> Result<Vec<PendingRequest>> {
        self.db.read(|conn| {
            store::outgoing_requests(conn, &user.id)?
                .into_iter()
                .map(|r| {
                    Ok(PendingRequest {
                        id: r.id,
                        username: username_of(conn, &r.requested_id)?,
                        created_at: r.created_at,
                    })
                })
                .collect()
        })
    }

    /// Requests waiting for the user's answer.
    pub fn incoming_requests(&self, user: &User) -> Result<Vec<PendingRequest>> {
        self.db.read(|conn| {
            store::incoming_requests(conn, &user.id)?
                .into_iter()
                .map(|r| {
                    Ok(PendingRequest {
                        id: r.id,
                        username: username_of(conn, &r.requester_id)?,
                        created_at: r.created_at,
                    })
                })
                .collect()
        })
    }

    /// Rejections the user has not dismissed.
    pub fn unread_rejections(&self, user: &User) -> Result<Vec<RejectionNotice>> {
        self.db.read(|conn| {
            store::unread_rejections(conn, &user.id)?
                .into_iter()
                .map(|r| {
                    Ok(RejectionNotice {
                        username: username_of(conn, &r.rejecter_id)?,
                        rejected_at: r.rejected_at,
                    })
                })
                .collect()
        })
    }

    /// Users the user could send a request to, collated by username.
    ///
    /// Excludes the user, anyone with a pending request either way, and friends.
    pub fn candidates(&self, user: &User) -> Result<Vec<Candidate>> {
        let mut candidates: Vec<Candidate> = self
            .db
            .read(|conn| db::candidate_users(conn, &user.id))?
            .into_iter()
            .map(|other| Candidate {
                label: other.label(),
                username: other.username,
            })
            .collect();

        self.collator
            .sort_by(&mut candidates, |c, a, b| c.compare(&a.username, &b.username));
        Ok(candidates)
    }
}
