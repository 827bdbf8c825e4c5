//! Friend request, friendship and rejection storage.

use crate::db::{FriendRequest, Friendship, RejectedFriendship, now_timestamp};
use crate::error::{AppError, Result, storage_error};
use rusqlite::{Connection, OptionalExtension, Row, params};

const REQUEST_SELECT: &str = "SELECT id, requester_id, requested_id, created_at FROM friend_requests";
const FRIENDSHIP_SELECT: &str =
    "SELECT id, confirmed_user_id, requested_user_id, confirmed_at FROM friendships";
const REJECTION_SELECT: &str =
    "SELECT id, rejecter_id, rejected_id, rejected_at, notif_deleted FROM rejected_friendships";

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<FriendRequest> {
    Ok(FriendRequest {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        requested_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn friendship_from_row(row: &Row<'_>) -> rusqlite::Result<Friendship> {
    Ok(Friendship {
        id: row.get(0)?,
        confirmed_user_id: row.get(1)?,
        requested_user_id: row.get(2)?,
        confirmed_at: row.get(3)?,
    })
}

fn rejection_from_row(row: &Row<'_>) -> rusqlite::Result<RejectedFriendship> {
    Ok(RejectedFriendship {
        id: row.get(0)?,
        rejecter_id: row.get(1)?,
        rejected_id: row.get(2)?,
        rejected_at: row.get(3)?,
        notif_deleted: row.get(4)?,
    })
}

fn query_list<T>(
    conn: &Connection,
    sql: &str,
    user_id: &str,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

    let items = stmt
        .query_map(params![user_id], map)
        .map_err(|e| AppError::Internal(format!("Failed to query: {}", e)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AppError::Internal(format!("Failed to collect rows: {}", e)))?;

    Ok(items)
}

// ========== REQUESTS ==========

/// Pending request from `requester_id` to `requested_id`.
pub fn find_request(
    conn: &Connection,
    requester_id: &str,
    requested_id: &str,
) -> Result<Option<FriendRequest>> {
    conn.query_row(
        &format!("{} WHERE requester_id = ?1 AND requested_id = ?2", REQUEST_SELECT),
        params![requester_id, requested_id],
        request_from_row,
    )
    .optional()
    .map_err(|e| AppError::Internal(format!("Failed to get friend request: {}", e)))
}

/// Pending request between two users, in either direction.
pub fn request_between(conn: &Connection, a: &str, b: &str) -> Result<Option<FriendRequest>> {
    match find_request(conn, a, b)? {
        Some(request) => Ok(Some(request)),
        None => find_request(conn, b, a),
    }
}

/// Store a new request.
pub fn insert_request(
    conn: &Connection,
    requester_id: &str,
    requested_id: &str,
) -> Result<FriendRequest> {
    let created_at = now_timestamp();
    conn.execute(
        "INSERT INTO friend_requests (requester_id, requested_id, created_at) VALUES (?1, ?2, ?3)",
        params![requester_id, requested_id, created_at],
    )
    .map_err(storage_error("friend request"))?;

    Ok(FriendRequest {
        id: conn.last_insert_rowid(),
        requester_id: requester_id.to_string(),
        requested_id: requested_id.to_string(),
        created_at,
    })
}

/// Delete the request from `requester_id` to `requested_id`.
pub fn delete_request(conn: &Connection, requester_id: &str, requested_id: &str) -> Result<bool> {
    let rows = conn
        .execute(
            "DELETE FROM friend_requests WHERE requester_id = ?1 AND requested_id = ?2",
            params![requester_id, requested_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to delete friend request: {}", e)))?;
    Ok(rows > 0)
}

/// Delete requests between two users in both directions.
pub fn delete_requests_between(conn: &Connection, a: &str, b: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM friend_requests
         WHERE (requester_id = ?1 AND requested_id = ?2)
            OR (requester_id = ?2 AND requested_id = ?1)",
        params![a, b],
    )
    .map_err(|e| AppError::Internal(format!("Failed to delete friend requests: {}", e)))
}

/// Requests the user sent, oldest first.
pub fn outgoing_requests(conn: &Connection, user_id: &str) -> Result<Vec<FriendRequest>> {
    query_list(
        conn,
        &format!("{} WHERE requester_id = ?1 ORDER BY created_at, id", REQUEST_SELECT),
        user_id,
        request_from_row,
    )
}

/// Requests the user received, oldest first.
pub fn incoming_requests(conn: &Connection, user_id: &str) -> Result<Vec<FriendRequest>> {
    query_list(
        conn,
        &format!("{} WHERE requested_id = ?1 ORDER BY created_at, id", REQUEST_SELECT),
        user_id,
        request_from_row,
    )
}

// ========== FRIENDSHIPS ==========

/// Friendship between two users, whichever side confirmed.
pub fn find_friendship(conn: &Connection, a: &str, b: &str) -> Result<Option<Friendship>> {
    conn.query_row(
        &format!(
            "{} WHERE (confirmed_user_id = ?1 AND requested_user_id = ?2)
                  OR (confirmed_user_id = ?2 AND requested_user_id = ?1)",
            FRIENDSHIP_SELECT
        ),
        params![a, b],
        friendship_from_row,
    )
    .optional()
    .map_err(|e| AppError::Internal(format!("Failed to get friendship: {}", e)))
}

/// Store a friendship.
pub fn insert_friendship(
    conn: &Connection,
    confirmed_user_id: &str,
    requested_user_id: &str,
) -> Result<Friendship> {
    let confirmed_at = now_timestamp();
    conn.execute(
        "INSERT INTO friendships (confirmed_user_id, requested_user_id, confirmed_at)
         VALUES (?1, ?2, ?3)",
        params![confirmed_user_id, requested_user_id, confirmed_at],
    )
    .map_err(storage_error("friendship"))?;

    Ok(Friendship {
        id: conn.last_insert_rowid(),
        confirmed_user_id: confirmed_user_id.to_string(),
        requested_user_id: requested_user_id.to_string(),
        confirmed_at,
    })
}

/// Delete the friendship between two users.
pub fn delete_friendship(conn: &Connection, a: &str, b: &str) -> Result<bool> {
    let rows = conn
        .execute(
            "DELETE FROM friendships
             WHERE (confirmed_user_id = ?1 AND requested_user_id = ?2)
                OR (confirmed_user_id = ?2 AND requested_user_id = ?1)",
            params![a, b],
        )
        .map_err(|e| AppError::Internal(format!("Failed to delete friendship: {}", e)))?;
    Ok(rows > 0)
}

/// IDs of everyone the user is friends with.
pub fn friend_ids(conn: &Connection, user_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT requested_user_id FROM friendships WHERE confirmed_user_id = ?1
             UNION
             SELECT confirmed_user_id FROM friendships WHERE requested_user_id = ?1",
        )
        .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

    let ids = stmt
        .query_map(params![user_id], |row| row.get::<_, String>(0))
        .map_err(|e| AppError::Internal(format!("Failed to list friends: {}", e)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AppError::Internal(format!("Failed to collect friends: {}", e)))?;

    Ok(ids.into_iter().filter(|id| id != user_id).collect())
}

// ========== REJECTIONS ==========

/// Record a rejection for the rejected user to see.
pub fn insert_rejection(
    conn: &Connection,
    rejecter_id: &str,
    rejected_id: &str,
) -> Result<RejectedFriendship> {
    let rejected_at = now_timestamp();
    conn.execute(
        "INSERT INTO rejected_friendships (rejecter_id, rejected_id, rejected_at, notif_deleted)
         VALUES (?1, ?2, ?3, 0)",
        params![rejecter_id, rejected_id, rejected_at],
    )
    .map_err(storage_error("rejection"))?;

    Ok(RejectedFriendship {
        id: conn.last_insert_rowid(),
        rejecter_id: rejecter_id.to_string(),
        rejected_id: rejected_id.to_string(),
        rejected_at,
        notif_deleted: false,
    })
}

/// Mark unseen rejections from `rejecter_id` as seen by `rejected_id`.
pub fn acknowledge_rejections(
    conn: &Connection,
    rejecter_id: &str,
    rejected_id: &str,
) -> Result<usize> {
    conn.execute(
        "UPDATE rejected_friendships SET notif_deleted = 1
         WHERE rejecter_id = ?1 AND rejected_id = ?2 AND notif_deleted = 0",
        params![rejecter_id, rejected_id],
    )
    .map_err(|e| AppError::Internal(format!("Failed to acknowledge rejection: {}", e)))
}

/// Rejections the user has not dismissed yet, oldest first.
pub fn unread_rejections(conn: &Connection, user_id: &str) -> Result<Vec<RejectedFriendship>> {
    query_list(
        conn,
        &format!(
            "{} WHERE rejected_id = ?1 AND notif_deleted = 0 ORDER BY rejected_at, id",
            REJECTION_SELECT
        ),
        user_id,
        rejection_from_row,
    )
}
