//! HTTP request handlers.

use crate::auth::{ProfileUpdate, Registration};
use crate::catalog::{BorrowedBooks, HomeStats, Page, RecommendedSort, WishedSort};
use crate::db::{BookRow, FriendRequest, Genre, Language, Profile, User};
use crate::error::{AppError, Result};
use crate::friends::{
    Candidate, FriendEntry, NotificationAction, NotificationOutcome, PendingRequest,
    RejectionNotice,
};
use crate::library::{BookForm, Departure, NonUserBookForm};
use crate::server::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
};
use serde::{Deserialize, Serialize};

// ============================================================================
// HEALTH
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    title: String,
}

/// Liveness probe.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        title: state.config.server.title.clone(),
    })
}

// ============================================================================
// AUTH API
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    token: String,
    user_id: String,
    username: String,
    role: String,
}

/// Password change request.
#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    password: String,
}

/// Auth login.
pub async fn auth_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let (user, token) = state.auth.login(&req.username, &req.password)?;

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
        role: user.role,
    }))
}

/// Auth register.
pub async fn auth_register(
    State(state): State<AppState>,
    Json(req): Json<Registration>,
) -> Result<Json<LoginResponse>> {
    state.auth.register(&req)?;
    let (user, token) = state.auth.login(&req.username, &req.password)?;

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
        role: user.role,
    }))
}

/// Auth logout.
pub async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    if let Some(token) = extract_token(&headers) {
        state.auth.logout(&token)?;
    }
    Ok(StatusCode::OK)
}

/// Get current user info.
pub async fn auth_me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<User>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(user))
}

/// Change own password.
pub async fn auth_change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PasswordRequest>,
) -> Result<StatusCode> {
    let user = get_authenticated_user(&state, &headers).await?;
    state.auth.change_password(&user.username, &req.password)?;
    Ok(StatusCode::OK)
}

/// Delete own account.
pub async fn auth_delete_account(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Departure>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.auth.delete_account(&user)?))
}

// ============================================================================
// PROFILE / HOME
// ============================================================================

/// Profile response.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    user: User,
    profile: Profile,
}

/// Get own profile.
pub async fn profile_get(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>> {
    let user = get_authenticated_user(&state, &headers).await?;
    let profile = state.auth.profile(&user)?;
    Ok(Json(ProfileResponse { user, profile }))
}

/// Edit own profile.
pub async fn profile_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ProfileUpdate>,
) -> Result<Json<ProfileResponse>> {
    let user = get_authenticated_user(&state, &headers).await?;
    let user = state.auth.update_profile(&user, &req)?;
    let profile = state.auth.profile(&user)?;
    Ok(Json(ProfileResponse { user, profile }))
}

/// Dashboard counters.
pub async fn api_home(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<HomeStats>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.catalog.home_stats(&user)?))
}

/// List genres.
pub async fn genres_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Genre>>> {
    get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.db.list_genres()?))
}

/// List languages.
pub async fn languages_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Language>>> {
    get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.db.list_languages()?))
}

/// New genre or language.
#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    name: String,
}

impl LookupRequest {
    fn name(&self) -> Result<&str> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidFormat("Name must not be empty".to_string()));
        }
        Ok(name)
    }
}

/// Add a genre (admin only).
pub async fn genres_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LookupRequest>,
) -> Result<(StatusCode, Json<Genre>)> {
    let user = get_authenticated_user(&state, &headers).await?;
    state.auth.require_admin(&user)?;
    let genre = state.db.create_genre(req.name()?)?;
    tracing::info!(admin = %user.username, genre = %genre.name, "Genre added");
    Ok((StatusCode::CREATED, Json(genre)))
}

/// Add a language (admin only).
pub async fn languages_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LookupRequest>,
) -> Result<(StatusCode, Json<Language>)> {
    let user = get_authenticated_user(&state, &headers).await?;
    state.auth.require_admin(&user)?;
    let language = state.db.create_language(req.name()?)?;
    tracing::info!(admin = %user.username, language = %language.name, "Language added");
    Ok((StatusCode::CREATED, Json(language)))
}

// ============================================================================
// BOOKS API
// ============================================================================

/// Add an owned book.
pub async fn book_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<BookForm>,
) -> Result<(StatusCode, Json<BookRow>)> {
    let user = get_authenticated_user(&state, &headers).await?;
    let book = state.books.create_book(&user, form)?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Add a book held for a non-user.
pub async fn book_create_nonuser(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<NonUserBookForm>,
) -> Result<(StatusCode, Json<BookRow>)> {
    let user = get_authenticated_user(&state, &headers).await?;
    let book = state.books.create_nonuser_book(&user, form)?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Book detail.
pub async fn book_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookRow>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.books.get_book(&user, &id)?))
}

/// Edit an owned book.
pub async fn book_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(form): Json<BookForm>,
) -> Result<Json<BookRow>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.books.update_book(&user, &id, form)?))
}

/// Edit a book held for a non-user.
pub async fn book_update_nonuser(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(form): Json<NonUserBookForm>,
) -> Result<Json<BookRow>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.books.update_nonuser_book(&user, &id, form)?))
}

/// Delete a book.
pub async fn book_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let user = get_authenticated_user(&state, &headers).await?;
    state.books.delete_book(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// LISTINGS API
// ============================================================================

/// Page selection.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    page: usize,
}

/// Friends' recommended books query.
#[derive(Debug, Default, Deserialize)]
pub struct RecommendedQuery {
    #[serde(default)]
    page: usize,
    #[serde(default)]
    sort: RecommendedSort,
}

/// Friends' wished books query.
#[derive(Debug, Default, Deserialize)]
pub struct WishedQuery {
    #[serde(default)]
    page: usize,
    #[serde(default)]
    sort: WishedSort,
}

/// My books.
pub async fn list_mine(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page<BookRow>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.catalog.my_books(&user, q.page)?))
}

/// My recommended books.
pub async fn list_recommended(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page<BookRow>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.catalog.my_recommended(&user, q.page)?))
}

/// My loaned books.
pub async fn list_loaned(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page<BookRow>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.catalog.my_loaned(&user, q.page)?))
}

/// My wish list.
pub async fn list_wished(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page<BookRow>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.catalog.my_wished(&user, q.page)?))
}

/// Books I borrowed.
pub async fn list_borrowed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<PageQuery>,
) -> Result<Json<BorrowedBooks>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.catalog.borrowed(&user, q.page)?))
}

/// Recommended books of all friends.
pub async fn list_friends_recommended(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<RecommendedQuery>,
) -> Result<Json<Page<BookRow>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.catalog.friends_recommended(&user, q.sort, q.page)?))
}

/// Wished books of all friends.
pub async fn list_friends_wished(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<WishedQuery>,
) -> Result<Json<Page<BookRow>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.catalog.friends_wished(&user, q.sort, q.page)?))
}

/// Recommended books of one friend.
pub async fn list_friend_recommended(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page<BookRow>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(
        state.catalog.friend_recommended(&user, &username, q.page)?,
    ))
}

/// Wish list of one friend.
pub async fn list_friend_wished(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page<BookRow>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.catalog.friend_wished(&user, &username, q.page)?))
}

// ============================================================================
// FRIENDS API
// ============================================================================

/// My friends.
pub async fn friends_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<FriendEntry>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.friends.list_friends(&user)?))
}

/// Users I can send a request to.
pub async fn friends_candidates(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Candidate>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.friends.candidates(&user)?))
}

/// End a friendship.
pub async fn friends_remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<StatusCode> {
    let user = get_authenticated_user(&state, &headers).await?;
    state.friends.remove_friendship(&user, &username)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pending requests in both directions.
#[derive(Debug, Serialize)]
pub struct RequestsResponse {
    outgoing: Vec<PendingRequest>,
    incoming: Vec<PendingRequest>,
}

/// My pending requests.
pub async fn requests_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RequestsResponse>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(RequestsResponse {
        outgoing: state.friends.outgoing_requests(&user)?,
        incoming: state.friends.incoming_requests(&user)?,
    }))
}

/// Send a friend request.
pub async fn requests_send(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<(StatusCode, Json<FriendRequest>)> {
    let user = get_authenticated_user(&state, &headers).await?;
    let request = state.friends.request_friend(&user, &username)?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Withdraw a friend request.
pub async fn requests_withdraw(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<StatusCode> {
    let user = get_authenticated_user(&state, &headers).await?;
    state.friends.withdraw_request(&user, &username)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Notifications page content.
#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    requests: Vec<PendingRequest>,
    rejections: Vec<RejectionNotice>,
}

/// Incoming requests and unread rejections.
pub async fn notifications_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<NotificationsResponse>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(NotificationsResponse {
        requests: state.friends.incoming_requests(&user)?,
        rejections: state.friends.unread_rejections(&user)?,
    }))
}

/// Answer a notification.
pub async fn notifications_handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(action): Json<NotificationAction>,
) -> Result<Json<NotificationOutcome>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.friends.handle_notification(&user, &action)?))
}

// ============================================================================
// HELPERS
// ============================================================================

/// Extract token from Authorization header.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Get authenticated user from token.
async fn get_authenticated_user(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let token = extract_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    state
        .auth
        .validate_token(&token)?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))
}
