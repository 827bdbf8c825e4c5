//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(handlers::auth_login))
        .route("/register", post(handlers::auth_register))
        .route("/logout", post(handlers::auth_logout))
        .route("/me", get(handlers::auth_me))
        .route("/password", put(handlers::auth_change_password))
        .route("/account", delete(handlers::auth_delete_account));

    let book_routes = Router::new()
        .route("/", post(handlers::book_create))
        .route("/nonuser", post(handlers::book_create_nonuser))
        .route(
            "/{id}",
            get(handlers::book_get)
                .put(handlers::book_update)
                .delete(handlers::book_delete),
        )
        .route("/{id}/nonuser", put(handlers::book_update_nonuser));

    let listing_routes = Router::new()
        .route("/mine", get(handlers::list_mine))
        .route("/recommended", get(handlers::list_recommended))
        .route("/loaned", get(handlers::list_loaned))
        .route("/wished", get(handlers::list_wished))
        .route("/borrowed", get(handlers::list_borrowed))
        .route("/friends/recommended", get(handlers::list_friends_recommended))
        .route("/friends/wished", get(handlers::list_friends_wished))
        .route(
            "/friends/{username}/recommended",
            get(handlers::list_friend_recommended),
        )
        .route(
            "/friends/{username}/wished",
            get(handlers::list_friend_wished),
        );

    let friend_routes = Router::new()
        .route("/", get(handlers::friends_list))
        .route("/candidates", get(handlers::friends_candidates))
        .route("/{username}", delete(handlers::friends_remove));

    let request_routes = Router::new()
        .route("/", get(handlers::requests_list))
        .route(
            "/{username}",
            post(handlers::requests_send).delete(handlers::requests_withdraw),
        );

    let notification_routes = Router::new().route(
        "/",
        get(handlers::notifications_list).post(handlers::notifications_handle),
    );

    let api_routes = Router::new()
        .route("/home", get(handlers::api_home))
        .route(
            "/profile",
            get(handlers::profile_get).put(handlers::profile_update),
        )
        .route(
            "/genres",
            get(handlers::genres_list).post(handlers::genres_create),
        )
        .route(
            "/languages",
            get(handlers::languages_list).post(handlers::languages_create),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/auth", auth_routes)
        .nest("/api/books", book_routes)
        .nest("/api/listings", listing_routes)
        .nest("/api/friends", friend_routes)
        .nest("/api/requests", request_routes)
        .nest("/api/notifications", notification_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
