use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Reachable without a login. Commenting lives here too: the handler itself
/// bounces anonymous visitors to `/login`.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // GET /
        // All posts, oldest first.
        .route("/", get(handlers::get_all_posts))
        .route(
            "/register",
            get(handlers::register_page).post(handlers::register),
        )
        .route("/login", get(handlers::login_page).post(handlers::login))
        // GET /logout
        // Idempotent: clears the session cookie whether or not one was sent.
        .route("/logout", get(handlers::logout))
        // GET/POST /post/{post_id}
        // Post detail page; POST adds a comment for the logged-in user.
        .route(
            "/post/{post_id}",
            get(handlers::show_post).post(handlers::add_comment),
        )
        .route("/about", get(handlers::about))
        .route("/contact", get(handlers::contact))
}
