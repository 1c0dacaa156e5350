use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Post management. Every handler here takes `AdminSession`, which redirects
/// anonymous visitors to `/login` and answers 403 to everyone who is not an
/// administrator.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /new-post
        .route(
            "/new-post",
            get(handlers::new_post_page).post(handlers::create_post),
        )
        // GET/POST /edit-post/{post_id}
        // Only title, subtitle, image URL and body are editable.
        .route(
            "/edit-post/{post_id}",
            get(handlers::edit_post_page).post(handlers::update_post),
        )
        // GET /delete/{post_id}
        // Deletes the post and its comments, then returns to the listing.
        .route("/delete/{post_id}", get(handlers::delete_post))
}
