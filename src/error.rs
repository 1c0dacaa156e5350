use axum::{
    http::{StatusCode, header::InvalidHeaderValue},
    response::{Html, IntoResponse, Redirect, Response},
};
use thiserror::Error;

use crate::repository::RepoError;

/// AppError
///
/// Request-terminating failures. Form and login mistakes are not errors; they
/// re-render the page. Everything here ends the request.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("page not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    /// Anonymous visitor hit a page that needs a login.
    #[error("login required")]
    LoginRequired,

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("template rendering failed: {0}")]
    Template(#[from] tera::Error),

    #[error("password hashing failed: {0}")]
    Password(String),

    #[error("session token could not be issued: {0}")]
    SessionToken(#[from] jsonwebtoken::errors::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                Html(status_page("404 - Page not found", "There is nothing here.")),
            )
                .into_response(),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                Html(status_page(
                    "403 - Forbidden",
                    "You do not have permission to do that.",
                )),
            )
                .into_response(),
            AppError::LoginRequired => Redirect::to("/login").into_response(),
            internal => {
                tracing::error!(error = %internal, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html(status_page(
                        "500 - Something went wrong",
                        "Please try again later.",
                    )),
                )
                    .into_response()
            }
        }
    }
}

// Error pages are static so they render even when the template engine is the failure.
fn status_page(title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{message}</p><p><a href=\"/\">Back to all posts</a></p></body></html>"
    )
}
