//! Cookie plumbing for the browser session: reading the `Cookie` header,
//! building `Set-Cookie` values, one-shot flash messages and CSRF tokens.

use axum::http::{HeaderMap, HeaderValue, header};
use uuid::Uuid;

use crate::{config::AppConfig, error::AppError};

pub const SESSION_COOKIE: &str = "session";
pub const FLASH_COOKIE: &str = "flash";
pub const CSRF_COOKIE: &str = "csrf_token";

/// Flash
///
/// A user-visible message carried to the next rendered page. Only the code
/// travels in the cookie; the text lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    AlreadyRegistered,
    UnknownEmail,
    WrongPassword,
    LoginToComment,
}

impl Flash {
    pub fn code(&self) -> &'static str {
        match self {
            Flash::AlreadyRegistered => "already-registered",
            Flash::UnknownEmail => "unknown-email",
            Flash::WrongPassword => "wrong-password",
            Flash::LoginToComment => "login-to-comment",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "already-registered" => Some(Flash::AlreadyRegistered),
            "unknown-email" => Some(Flash::UnknownEmail),
            "wrong-password" => Some(Flash::WrongPassword),
            "login-to-comment" => Some(Flash::LoginToComment),
            _ => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Flash::AlreadyRegistered => "You've already signed up with that email. Log in instead.",
            Flash::UnknownEmail => "This email does not exist. Try again!",
            Flash::WrongPassword => "Your password is incorrect. Try again.",
            Flash::LoginToComment => "Please log in to comment.",
        }
    }
}

/// Finds a cookie by name across every `Cookie` header of the request.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Builds a `Set-Cookie` value. `max_age` of `None` makes a browser-session cookie.
pub fn set_cookie(
    config: &AppConfig,
    name: &str,
    value: &str,
    max_age: Option<i64>,
) -> Result<HeaderValue, AppError> {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax");
    if let Some(seconds) = max_age {
        cookie.push_str(&format!("; Max-Age={seconds}"));
    }
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    Ok(HeaderValue::from_str(&cookie)?)
}

pub fn clear_cookie(config: &AppConfig, name: &str) -> Result<HeaderValue, AppError> {
    set_cookie(config, name, "", Some(0))
}

pub fn flash_cookie(config: &AppConfig, flash: Flash) -> Result<HeaderValue, AppError> {
    set_cookie(config, FLASH_COOKIE, flash.code(), None)
}

pub fn new_csrf_token() -> String {
    Uuid::new_v4().simple().to_string()
}
