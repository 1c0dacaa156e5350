//! Server-side rendering with Tera.
//!
//! Templates are compiled into the binary and share `base.html`. Every page
//! gets the session basics (`authenticated`, `admin`, `current_user`, `flash`,
//! `csrf_token`) on top of whatever the handler supplies.

use axum::{
    http::header,
    response::{AppendHeaders, Html, IntoResponse, Response},
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::{collections::HashMap, sync::Arc};
use tera::{Context, Tera};

use crate::{auth::Session, config::AppConfig, error::AppError};

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("index.html", include_str!("../templates/index.html")),
    ("post.html", include_str!("../templates/post.html")),
    ("make-post.html", include_str!("../templates/make-post.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("about.html", include_str!("../templates/about.html")),
    ("contact.html", include_str!("../templates/contact.html")),
];

const AVATAR_SIZE: u32 = 100;

/// ViewState
///
/// The shared, read-only template engine.
pub type ViewState = Arc<Views>;

pub struct Views {
    tera: Tera,
}

impl Views {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        tera.register_filter("gravatar", gravatar_filter);
        Ok(Self { tera })
    }

    /// Renders `template` as a full page and attaches the cookies the session owes the browser.
    pub fn render(
        &self,
        template: &str,
        mut context: Context,
        session: &Session,
        config: &AppConfig,
    ) -> Result<Response, AppError> {
        context.insert("authenticated", &session.is_authenticated());
        context.insert("admin", &session.is_admin());
        context.insert("current_user", &session.user);
        context.insert("flash", &session.message().map(|flash| flash.message()));
        context.insert("csrf_token", &session.csrf_token);

        let html = self.tera.render(template, &context)?;
        let cookies = session.page_cookies(config)?;
        let headers = cookies.into_iter().map(|cookie| (header::SET_COOKIE, cookie));

        Ok((AppendHeaders(headers), Html(html)).into_response())
    }
}

/// gravatar_url
///
/// Avatar image for an email address. Deterministic; nothing is fetched.
pub fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    format!(
        "https://www.gravatar.com/avatar/{}?s={AVATAR_SIZE}&d=retro&r=x",
        hex::encode(digest)
    )
}

fn gravatar_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let email = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("gravatar filter expects an email string"))?;
    Ok(Value::String(gravatar_url(email)))
}
