//! Submitted HTML forms and their validation rules.
//!
//! Each form deserializes straight from `application/x-www-form-urlencoded`
//! and cleans itself into a typed value or a set of per-field errors.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::LazyLock};

use crate::auth::Session;

/// Widest value the single-line columns accept.
pub const MAX_FIELD_LEN: usize = 250;

pub const CSRF_FIELD: &str = "csrf_token";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9._%+-]*[a-zA-Z0-9])?@[a-zA-Z0-9]([a-zA-Z0-9.-]*[a-zA-Z0-9])?\.[a-zA-Z]{2,}$",
    )
    .expect("email pattern is a valid regex")
});

/// FormErrors
///
/// Field name to message. Only the first problem per field is kept.
#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct FormErrors(BTreeMap<&'static str, String>);

impl FormErrors {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn finish<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// A submitted form that can be cleaned into `Output`.
pub trait FormInput {
    type Output;

    fn csrf_token(&self) -> &str;

    fn clean(&self) -> Result<Self::Output, FormErrors>;
}

/// Cleans a form and checks its CSRF token against the session.
pub fn validate<F: FormInput>(session: &Session, form: &F) -> Result<F::Output, FormErrors> {
    let cleaned = form.clean();
    if session.verify_csrf(form.csrf_token()) {
        return cleaned;
    }

    let mut errors = cleaned.err().unwrap_or_default();
    errors.add(
        CSRF_FIELD,
        "This form has expired. Please submit it again.",
    );
    Err(errors)
}

// --- Field rules ---

fn required_line(errors: &mut FormErrors, field: &'static str, label: &str, raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        errors.add(field, format!("{label} is required."));
    } else if value.chars().count() > MAX_FIELD_LEN {
        errors.add(
            field,
            format!("{label} must be at most {MAX_FIELD_LEN} characters."),
        );
    }
    value.to_string()
}

fn required_text(errors: &mut FormErrors, field: &'static str, label: &str, raw: &str) -> String {
    if raw.trim().is_empty() {
        errors.add(field, format!("{label} is required."));
    }
    raw.to_string()
}

fn email(errors: &mut FormErrors, raw: &str) -> String {
    let value = required_line(errors, "email", "Email", raw);
    if !value.is_empty() && !EMAIL_PATTERN.is_match(&value) {
        errors.add("email", "Enter a valid email address.");
    }
    value
}

fn web_url(errors: &mut FormErrors, field: &'static str, label: &str, raw: &str) -> String {
    let value = required_line(errors, field, label, raw);
    if !value.is_empty() {
        let valid = url::Url::parse(&value)
            .map(|parsed| {
                matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
            })
            .unwrap_or(false);
        if !valid {
            errors.add(field, format!("{label} must be a valid http(s) URL."));
        }
    }
    value
}

fn password(errors: &mut FormErrors, raw: &str) -> String {
    if raw.is_empty() {
        errors.add("password", "Password is required.");
    }
    raw.to_string()
}

// --- Forms ---

/// Registration. The password is never echoed back into the page.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RegisterForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl FormInput for RegisterForm {
    type Output = Registration;

    fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    fn clean(&self) -> Result<Registration, FormErrors> {
        let mut errors = FormErrors::default();
        let email = email(&mut errors, &self.email);
        let password = password(&mut errors, &self.password);
        let name = required_line(&mut errors, "name", "Name", &self.name);
        errors.finish(Registration {
            email,
            password,
            name,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl FormInput for LoginForm {
    type Output = Credentials;

    fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    fn clean(&self) -> Result<Credentials, FormErrors> {
        let mut errors = FormErrors::default();
        let email = email(&mut errors, &self.email);
        let password = password(&mut errors, &self.password);
        errors.finish(Credentials { email, password })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CommentForm {
    pub comment: String,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

impl FormInput for CommentForm {
    type Output = String;

    fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    fn clean(&self) -> Result<String, FormErrors> {
        let mut errors = FormErrors::default();
        let text = required_text(&mut errors, "comment", "Comment", &self.comment);
        errors.finish(text)
    }
}

/// Shared by the new-post and edit-post pages.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PostForm {
    pub title: String,
    pub subtitle: String,
    pub img_url: String,
    pub body: String,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostFields {
    pub title: String,
    pub subtitle: String,
    pub img_url: String,
    pub body: String,
}

impl PostForm {
    /// Pre-fills the edit page from a stored post.
    pub fn from_post(post: &crate::models::Post) -> Self {
        Self {
            title: post.title.clone(),
            subtitle: post.subtitle.clone(),
            img_url: post.img_url.clone(),
            body: post.body.clone(),
            csrf_token: String::new(),
        }
    }
}

impl FormInput for PostForm {
    type Output = PostFields;

    fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    fn clean(&self) -> Result<PostFields, FormErrors> {
        let mut errors = FormErrors::default();
        let title = required_line(&mut errors, "title", "Blog post title", &self.title);
        let subtitle = required_line(&mut errors, "subtitle", "Subtitle", &self.subtitle);
        let img_url = web_url(&mut errors, "img_url", "Blog image URL", &self.img_url);
        let body = required_text(&mut errors, "body", "Blog content", &self.body);
        errors.finish(PostFields {
            title,
            subtitle,
            img_url,
            body,
        })
    }
}
