use chrono::NaiveDate;
use serde::Serialize;
use sqlx::FromRow;
use std::fmt;

// --- Core Application Schemas (Mapped to Database) ---

/// Role
///
/// Explicit authorization attribute of a user. Only `Admin` may create, edit
/// or delete posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Reader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Reader => "reader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `users.role` value that is neither `admin` nor `reader`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "admin" => Ok(Role::Admin),
            "reader" => Ok(Role::Reader),
            _ => Err(UnknownRole(value)),
        }
    }
}

/// User
///
/// A registered account from the `users` table. `password` holds the Argon2
/// PHC string and is never serialized into templates.
#[derive(Debug, Clone, Serialize, FromRow, Default)]
pub struct User {
    pub id: i32,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Post
///
/// A blog post from the `blog_posts` table.
///
/// `author` is a snapshot of the author's display name taken when the post was
/// created; it is not refreshed afterwards. `date` is a display string and is
/// never parsed back.
#[derive(Debug, Clone, Serialize, FromRow, Default, PartialEq)]
pub struct Post {
    pub id: i32,
    pub author_id: i32,
    pub author: String,
    pub title: String,
    pub subtitle: String,
    pub date: String,
    pub body: String,
    pub img_url: String,
}

/// Comment
///
/// A reader comment attached to a post.
#[derive(Debug, Clone, Serialize, FromRow, Default, PartialEq)]
pub struct Comment {
    pub id: i32,
    pub author_id: i32,
    pub posts_id: i32,
    pub text: String,
}

/// CommentView
///
/// A comment joined with its author, as shown under a post.
#[derive(Debug, Clone, Serialize, FromRow, Default, PartialEq)]
pub struct CommentView {
    pub id: i32,
    pub posts_id: i32,
    pub text: String,
    pub author_id: i32,
    pub author_name: String,
    pub author_email: String,
}

// --- Write Payloads ---

/// Input for creating a user. `password_hash` must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
}

/// Input for creating a post. `author` and `date` are fixed here for the post's lifetime.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: i32,
    pub author: String,
    pub title: String,
    pub subtitle: String,
    pub date: String,
    pub body: String,
    pub img_url: String,
}

/// The fields an edit may change.
#[derive(Debug, Clone)]
pub struct PostChanges {
    pub title: String,
    pub subtitle: String,
    pub body: String,
    pub img_url: String,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub author_id: i32,
    pub posts_id: i32,
    pub text: String,
}

/// Long-form display date stamped on new posts, e.g. "April 05, 2024".
pub fn display_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}
