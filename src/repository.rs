use crate::models::{Comment, CommentView, NewComment, NewPost, NewUser, Post, PostChanges, Role, User};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

/// RepoError
///
/// Failures surfaced by the persistence layer. A unique-constraint violation is
/// reported as `Duplicate` naming the offending field so handlers can turn it
/// into a form error; anything else is a store failure.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("a record with this {0} already exists")]
    Duplicate(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepoError {
    /// Maps a unique violation onto `Duplicate(field)`, leaves every other error untouched.
    /// The single-admin index reports as `Duplicate("admin")`.
    fn from_write(err: sqlx::Error, field: &'static str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                if db.constraint() == Some(SINGLE_ADMIN_INDEX) {
                    RepoError::Duplicate("admin")
                } else {
                    RepoError::Duplicate(field)
                }
            }
            _ => RepoError::Database(err),
        }
    }
}

/// Repository Trait
///
/// The contract for all persistence operations. Handlers only ever see
/// `Arc<dyn Repository>`, so tests can swap in an in-memory implementation.
///
/// Ordering: `list_posts` and `list_comments` return rows in insertion order.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i32) -> Result<Option<User>, RepoError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
    /// The single account holding `Role::Admin`, if any.
    async fn find_admin(&self) -> Result<Option<User>, RepoError>;
    /// Inserts a user. While no admin exists the new account is made `Admin`,
    /// whatever `user.role` says. Fails with `Duplicate("email")`, or with
    /// `Duplicate("admin")` when `user.role` is `Admin` and an admin exists.
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError>;

    // --- Posts ---
    async fn list_posts(&self) -> Result<Vec<Post>, RepoError>;
    async fn get_post(&self, id: i32) -> Result<Option<Post>, RepoError>;
    /// Fails with `Duplicate("title")`.
    async fn create_post(&self, post: NewPost) -> Result<Post, RepoError>;
    /// Returns `None` when the post does not exist. Fails with `Duplicate("title")`.
    async fn update_post(&self, id: i32, changes: PostChanges) -> Result<Option<Post>, RepoError>;
    /// Deletes the post and its comments. Returns false when nothing was deleted.
    async fn delete_post(&self, id: i32) -> Result<bool, RepoError>;

    // --- Comments ---
    async fn list_comments(&self, post_id: i32) -> Result<Vec<CommentView>, RepoError>;
    async fn add_comment(&self, comment: NewComment) -> Result<Comment, RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const SINGLE_ADMIN_INDEX: &str = "users_single_admin";

/// Idempotent schema, run once at startup.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id       SERIAL PRIMARY KEY,
    email    VARCHAR(250) NOT NULL UNIQUE,
    password VARCHAR(250) NOT NULL,
    name     VARCHAR(250) NOT NULL,
    role     VARCHAR(16)  NOT NULL DEFAULT 'reader'
);

CREATE TABLE IF NOT EXISTS blog_posts (
    id        SERIAL PRIMARY KEY,
    author_id INTEGER      NOT NULL REFERENCES users(id),
    author    VARCHAR(250) NOT NULL,
    title     VARCHAR(250) NOT NULL UNIQUE,
    subtitle  VARCHAR(250) NOT NULL,
    date      VARCHAR(250) NOT NULL,
    body      TEXT         NOT NULL,
    img_url   VARCHAR(250) NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    id        SERIAL PRIMARY KEY,
    author_id INTEGER NOT NULL REFERENCES users(id),
    posts_id  INTEGER NOT NULL REFERENCES blog_posts(id) ON DELETE CASCADE,
    text      TEXT    NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS users_single_admin ON users (role) WHERE role = 'admin';

CREATE INDEX IF NOT EXISTS comments_posts_id_idx ON comments (posts_id);
"#;

const POST_COLUMNS: &str = "id, author_id, author, title, subtitle, date, body, img_url";

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tables if they are absent. Safe to call on every startup.
    pub async fn init_schema(&self) -> Result<(), RepoError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// With `promote`, the row becomes `Admin` when no admin is visible yet.
    /// Two concurrent promotions both see none; `users_single_admin` rejects the later commit.
    async fn insert_user(&self, user: &NewUser, promote: bool) -> Result<User, RepoError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password, name, role)
            VALUES (
                $1, $2, $3,
                CASE
                    WHEN $5 AND NOT EXISTS (SELECT 1 FROM users WHERE role = $6) THEN $6
                    ELSE $4
                END
            )
            RETURNING id, email, password, name, role
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(promote)
        .bind(Role::Admin.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::from_write(e, "email"))
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: i32) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password, name, role FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password, name, role FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_admin(&self) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password, name, role FROM users WHERE role = $1 ORDER BY id LIMIT 1",
        )
        .bind(Role::Admin.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        match self.insert_user(&user, true).await {
            // Another first registration took the admin role between our check and commit.
            Err(RepoError::Duplicate("admin")) if user.role == Role::Reader => {
                self.insert_user(&user, false).await
            }
            result => result,
        }
    }

    async fn list_posts(&self) -> Result<Vec<Post>, RepoError> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM blog_posts ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn get_post(&self, id: i32) -> Result<Option<Post>, RepoError> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM blog_posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, RepoError> {
        sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO blog_posts (author_id, author, title, subtitle, date, body, img_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(post.author_id)
        .bind(&post.author)
        .bind(&post.title)
        .bind(&post.subtitle)
        .bind(&post.date)
        .bind(&post.body)
        .bind(&post.img_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::from_write(e, "title"))
    }

    /// Author and date are never rewritten.
    async fn update_post(&self, id: i32, changes: PostChanges) -> Result<Option<Post>, RepoError> {
        sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE blog_posts
            SET title = $2, subtitle = $3, body = $4, img_url = $5
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.subtitle)
        .bind(&changes.body)
        .bind(&changes.img_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::from_write(e, "title"))
    }

    async fn delete_post(&self, id: i32) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM blog_posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_comments(&self, post_id: i32) -> Result<Vec<CommentView>, RepoError> {
        let comments = sqlx::query_as::<_, CommentView>(
            r#"
            SELECT c.id, c.posts_id, c.text, c.author_id,
                   u.name AS author_name, u.email AS author_email
            FROM comments c
            JOIN users u ON u.id = c.author_id
            WHERE c.posts_id = $1
            ORDER BY c.id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn add_comment(&self, comment: NewComment) -> Result<Comment, RepoError> {
        let created = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (author_id, posts_id, text)
            VALUES ($1, $2, $3)
            RETURNING id, author_id, posts_id, text
            "#,
        )
        .bind(comment.author_id)
        .bind(comment.posts_id)
        .bind(&comment.text)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }
}
