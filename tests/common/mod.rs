#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use inkpost::{
    AppConfig, AppState, Views, create_router,
    auth::ensure_admin,
    config::AdminSeed,
    models::{Comment, CommentView, NewComment, NewPost, NewUser, Post, PostChanges, Role, User},
    repository::{RepoError, Repository, RepositoryState},
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-pw";
pub const ADMIN_NAME: &str = "Angela";

// --- In-memory Repository ---

#[derive(Default)]
struct Store {
    users: Vec<User>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
    next_user_id: i32,
    next_post_id: i32,
    next_comment_id: i32,
}

/// Behaves like the Postgres schema: serial ids, unique email and title,
/// a single admin (the first account while none exists), comments cascade
/// with their post.
#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
    broken: AtomicBool,
}

impl InMemoryRepository {
    /// Every later call fails as if the database went away.
    pub fn break_store(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn users(&self) -> Vec<User> {
        self.store.lock().unwrap().users.clone()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.store.lock().unwrap().posts.clone()
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.store.lock().unwrap().comments.clone()
    }

    fn check(&self) -> Result<(), RepoError> {
        if self.broken.load(Ordering::SeqCst) {
            Err(RepoError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: i32) -> Result<Option<User>, RepoError> {
        self.check()?;
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        self.check()?;
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_admin(&self) -> Result<Option<User>, RepoError> {
        self.check()?;
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|u| u.is_admin()).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        if store.users.iter().any(|u| u.email == user.email) {
            return Err(RepoError::Duplicate("email"));
        }
        let has_admin = store.users.iter().any(User::is_admin);
        if has_admin && user.role == Role::Admin {
            return Err(RepoError::Duplicate("admin"));
        }
        let role = if has_admin { user.role } else { Role::Admin };
        store.next_user_id += 1;
        let created = User {
            id: store.next_user_id,
            email: user.email,
            password: user.password_hash,
            name: user.name,
            role,
        };
        store.users.push(created.clone());
        Ok(created)
    }

    async fn list_posts(&self) -> Result<Vec<Post>, RepoError> {
        self.check()?;
        Ok(self.store.lock().unwrap().posts.clone())
    }

    async fn get_post(&self, id: i32) -> Result<Option<Post>, RepoError> {
        self.check()?;
        let store = self.store.lock().unwrap();
        Ok(store.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, RepoError> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        if store.posts.iter().any(|p| p.title == post.title) {
            return Err(RepoError::Duplicate("title"));
        }
        store.next_post_id += 1;
        let created = Post {
            id: store.next_post_id,
            author_id: post.author_id,
            author: post.author,
            title: post.title,
            subtitle: post.subtitle,
            date: post.date,
            body: post.body,
            img_url: post.img_url,
        };
        store.posts.push(created.clone());
        Ok(created)
    }

    async fn update_post(&self, id: i32, changes: PostChanges) -> Result<Option<Post>, RepoError> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        if store
            .posts
            .iter()
            .any(|p| p.id != id && p.title == changes.title)
        {
            return Err(RepoError::Duplicate("title"));
        }
        let Some(post) = store.posts.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        post.title = changes.title;
        post.subtitle = changes.subtitle;
        post.body = changes.body;
        post.img_url = changes.img_url;
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, id: i32) -> Result<bool, RepoError> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        let before = store.posts.len();
        store.posts.retain(|p| p.id != id);
        let deleted = store.posts.len() != before;
        if deleted {
            store.comments.retain(|c| c.posts_id != id);
        }
        Ok(deleted)
    }

    async fn list_comments(&self, post_id: i32) -> Result<Vec<CommentView>, RepoError> {
        self.check()?;
        let store = self.store.lock().unwrap();
        Ok(store
            .comments
            .iter()
            .filter(|c| c.posts_id == post_id)
            .filter_map(|c| {
                store.users.iter().find(|u| u.id == c.author_id).map(|u| CommentView {
                    id: c.id,
                    posts_id: c.posts_id,
                    text: c.text.clone(),
                    author_id: u.id,
                    author_name: u.name.clone(),
                    author_email: u.email.clone(),
                })
            })
            .collect())
    }

    async fn add_comment(&self, comment: NewComment) -> Result<Comment, RepoError> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        store.next_comment_id += 1;
        let created = Comment {
            id: store.next_comment_id,
            author_id: comment.author_id,
            posts_id: comment.posts_id,
            text: comment.text,
        };
        store.comments.push(created.clone());
        Ok(created)
    }
}

// --- State Helpers ---

pub fn test_state(repo: Arc<InMemoryRepository>) -> AppState {
    AppState {
        repo: repo as RepositoryState,
        config: AppConfig::default(),
        views: Arc::new(Views::new().expect("templates compile")),
    }
}

/// Seeds the administrator into an empty store, so it becomes user id 1.
pub async fn seed_admin(repo: &InMemoryRepository) -> User {
    let seed = AdminSeed {
        email: ADMIN_EMAIL.to_string(),
        password: ADMIN_PASSWORD.to_string(),
        name: ADMIN_NAME.to_string(),
    };
    ensure_admin(repo, &seed)
        .await
        .expect("seeding works")
        .expect("admin was created")
}

// --- Cookie-aware Test Client ---

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub set_cookies: Vec<String>,
    pub body: String,
}

impl TestResponse {
    pub fn assert_redirect(&self, to: &str) {
        assert_eq!(self.status, StatusCode::SEE_OTHER, "body: {}", self.body);
        assert_eq!(self.location.as_deref(), Some(to));
    }
}

/// Drives the real router through `oneshot`, keeping cookies between calls
/// like a browser would.
pub struct TestClient {
    router: Router,
    jar: HashMap<String, String>,
}

impl TestClient {
    pub fn new(state: AppState) -> Self {
        Self {
            router: create_router(state),
            jar: HashMap::new(),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.jar.get(name).map(String::as_str)
    }

    pub async fn get(&mut self, path: &str) -> TestResponse {
        let request = self
            .request("GET", path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Posts a form with the CSRF token the browser holds, fetching one first if needed.
    pub async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        if self.cookie("csrf_token").is_none() {
            self.get("/login").await;
        }
        let token = self.cookie("csrf_token").unwrap_or_default().to_string();
        let mut all: Vec<(&str, &str)> = fields.to_vec();
        all.push(("csrf_token", token.as_str()));
        self.post_form_raw(path, &all).await
    }

    /// Posts exactly `fields`, no CSRF token added.
    pub async fn post_form_raw(&mut self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = self
            .request("POST", path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn register(&mut self, email: &str, password: &str, name: &str) -> TestResponse {
        self.post_form(
            "/register",
            &[("email", email), ("password", password), ("name", name)],
        )
        .await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> TestResponse {
        self.post_form("/login", &[("email", email), ("password", password)])
            .await
    }

    pub async fn create_post(&mut self, title: &str) -> TestResponse {
        self.post_form(
            "/new-post",
            &[
                ("title", title),
                ("subtitle", "A subtitle"),
                ("img_url", "https://images.example.com/cover.jpg"),
                ("body", "<p>Some words.</p>"),
            ],
        )
        .await
    }

    fn request(&self, method: &str, path: &str) -> axum::http::request::Builder {
        let mut builder = Request::builder().method(method).uri(path);
        if !self.jar.is_empty() {
            let cookies = self
                .jar
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookies);
        }
        builder
    }

    async fn send(&mut self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();

        for cookie in &set_cookies {
            self.store_cookie(cookie);
        }

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        TestResponse {
            status,
            location,
            set_cookies,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }

    fn store_cookie(&mut self, set_cookie: &str) {
        let mut parts = set_cookie.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.trim().split_once('=')) else {
            return;
        };
        let expired = parts.any(|attr| attr.trim() == "Max-Age=0");
        if expired || value.is_empty() {
            self.jar.remove(name);
        } else {
            self.jar.insert(name.to_string(), value.to_string());
        }
    }
}
