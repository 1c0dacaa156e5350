use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderValue, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AdminSeed, AppConfig},
    error::AppError,
    models::{NewUser, Role, User},
    repository::{RepoError, Repository, RepositoryState},
    session::{self, CSRF_COOKIE, FLASH_COOKIE, Flash, SESSION_COOKIE},
};

/// Claims
///
/// Payload of the signed session cookie. `sub` is the user id as a string.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// Signs a session token for `user_id` and wraps it in a `Set-Cookie` value.
pub fn issue_session(config: &AppConfig, user_id: i32) -> Result<HeaderValue, AppError> {
    let now = Utc::now();
    let ttl = Duration::hours(config.session_ttl_hours);
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.session_secret.as_bytes()),
    )?;
    session::set_cookie(config, SESSION_COOKIE, &token, Some(ttl.num_seconds()))
}

/// Resolves a session token to a user id. Bad signature, expiry and garbage all yield `None`.
pub fn session_user_id(config: &AppConfig, token: &str) -> Option<i32> {
    let key = DecodingKey::from_secret(config.session_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    match decode::<Claims>(token, &key, &validation) {
        Ok(data) => data.claims.sub.parse().ok(),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring invalid session cookie");
            None
        }
    }
}

/// Session
///
/// The request-scoped context every page handler receives: who is logged in,
/// the flash message waiting to be shown, and the CSRF token forms must echo.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: Option<User>,
    /// Message carried over from the previous response.
    pub flash: Option<Flash>,
    /// Message raised while handling this request; shown in place of `flash`.
    pub notice: Option<Flash>,
    pub csrf_token: String,
    csrf_issued: bool,
}

impl Session {
    /// A visitor with no cookies at all.
    #[cfg(test)]
    pub(crate) fn anonymous() -> Self {
        Self {
            user: None,
            flash: None,
            notice: None,
            csrf_token: session::new_csrf_token(),
            csrf_issued: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(User::is_admin)
    }

    pub fn notify(&mut self, flash: Flash) {
        self.notice = Some(flash);
    }

    pub fn message(&self) -> Option<Flash> {
        self.notice.or(self.flash)
    }

    /// A token minted during this request cannot have been submitted by the form.
    pub fn verify_csrf(&self, submitted: &str) -> bool {
        !self.csrf_issued && !submitted.is_empty() && submitted == self.csrf_token
    }

    /// Cookies a rendered page must send back: consume the flash, persist a fresh CSRF token.
    pub fn page_cookies(&self, config: &AppConfig) -> Result<Vec<HeaderValue>, AppError> {
        let mut cookies = Vec::new();
        if self.flash.is_some() {
            cookies.push(session::clear_cookie(config, FLASH_COOKIE)?);
        }
        if self.csrf_issued {
            cookies.push(session::set_cookie(config, CSRF_COOKIE, &self.csrf_token, None)?);
        }
        Ok(cookies)
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // A valid token for a user that no longer exists is just an anonymous visit.
        let user = match session::read_cookie(&parts.headers, SESSION_COOKIE)
            .and_then(|token| session_user_id(&config, &token))
        {
            Some(user_id) => repo.get_user(user_id).await?,
            None => None,
        };

        let flash = session::read_cookie(&parts.headers, FLASH_COOKIE)
            .and_then(|code| Flash::from_code(&code));

        let (csrf_token, csrf_issued) = match session::read_cookie(&parts.headers, CSRF_COOKIE) {
            Some(token) => (token, false),
            None => (session::new_csrf_token(), true),
        };

        Ok(Session {
            user,
            flash,
            notice: None,
            csrf_token,
            csrf_issued,
        })
    }
}

/// AdminSession
///
/// Guard for the post-management pages. Anonymous visitors are redirected to
/// the login page; logged-in non-admins get a 403.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub session: Session,
    pub admin: User,
}

impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;

        match session.user.clone() {
            None => Err(AppError::LoginRequired),
            Some(user) if !user.is_admin() => {
                tracing::warn!(user_id = user.id, path = %parts.uri.path(), "non-admin denied");
                Err(AppError::Forbidden)
            }
            Some(admin) => Ok(AdminSession { session, admin }),
        }
    }
}

// --- Password hashing ---

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Password(e.to_string()))
}

/// An unparsable stored hash is treated as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "stored password hash is malformed");
            false
        }
    }
}

/// ensure_admin
///
/// Creates the configured administrator unless an account with that email
/// already exists or another account already holds the admin role. Returns
/// the account when it was created.
pub async fn ensure_admin(
    repo: &dyn Repository,
    seed: &AdminSeed,
) -> Result<Option<User>, AppError> {
    if let Some(existing) = repo.find_user_by_email(&seed.email).await? {
        if !existing.is_admin() {
            tracing::warn!(
                user_id = existing.id,
                "configured admin email belongs to a non-admin account"
            );
        }
        return Ok(None);
    }

    if let Some(admin) = repo.find_admin().await? {
        tracing::warn!(
            admin_id = admin.id,
            "an administrator already exists; not seeding the configured admin"
        );
        return Ok(None);
    }

    let new_admin = NewUser {
        email: seed.email.clone(),
        password_hash: hash_password(&seed.password)?,
        name: seed.name.clone(),
        role: Role::Admin,
    };

    match repo.create_user(new_admin).await {
        Ok(user) => {
            tracing::info!(user_id = user.id, "seeded administrator account");
            Ok(Some(user))
        }
        // Lost a race for the email or the admin role.
        Err(RepoError::Duplicate(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
