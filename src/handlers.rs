use crate::{
    AppState,
    auth::{self, AdminSession, Session},
    error::AppError,
    forms::{self, CommentForm, FormErrors, LoginForm, PostForm, RegisterForm},
    models::{self, NewComment, NewPost, NewUser, Post, PostChanges, Role},
    repository::RepoError,
    session::{self, Flash, SESSION_COOKIE},
};
use axum::{
    Form,
    extract::{Path, State},
    http::{HeaderValue, header},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use chrono::Local;
use tera::Context;

const DUPLICATE_TITLE: &str = "A post with this title already exists.";

// --- Helpers ---

/// A 303 redirect carrying `Set-Cookie` headers.
fn redirect_with(to: &str, cookies: Vec<HeaderValue>) -> Response {
    let headers = cookies.into_iter().map(|cookie| (header::SET_COOKIE, cookie));
    (AppendHeaders(headers), Redirect::to(to)).into_response()
}

async fn load_post(state: &AppState, post_id: i32) -> Result<Post, AppError> {
    state.repo.get_post(post_id).await?.ok_or(AppError::NotFound)
}

fn render_register(
    state: &AppState,
    session: &Session,
    form: &RegisterForm,
    errors: &FormErrors,
) -> Result<Response, AppError> {
    let mut context = Context::new();
    context.insert("form", form);
    context.insert("errors", errors);
    state
        .views
        .render("register.html", context, session, &state.config)
}

fn render_login(
    state: &AppState,
    session: &Session,
    form: &LoginForm,
    errors: &FormErrors,
) -> Result<Response, AppError> {
    let mut context = Context::new();
    context.insert("form", form);
    context.insert("errors", errors);
    state
        .views
        .render("login.html", context, session, &state.config)
}

async fn render_post(
    state: &AppState,
    session: &Session,
    post: &Post,
    form: &CommentForm,
    errors: &FormErrors,
) -> Result<Response, AppError> {
    let comments = state.repo.list_comments(post.id).await?;

    let mut context = Context::new();
    context.insert("post", post);
    context.insert("comments", &comments);
    context.insert("form", form);
    context.insert("errors", errors);
    state
        .views
        .render("post.html", context, session, &state.config)
}

fn render_post_editor(
    state: &AppState,
    session: &Session,
    heading: &str,
    action: &str,
    form: &PostForm,
    errors: &FormErrors,
) -> Result<Response, AppError> {
    let mut context = Context::new();
    context.insert("heading", heading);
    context.insert("action", action);
    context.insert("form", form);
    context.insert("errors", errors);
    state
        .views
        .render("make-post.html", context, session, &state.config)
}

fn already_registered(state: &AppState) -> Result<Response, AppError> {
    let flash = session::flash_cookie(&state.config, Flash::AlreadyRegistered)?;
    Ok(redirect_with("/login", vec![flash]))
}

// --- Handlers ---

/// get_all_posts
///
/// [Public Route] The home page: every post in insertion order.
pub async fn get_all_posts(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let posts = state.repo.list_posts().await?;

    let mut context = Context::new();
    context.insert("posts", &posts);
    state
        .views
        .render("index.html", context, &session, &state.config)
}

pub async fn register_page(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    render_register(&state, &session, &RegisterForm::default(), &FormErrors::default())
}

/// register
///
/// [Public Route] Creates an account and logs it in. An email that is already
/// taken sends the visitor to the login page with a flash instead.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    let registration = match forms::validate(&session, &form) {
        Ok(registration) => registration,
        Err(errors) => return render_register(&state, &session, &form, &errors),
    };

    if state
        .repo
        .find_user_by_email(&registration.email)
        .await?
        .is_some()
    {
        return already_registered(&state);
    }

    let new_user = NewUser {
        email: registration.email,
        password_hash: auth::hash_password(&registration.password)?,
        name: registration.name,
        role: Role::Reader,
    };

    // The pre-check can lose a race; the unique constraint still wins.
    let user = match state.repo.create_user(new_user).await {
        Ok(user) => user,
        Err(RepoError::Duplicate(_)) => return already_registered(&state),
        Err(e) => return Err(e.into()),
    };

    tracing::info!(user_id = user.id, role = %user.role, "registered new user");
    let cookie = auth::issue_session(&state.config, user.id)?;
    Ok(redirect_with("/", vec![cookie]))
}

pub async fn login_page(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    render_login(&state, &session, &LoginForm::default(), &FormErrors::default())
}

/// login
///
/// [Public Route] Checks credentials. Unknown email and wrong password both
/// re-render the form with a message and leave the visitor logged out.
pub async fn login(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let credentials = match forms::validate(&session, &form) {
        Ok(credentials) => credentials,
        Err(errors) => return render_login(&state, &session, &form, &errors),
    };

    let Some(user) = state.repo.find_user_by_email(&credentials.email).await? else {
        session.notify(Flash::UnknownEmail);
        return render_login(&state, &session, &form, &FormErrors::default());
    };

    if !auth::verify_password(&credentials.password, &user.password) {
        tracing::info!(user_id = user.id, "login rejected: wrong password");
        session.notify(Flash::WrongPassword);
        return render_login(&state, &session, &form, &FormErrors::default());
    }

    tracing::info!(user_id = user.id, "user logged in");
    let cookie = auth::issue_session(&state.config, user.id)?;
    Ok(redirect_with("/", vec![cookie]))
}

/// logout
///
/// [Public Route] Drops the session cookie. Harmless without a session.
pub async fn logout(State(state): State<AppState>) -> Result<Response, AppError> {
    let cookie = session::clear_cookie(&state.config, SESSION_COOKIE)?;
    Ok(redirect_with("/", vec![cookie]))
}

/// show_post
///
/// [Public Route] A post with its comments and the comment form.
pub async fn show_post(
    State(state): State<AppState>,
    session: Session,
    Path(post_id): Path<i32>,
) -> Result<Response, AppError> {
    let post = load_post(&state, post_id).await?;
    render_post(
        &state,
        &session,
        &post,
        &CommentForm::default(),
        &FormErrors::default(),
    )
    .await
}

/// add_comment
///
/// [Public Route] Anonymous visitors are sent to the login page before the
/// form is even looked at; nothing is stored for them.
pub async fn add_comment(
    State(state): State<AppState>,
    session: Session,
    Path(post_id): Path<i32>,
    Form(form): Form<CommentForm>,
) -> Result<Response, AppError> {
    let post = load_post(&state, post_id).await?;

    let Some(author_id) = session.user.as_ref().map(|user| user.id) else {
        let flash = session::flash_cookie(&state.config, Flash::LoginToComment)?;
        return Ok(redirect_with("/login", vec![flash]));
    };

    let text = match forms::validate(&session, &form) {
        Ok(text) => text,
        Err(errors) => return render_post(&state, &session, &post, &form, &errors).await,
    };

    let comment = state
        .repo
        .add_comment(NewComment {
            author_id,
            posts_id: post.id,
            text,
        })
        .await?;

    tracing::debug!(comment_id = comment.id, post_id = post.id, "comment added");
    Ok(Redirect::to(&format!("/post/{}", post.id)).into_response())
}

pub async fn about(State(state): State<AppState>, session: Session) -> Result<Response, AppError> {
    state
        .views
        .render("about.html", Context::new(), &session, &state.config)
}

pub async fn contact(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    state
        .views
        .render("contact.html", Context::new(), &session, &state.config)
}

// --- Admin Handlers ---

pub async fn new_post_page(
    State(state): State<AppState>,
    AdminSession { session, .. }: AdminSession,
) -> Result<Response, AppError> {
    render_post_editor(
        &state,
        &session,
        "New Post",
        "/new-post",
        &PostForm::default(),
        &FormErrors::default(),
    )
}

/// create_post
///
/// [Admin Route] Publishes a post dated today, signed with the admin's
/// current display name.
pub async fn create_post(
    State(state): State<AppState>,
    AdminSession { session, admin }: AdminSession,
    Form(form): Form<PostForm>,
) -> Result<Response, AppError> {
    let fields = match forms::validate(&session, &form) {
        Ok(fields) => fields,
        Err(errors) => {
            return render_post_editor(&state, &session, "New Post", "/new-post", &form, &errors);
        }
    };

    let new_post = NewPost {
        author_id: admin.id,
        author: admin.name.clone(),
        title: fields.title,
        subtitle: fields.subtitle,
        date: models::display_date(Local::now().date_naive()),
        body: fields.body,
        img_url: fields.img_url,
    };

    match state.repo.create_post(new_post).await {
        Ok(post) => {
            tracing::info!(post_id = post.id, user_id = admin.id, "post created");
            Ok(Redirect::to("/").into_response())
        }
        Err(RepoError::Duplicate(_)) => {
            let errors = FormErrors::single("title", DUPLICATE_TITLE);
            render_post_editor(&state, &session, "New Post", "/new-post", &form, &errors)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn edit_post_page(
    State(state): State<AppState>,
    AdminSession { session, .. }: AdminSession,
    Path(post_id): Path<i32>,
) -> Result<Response, AppError> {
    let post = load_post(&state, post_id).await?;
    render_post_editor(
        &state,
        &session,
        "Edit Post",
        &format!("/edit-post/{}", post.id),
        &PostForm::from_post(&post),
        &FormErrors::default(),
    )
}

/// update_post
///
/// [Admin Route] Rewrites title, subtitle, image and body in place. The
/// author snapshot and the date stay as they were.
pub async fn update_post(
    State(state): State<AppState>,
    AdminSession { session, admin }: AdminSession,
    Path(post_id): Path<i32>,
    Form(form): Form<PostForm>,
) -> Result<Response, AppError> {
    let post = load_post(&state, post_id).await?;
    let action = format!("/edit-post/{}", post.id);

    let fields = match forms::validate(&session, &form) {
        Ok(fields) => fields,
        Err(errors) => {
            return render_post_editor(&state, &session, "Edit Post", &action, &form, &errors);
        }
    };

    let changes = PostChanges {
        title: fields.title,
        subtitle: fields.subtitle,
        body: fields.body,
        img_url: fields.img_url,
    };

    match state.repo.update_post(post.id, changes).await {
        Ok(Some(updated)) => {
            tracing::info!(post_id = updated.id, user_id = admin.id, "post updated");
            Ok(Redirect::to(&format!("/post/{}", updated.id)).into_response())
        }
        // Deleted between the load and the update.
        Ok(None) => Err(AppError::NotFound),
        Err(RepoError::Duplicate(_)) => {
            let errors = FormErrors::single("title", DUPLICATE_TITLE);
            render_post_editor(&state, &session, "Edit Post", &action, &form, &errors)
        }
        Err(e) => Err(e.into()),
    }
}

/// delete_post
///
/// [Admin Route] Removes a post together with its comments.
pub async fn delete_post(
    State(state): State<AppState>,
    AdminSession { admin, .. }: AdminSession,
    Path(post_id): Path<i32>,
) -> Result<Response, AppError> {
    if !state.repo.delete_post(post_id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(post_id, user_id = admin.id, "post deleted");
    Ok(Redirect::to("/").into_response())
}
