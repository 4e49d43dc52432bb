use super::password;
use crate::{
    auth::{self, ExtractAuth, Principal, SharedSessions},
    config::Config,
    email::Mailer,
    error::{db_error, AppError, AppResult},
    models::User,
    schema::*,
    DbPool,
};
use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use lettre::message::Mailbox;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

lazy_static::lazy_static! {
    static ref CAMPUS_EMAIL: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@banasthali\.in$").expect("invalid campus email pattern");
}

const MIN_PASSWORD_LEN: usize = 5;

// one day, or two weeks when remembered
const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const REMEMBERED_SESSION_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    username: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<MessageResponse> {
        Json(MessageResponse {
            message: message.into(),
        })
    }
}

/// Every problem with a registration, in the order they are reported.
fn registration_problems(
    req: &RegisterRequest,
    username_taken: bool,
    email_taken: bool,
) -> Vec<String> {
    let mut problems = Vec::new();
    if !CAMPUS_EMAIL.is_match(&req.email) {
        problems.push("Only @banasthali.in emails are allowed for registration.".to_string());
    }
    if username_taken {
        problems.push("Username already exists.".to_string());
    }
    if email_taken {
        problems.push("Email already exists.".to_string());
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        problems.push("Password must be at least 5 characters.".to_string());
    }
    problems
}

async fn send_verification(mailer: &Mailer, config: &Config, user: &User) -> anyhow::Result<()> {
    let token = auth::make_verification_token(user, jsonwebtoken::get_current_timestamp())?;
    let link = config.site_link(&format!(
        "/api/auth/verify/{}/{}",
        auth::encode_uid(user.id),
        token
    ))?;

    let greeting = if user.first_name.is_empty() {
        &user.username
    } else {
        &user.first_name
    };
    let body = format!(
        "Hi {greeting},\n\nPlease verify your email by clicking the link below:\n{link}\n\nIf you did not request this, ignore this email."
    );

    let to = Mailbox::new(Some(user.username.clone()), user.email.parse()?);
    mailer
        .send_quietly(to, "Verify your email - C.L.U.E", body)
        .await;
    Ok(())
}

async fn register(
    Extension(pool): Extension<DbPool>,
    Extension(config): Extension<Arc<Config>>,
    Extension(mailer): Extension<Arc<Mailer>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    #[derive(Insertable)]
    #[diesel(table_name = users)]
    struct NewUser {
        username: String,
        email: String,
        first_name: String,
        last_name: String,
        password_hash: String,
        is_active: bool,
    }

    let conn = &mut pool.get().await?;

    let username_taken = diesel::select(diesel::dsl::exists(
        users::table.filter(users::username.eq(&req.username)),
    ))
    .get_result::<bool>(conn)
    .await?;
    let email_taken = diesel::select(diesel::dsl::exists(
        users::table.filter(users::email.eq(&req.email)),
    ))
    .get_result::<bool>(conn)
    .await?;

    let problems = registration_problems(&req, username_taken, email_taken);
    if !problems.is_empty() {
        return Err(AppError::Invalid(problems));
    }

    let user = diesel::insert_into(users::table)
        .values(NewUser {
            username: req.username,
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            password_hash: auth::hash_password(req.password)?,
            is_active: false,
        })
        .get_result::<User>(conn)
        .await
        .map_err(db_error)?;

    tracing::info!(user = user.id, username = %user.username, "account registered");
    if let Err(err) = send_verification(&mailer, &config, &user).await {
        tracing::warn!(user = user.id, error = %err, "could not prepare verification email");
    }

    Ok((
        StatusCode::CREATED,
        MessageResponse::new(format!(
            "A verification link has been sent to {}.",
            user.email
        )),
    ))
}

async fn verify_email(
    Extension(pool): Extension<DbPool>,
    Path((uidb64, token)): Path<(String, String)>,
) -> AppResult<Json<MessageResponse>> {
    let invalid = || {
        AppError::from(
            StatusCode::BAD_REQUEST,
            "Verification link is invalid or expired.",
        )
    };

    let user_id = auth::decode_uid(&uidb64).ok_or_else(invalid)?;
    let conn = &mut pool.get().await?;

    let user = users::table
        .find(user_id)
        .first::<User>(conn)
        .await
        .optional()?
        .ok_or_else(invalid)?;

    if !auth::check_verification_token(&user, &token, jsonwebtoken::get_current_timestamp()) {
        return Err(invalid());
    }

    diesel::update(users::table.find(user.id))
        .set(users::is_active.eq(true))
        .execute(conn)
        .await?;

    tracing::info!(user = user.id, "email verified");
    Ok(MessageResponse::new("Email verified. You can now log in."))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
    #[serde(default)]
    remember_me: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizedResponse {
    token: String,
}

async fn login(
    Extension(pool): Extension<DbPool>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthorizedResponse>> {
    let conn = &mut pool.get().await?;

    let user = users::table
        .filter(users::username.eq(&req.username))
        .first::<User>(conn)
        .await
        .optional()?;

    let Some(user) = user else {
        return Err(AppError::unauthorized("Invalid login credentials"));
    };
    if !auth::password_matches(&req.password, &user.password_hash) {
        return Err(AppError::unauthorized("Invalid login credentials"));
    }
    if !user.is_active {
        return Err(AppError::from(
            StatusCode::FORBIDDEN,
            "Please verify your email before logging in.",
        ));
    }

    let ttl = if req.remember_me {
        REMEMBERED_SESSION_TTL
    } else {
        SESSION_TTL
    };
    Ok(Json(AuthorizedResponse {
        token: auth::generate_jwt(Principal::for_user(&user), ttl)?,
    }))
}

async fn logout(
    ExtractAuth(claims): ExtractAuth,
    Extension(sessions): Extension<SharedSessions>,
) -> StatusCode {
    sessions.lock().await.end(&claims);
    StatusCode::NO_CONTENT
}

pub fn app() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/verify/:uidb64/:token", get(verify_email))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .nest("/password", password::app())
}
