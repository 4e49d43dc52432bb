use crate::{
    auth,
    config::Config,
    email::Mailer,
    error::{AppError, AppResult},
    models::{PasswordReset, User, RESET_VALID_MINUTES},
    schema::*,
    DbPool,
};
use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use lettre::message::Mailbox;
use nanoid::nanoid;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
struct PwdRequest {
    email: String,
}

#[derive(Deserialize)]
struct NewPwdRequest {
    password: String,
    confirm_password: String,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

async fn password_request(
    Extension(pool): Extension<DbPool>,
    Extension(config): Extension<Arc<Config>>,
    Extension(mailer): Extension<Arc<Mailer>>,
    Json(req): Json<PwdRequest>,
) -> AppResult<StatusCode> {
    #[derive(Insertable)]
    #[diesel(table_name = password_resets)]
    struct NewReset {
        user_id: i32,
        reset_id: String,
        created_when: NaiveDateTime,
    }

    let conn = &mut pool.get().await?;

    let Some(user) = users::table
        .filter(users::email.eq(&req.email))
        .first::<User>(conn)
        .await
        .optional()? else {
        return Err(AppError::from(
            StatusCode::NOT_FOUND,
            format!("No user with email '{}' found", req.email),
        ));
    };

    let reset = diesel::insert_into(password_resets::table)
        .values(NewReset {
            user_id: user.id,
            reset_id: nanoid!(),
            created_when: now(),
        })
        .get_result::<PasswordReset>(conn)
        .await?;

    let link = config.site_link(&format!("/api/auth/password/reset/{}", reset.reset_id))?;
    let body = format!(
        r"Hi {},

Reset your password using the link below within the next {} minutes:

{}

If you did not request this password reset you can disregard this message and your password will remain unchanged.",
        user.username, RESET_VALID_MINUTES, link
    );

    let destination = user
        .email
        .parse()
        .map_err(|_| AppError::from(StatusCode::BAD_REQUEST, "invalid email"))?;
    mailer
        .send_quietly(
            Mailbox::new(Some(user.username.clone()), destination),
            "Reset your password",
            body,
        )
        .await;

    tracing::info!(user = user.id, "password reset requested");
    Ok(StatusCode::ACCEPTED)
}

async fn find_reset(
    conn: &mut diesel_async::AsyncPgConnection,
    reset_id: &str,
) -> AppResult<PasswordReset> {
    password_resets::table
        .filter(password_resets::reset_id.eq(reset_id))
        .first::<PasswordReset>(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::from(StatusCode::NOT_FOUND, "Invalid reset id"))
}

async fn check_uid(
    Extension(pool): Extension<DbPool>,
    Path(reset_id): Path<String>,
) -> AppResult<StatusCode> {
    let conn = &mut pool.get().await?;
    find_reset(conn, &reset_id).await?;
    Ok(StatusCode::OK)
}

/// An expired reset is spent: its row goes even though the request fails.
async fn discard_if_expired(
    conn: &mut diesel_async::AsyncPgConnection,
    reset: &PasswordReset,
    now: NaiveDateTime,
) -> QueryResult<bool> {
    if !reset.is_expired(now) {
        return Ok(false);
    }
    diesel::delete(password_resets::table.find(reset.id))
        .execute(conn)
        .await?;
    Ok(true)
}

/// Problems with a new password, reported together.
fn password_problems(req: &NewPwdRequest, expired: bool) -> Vec<String> {
    let mut problems = Vec::new();
    if req.password != req.confirm_password {
        problems.push("Passwords do not match".to_string());
    }
    if req.password.chars().count() < 5 {
        problems.push("Password must be at least 5 characters long".to_string());
    }
    if expired {
        problems.push("Reset link has expired".to_string());
    }
    problems
}

async fn password_reset(
    Extension(pool): Extension<DbPool>,
    Path(reset_id): Path<String>,
    Json(req): Json<NewPwdRequest>,
) -> AppResult<StatusCode> {
    let conn = &mut pool.get().await?;
    let reset = find_reset(conn, &reset_id).await?;

    let expired = discard_if_expired(conn, &reset, now()).await?;
    let problems = password_problems(&req, expired);
    if !problems.is_empty() {
        return Err(AppError::Invalid(problems));
    }

    diesel::update(users::table.find(reset.user_id))
        .set(users::password_hash.eq(auth::hash_password(req.password)?))
        .execute(conn)
        .await?;
    diesel::delete(password_resets::table.find(reset.id))
        .execute(conn)
        .await?;

    tracing::info!(user = reset.user_id, "password reset");
    Ok(StatusCode::NO_CONTENT)
}

pub fn app() -> Router {
    Router::new()
        .route("/forgot", post(password_request))
        .route("/reset/:reset_id", get(check_uid).post(password_reset))
}
