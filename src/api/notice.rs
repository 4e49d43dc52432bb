use crate::{
    auth::StaffOnly,
    error::{db_error, AppError, AppResult},
    models::Notice,
    schema::*,
    DbPool,
};
use axum::{extract::Path, http::StatusCode, routing::get, Extension, Json, Router};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;

#[derive(Deserialize, Insertable)]
#[diesel(table_name = notices)]
struct NoticeRequest {
    title: String,
    #[serde(default)]
    description: String,
    /// Left out on create to stamp the current time.
    date_posted: Option<NaiveDateTime>,
    club_name: Option<String>,
    department_name: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = notices, treat_none_as_null = true)]
struct NoticeEdit {
    title: String,
    description: String,
    club_name: Option<String>,
    department_name: Option<String>,
}

async fn list(Extension(pool): Extension<DbPool>) -> AppResult<Json<Vec<Notice>>> {
    let conn = &mut pool.get().await?;

    Ok(Json(
        notices::table
            .order((notices::date_posted.desc(), notices::id.desc()))
            .load(conn)
            .await?,
    ))
}

async fn create(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Json(req): Json<NoticeRequest>,
) -> AppResult<(StatusCode, Json<Notice>)> {
    let conn = &mut pool.get().await?;

    let notice = diesel::insert_into(notices::table)
        .values(&req)
        .get_result::<Notice>(conn)
        .await
        .map_err(db_error)?;

    tracing::info!(notice = notice.id, title = %notice.title, "notice posted");
    Ok((StatusCode::CREATED, Json(notice)))
}

async fn retrieve(
    Extension(pool): Extension<DbPool>,
    Path(id): Path<i32>,
) -> AppResult<Json<Notice>> {
    let conn = &mut pool.get().await?;

    notices::table
        .find(id)
        .first(conn)
        .await
        .optional()?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Notice"))
}

async fn update(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(id): Path<i32>,
    Json(req): Json<NoticeRequest>,
) -> AppResult<Json<Notice>> {
    let conn = &mut pool.get().await?;

    diesel::update(notices::table.find(id))
        .set(NoticeEdit {
            title: req.title,
            description: req.description,
            club_name: req.club_name,
            department_name: req.department_name,
        })
        .get_result::<Notice>(conn)
        .await
        .optional()
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Notice"))
}

async fn destroy(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    let conn = &mut pool.get().await?;

    match diesel::delete(notices::table.find(id)).execute(conn).await? {
        0 => Err(AppError::not_found("Notice")),
        _ => Ok(StatusCode::NO_CONTENT),
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(retrieve).put(update).delete(destroy))
}
