use crate::{
    auth::StaffOnly,
    error::{db_error, AppError, AppResult},
    models::Fest,
    schema::*,
    DbPool,
};
use axum::{extract::Path, http::StatusCode, routing::get, Extension, Json, Router};
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;

#[derive(Deserialize, Insertable)]
#[diesel(table_name = fests)]
struct FestRequest {
    #[serde(rename = "fest_name")]
    name: String,
    department_name: String,
    #[serde(rename = "event_start_date")]
    start_date: NaiveDate,
    #[serde(rename = "event_end_date")]
    end_date: NaiveDate,
    #[serde(rename = "fest_poster")]
    poster: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = fests, treat_none_as_null = true)]
struct FestEdit {
    department_name: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    poster: Option<String>,
}

fn check_dates(req: &FestRequest) -> AppResult<()> {
    if req.end_date < req.start_date {
        return Err(AppError::Invalid(vec![
            "event_end_date must not be before event_start_date".to_string(),
        ]));
    }
    Ok(())
}

async fn list(Extension(pool): Extension<DbPool>) -> AppResult<Json<Vec<Fest>>> {
    let conn = &mut pool.get().await?;

    Ok(Json(
        fests::table
            .order((fests::start_date.desc(), fests::name.asc()))
            .load(conn)
            .await?,
    ))
}

async fn create(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Json(req): Json<FestRequest>,
) -> AppResult<(StatusCode, Json<Fest>)> {
    check_dates(&req)?;
    let conn = &mut pool.get().await?;

    let fest = diesel::insert_into(fests::table)
        .values(&req)
        .get_result::<Fest>(conn)
        .await
        .map_err(db_error)?;

    Ok((StatusCode::CREATED, Json(fest)))
}

async fn retrieve(
    Extension(pool): Extension<DbPool>,
    Path(name): Path<String>,
) -> AppResult<Json<Fest>> {
    let conn = &mut pool.get().await?;

    fests::table
        .find(name)
        .first(conn)
        .await
        .optional()?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Fest"))
}

async fn update(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(name): Path<String>,
    Json(req): Json<FestRequest>,
) -> AppResult<Json<Fest>> {
    check_dates(&req)?;
    let conn = &mut pool.get().await?;

    diesel::update(fests::table.find(name))
        .set(FestEdit {
            department_name: req.department_name,
            start_date: req.start_date,
            end_date: req.end_date,
            poster: req.poster,
        })
        .get_result::<Fest>(conn)
        .await
        .optional()
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Fest"))
}

async fn destroy(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(name): Path<String>,
) -> AppResult<StatusCode> {
    let conn = &mut pool.get().await?;

    match diesel::delete(fests::table.find(name)).execute(conn).await? {
        0 => Err(AppError::not_found("Fest")),
        _ => Ok(StatusCode::NO_CONTENT),
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:name", get(retrieve).put(update).delete(destroy))
}
