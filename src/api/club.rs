use crate::{
    auth::StaffOnly,
    error::{db_error, AppError, AppResult},
    models::Club,
    schema::*,
    DbPool,
};
use axum::{extract::Path, http::StatusCode, routing::get, Extension, Json, Router};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;

#[derive(Deserialize, Insertable)]
#[diesel(table_name = clubs)]
struct ClubRequest {
    #[serde(rename = "club_name")]
    name: String,
    department_name: String,
    #[serde(rename = "club_description", default)]
    description: String,
    #[serde(rename = "club_poster")]
    poster: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = clubs, treat_none_as_null = true)]
struct ClubEdit {
    department_name: String,
    description: String,
    poster: Option<String>,
}

async fn list(Extension(pool): Extension<DbPool>) -> AppResult<Json<Vec<Club>>> {
    let conn = &mut pool.get().await?;

    Ok(Json(clubs::table.order(clubs::name.asc()).load(conn).await?))
}

async fn create(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Json(req): Json<ClubRequest>,
) -> AppResult<(StatusCode, Json<Club>)> {
    let conn = &mut pool.get().await?;

    let club = diesel::insert_into(clubs::table)
        .values(&req)
        .get_result::<Club>(conn)
        .await
        .map_err(db_error)?;

    tracing::info!(club = %club.name, department = %club.department_name, "club created");
    Ok((StatusCode::CREATED, Json(club)))
}

async fn info(
    Extension(pool): Extension<DbPool>,
    Path(name): Path<String>,
) -> AppResult<Json<Club>> {
    let conn = &mut pool.get().await?;

    clubs::table
        .find(name)
        .first(conn)
        .await
        .optional()?
        .map(Json)
        .ok_or_else(|| AppError::from(StatusCode::NOT_FOUND, "the club does not exist"))
}

async fn edit_club(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(name): Path<String>,
    Json(req): Json<ClubRequest>,
) -> AppResult<Json<Club>> {
    let conn = &mut pool.get().await?;

    diesel::update(clubs::table.find(name))
        .set(ClubEdit {
            department_name: req.department_name,
            description: req.description,
            poster: req.poster,
        })
        .get_result::<Club>(conn)
        .await
        .optional()
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| AppError::from(StatusCode::NOT_FOUND, "the club does not exist"))
}

async fn remove(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(name): Path<String>,
) -> AppResult<StatusCode> {
    let conn = &mut pool.get().await?;

    let deleted = diesel::delete(clubs::table.find(&name))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(AppError::from(
            StatusCode::NOT_FOUND,
            "the club does not exist",
        ));
    }

    tracing::info!(club = %name, "club deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub fn app() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:name", get(info).put(edit_club).delete(remove))
}
