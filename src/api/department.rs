use crate::{
    auth::StaffOnly,
    error::{db_error, AppError, AppResult},
    models::Department,
    schema::*,
    DbPool,
};
use axum::{extract::Path, http::StatusCode, routing::get, Extension, Json, Router};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;

#[derive(Deserialize, Insertable)]
#[diesel(table_name = departments)]
struct DepartmentRequest {
    #[serde(rename = "department_name")]
    name: String,
    #[serde(rename = "department_description", default)]
    description: String,
    #[serde(rename = "department_poster")]
    poster: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = departments, treat_none_as_null = true)]
struct DepartmentEdit {
    description: String,
    poster: Option<String>,
}

async fn list(Extension(pool): Extension<DbPool>) -> AppResult<Json<Vec<Department>>> {
    let conn = &mut pool.get().await?;

    Ok(Json(
        departments::table
            .order(departments::name.asc())
            .load(conn)
            .await?,
    ))
}

async fn create(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Json(req): Json<DepartmentRequest>,
) -> AppResult<(StatusCode, Json<Department>)> {
    let conn = &mut pool.get().await?;

    let department = diesel::insert_into(departments::table)
        .values(&req)
        .get_result::<Department>(conn)
        .await
        .map_err(db_error)?;

    tracing::info!(department = %department.name, "department created");
    Ok((StatusCode::CREATED, Json(department)))
}

async fn retrieve(
    Extension(pool): Extension<DbPool>,
    Path(name): Path<String>,
) -> AppResult<Json<Department>> {
    let conn = &mut pool.get().await?;

    departments::table
        .find(name)
        .first(conn)
        .await
        .optional()?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Department"))
}

async fn update(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(name): Path<String>,
    Json(req): Json<DepartmentRequest>,
) -> AppResult<Json<Department>> {
    let conn = &mut pool.get().await?;

    diesel::update(departments::table.find(name))
        .set(DepartmentEdit {
            description: req.description,
            poster: req.poster,
        })
        .get_result::<Department>(conn)
        .await
        .optional()
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Department"))
}

async fn destroy(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(name): Path<String>,
) -> AppResult<StatusCode> {
    let conn = &mut pool.get().await?;

    match diesel::delete(departments::table.find(&name))
        .execute(conn)
        .await?
    {
        0 => Err(AppError::not_found("Department")),
        _ => {
            tracing::info!(department = %name, "department deleted");
            Ok(StatusCode::NO_CONTENT)
        }
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:name", get(retrieve).put(update).delete(destroy))
}
