use crate::{
    auth::{self, CoordinatorAuth, Principal, StaffOnly},
    error::{db_error, AppError, AppResult},
    models::{Coordinator, CoordinatorType, EventKind},
    schema::*,
    DbPool,
};
use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{Local, NaiveDate};
use diesel::{pg::Pg, prelude::*};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DASHBOARD_ROUTE: &str = "/api/coordinator/dashboard";

#[derive(Deserialize)]
struct CoordinatorLoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CoordinatorAuthorizedResponse {
    token: String,
    redirect: &'static str,
}

impl CoordinatorAuthorizedResponse {
    fn from_coordinator(coordinator: &Coordinator) -> anyhow::Result<Self> {
        Ok(CoordinatorAuthorizedResponse {
            // expires after one day
            token: auth::generate_jwt(
                Principal::for_coordinator(coordinator),
                Duration::from_secs(24 * 60 * 60),
            )?,
            redirect: DASHBOARD_ROUTE,
        })
    }
}

async fn login(
    Extension(pool): Extension<DbPool>,
    Json(req): Json<CoordinatorLoginRequest>,
) -> AppResult<Json<CoordinatorAuthorizedResponse>> {
    let conn = &mut pool.get().await?;

    if let Some(coordinator) = coordinators::table
        .filter(coordinators::name.eq(&req.username))
        .first::<Coordinator>(conn)
        .await
        .optional()?
    {
        if auth::password_matches(&req.password, &coordinator.password_hash) {
            tracing::info!(coordinator = %coordinator.name, "coordinator logged in");
            return Ok(Json(CoordinatorAuthorizedResponse::from_coordinator(
                &coordinator,
            )?));
        }
    }
    Err(AppError::unauthorized("Invalid login credentials"))
}

/// What a coordinator's dashboard counts over.
#[derive(Debug, PartialEq, Eq)]
enum DashboardScope {
    Department(String),
    /// Club coordinators, and department coordinators with no department.
    Club(Option<String>),
}

impl From<&Coordinator> for DashboardScope {
    fn from(coordinator: &Coordinator) -> Self {
        match (coordinator.kind(), &coordinator.department_name) {
            (CoordinatorType::Department, Some(department)) => {
                DashboardScope::Department(department.clone())
            }
            _ => DashboardScope::Club(coordinator.club_name.clone()),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
struct DashboardCounts {
    total_events: i64,
    upcoming_events: i64,
    notices_count: i64,
}

impl DashboardScope {
    fn events(&self) -> Option<events::BoxedQuery<'static, Pg>> {
        match self {
            DashboardScope::Department(department) => Some(
                events::table
                    .filter(events::kind.eq(EventKind::Department.as_str()))
                    .filter(events::department_name.eq(department.clone()))
                    .into_boxed(),
            ),
            DashboardScope::Club(Some(club)) => Some(
                events::table
                    .filter(events::kind.eq(EventKind::Club.as_str()))
                    .filter(events::club_name.eq(club.clone()))
                    .into_boxed(),
            ),
            DashboardScope::Club(None) => None,
        }
    }

    fn notices(&self) -> Option<notices::BoxedQuery<'static, Pg>> {
        match self {
            DashboardScope::Department(department) => Some(
                notices::table
                    .filter(notices::department_name.eq(department.clone()))
                    .into_boxed(),
            ),
            DashboardScope::Club(Some(club)) => Some(
                notices::table
                    .filter(notices::club_name.eq(club.clone()))
                    .into_boxed(),
            ),
            DashboardScope::Club(None) => None,
        }
    }

    async fn counts(
        &self,
        conn: &mut AsyncPgConnection,
        today: NaiveDate,
    ) -> QueryResult<DashboardCounts> {
        let (Some(all), Some(upcoming), Some(notices)) =
            (self.events(), self.events(), self.notices())
        else {
            return Ok(DashboardCounts::default());
        };

        Ok(DashboardCounts {
            total_events: all.count().get_result(conn).await?,
            upcoming_events: upcoming
                .filter(events::start_date.ge(today))
                .count()
                .get_result(conn)
                .await?,
            notices_count: notices.count().get_result(conn).await?,
        })
    }
}

#[derive(Serialize)]
struct DashboardResponse {
    coordinator_name: String,
    email: String,
    coordinator_type: CoordinatorType,
    club_name: Option<String>,
    department_name: Option<String>,
    #[serde(flatten)]
    counts: DashboardCounts,
}

async fn dashboard(
    session: CoordinatorAuth,
    Extension(pool): Extension<DbPool>,
) -> AppResult<Json<DashboardResponse>> {
    let conn = &mut pool.get().await?;

    let coordinator = coordinators::table
        .filter(coordinators::name.eq(&session.coordinator_name))
        .first::<Coordinator>(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::unauthorized("coordinator no longer exists"))?;

    let counts = DashboardScope::from(&coordinator)
        .counts(conn, Local::now().date_naive())
        .await?;

    Ok(Json(DashboardResponse {
        coordinator_name: session.coordinator_name,
        email: session.email,
        coordinator_type: coordinator.kind(),
        club_name: coordinator.club_name,
        department_name: coordinator.department_name,
        counts,
    }))
}

pub fn session_app() -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/dashboard", get(dashboard))
}

#[derive(Deserialize)]
struct CoordinatorRequest {
    coordinator_name: String,
    /// Required on create; left out on update to keep the current one.
    password: Option<String>,
    coordinator_type: CoordinatorType,
    club_name: Option<String>,
    department_name: Option<String>,
    email: String,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = coordinators, treat_none_as_null = true)]
struct CoordinatorValues {
    name: String,
    coordinator_type: String,
    club_name: Option<String>,
    department_name: Option<String>,
    email: String,
}

impl From<&CoordinatorRequest> for CoordinatorValues {
    fn from(req: &CoordinatorRequest) -> Self {
        CoordinatorValues {
            name: req.coordinator_name.clone(),
            coordinator_type: req.coordinator_type.as_str().to_string(),
            club_name: req.club_name.clone(),
            department_name: req.department_name.clone(),
            email: req.email.clone(),
        }
    }
}

async fn list(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
) -> AppResult<Json<Vec<Coordinator>>> {
    let conn = &mut pool.get().await?;

    Ok(Json(
        coordinators::table
            .order(coordinators::name.asc())
            .load(conn)
            .await?,
    ))
}

async fn create(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Json(req): Json<CoordinatorRequest>,
) -> AppResult<(StatusCode, Json<Coordinator>)> {
    let Some(password) = req.password.as_deref() else {
        return Err(AppError::Invalid(vec!["password is required".to_string()]));
    };
    let password_hash = auth::hash_password(password)?;
    let conn = &mut pool.get().await?;

    let coordinator = diesel::insert_into(coordinators::table)
        .values((
            CoordinatorValues::from(&req),
            coordinators::password_hash.eq(password_hash),
        ))
        .get_result::<Coordinator>(conn)
        .await
        .map_err(db_error)?;

    tracing::info!(coordinator = %coordinator.name, kind = %coordinator.kind(), "coordinator created");
    Ok((StatusCode::CREATED, Json(coordinator)))
}

async fn retrieve(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(id): Path<i32>,
) -> AppResult<Json<Coordinator>> {
    let conn = &mut pool.get().await?;

    coordinators::table
        .find(id)
        .first(conn)
        .await
        .optional()?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Coordinator"))
}

async fn update(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(id): Path<i32>,
    Json(req): Json<CoordinatorRequest>,
) -> AppResult<Json<Coordinator>> {
    let password_hash = req.password.as_deref().map(auth::hash_password).transpose()?;
    let conn = &mut pool.get().await?;

    let target = diesel::update(coordinators::table.find(id));
    let values = CoordinatorValues::from(&req);
    let updated = match password_hash {
        Some(hash) => {
            target
                .set((values, coordinators::password_hash.eq(hash)))
                .get_result::<Coordinator>(conn)
                .await
        }
        None => target.set(values).get_result::<Coordinator>(conn).await,
    };

    updated
        .optional()
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Coordinator"))
}

async fn destroy(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    let conn = &mut pool.get().await?;

    match diesel::delete(coordinators::table.find(id))
        .execute(conn)
        .await?
    {
        0 => Err(AppError::not_found("Coordinator")),
        _ => Ok(StatusCode::NO_CONTENT),
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(retrieve).put(update).delete(destroy))
}
