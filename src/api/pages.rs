use crate::{
    auth::{ExtractAuth, Principal},
    error::{AppError, AppResult},
    models::{into_events, Department, Event, EventKind, EventRow, Notice, User},
    query::{
        build_calendar, calendar_query, month_bounds, partition_by_kind, resolve_month,
        CalendarMonth, CalendarParams, SearchFilter, SearchParams,
    },
    schema::*,
    DbPool,
};
use axum::{
    extract::Query,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension, Json, Router,
};
use chrono::{Local, NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;

const HOME_LIMIT: i64 = 5;

#[derive(Serialize)]
struct HomeResponse {
    events: Vec<Event>,
    d_events: Vec<Event>,
    notices: Vec<Notice>,
}

async fn upcoming(
    conn: &mut AsyncPgConnection,
    kind: EventKind,
    today: NaiveDate,
) -> AppResult<Vec<Event>> {
    let rows = events::table
        .filter(events::kind.eq(kind.as_str()))
        .filter(events::start_date.ge(today))
        .order((events::start_date.asc(), events::id.asc()))
        .limit(HOME_LIMIT)
        .load::<EventRow>(conn)
        .await?;
    Ok(into_events(rows)?)
}

async fn home(Extension(pool): Extension<DbPool>) -> AppResult<Json<HomeResponse>> {
    let conn = &mut pool.get().await?;
    let today = Local::now().date_naive();

    let events = upcoming(conn, EventKind::Club, today).await?;
    let d_events = upcoming(conn, EventKind::Department, today).await?;
    let notices = notices::table
        .order((notices::date_posted.desc(), notices::id.desc()))
        .limit(HOME_LIMIT)
        .load::<Notice>(conn)
        .await?;

    Ok(Json(HomeResponse {
        events,
        d_events,
        notices,
    }))
}

async fn calendar(
    Extension(pool): Extension<DbPool>,
    Query(params): Query<CalendarParams>,
) -> AppResult<Json<CalendarMonth>> {
    let today = Local::now().date_naive();
    let (year, month) = resolve_month(&params, today);
    let (first, last) = month_bounds(year, month)
        .ok_or_else(|| anyhow::anyhow!("resolved month {year}-{month} has no bounds"))?;

    let conn = &mut pool.get().await?;
    let rows = calendar_query(first, last).load::<EventRow>(conn).await?;

    Ok(Json(build_calendar(year, month, today, &into_events(rows)?)))
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    date: String,
    department: String,
    #[serde(rename = "type")]
    kind: String,
    club_events: Vec<Event>,
    dept_events: Vec<Event>,
    departments: Vec<Department>,
}

async fn search(
    Extension(pool): Extension<DbPool>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<SearchResponse>> {
    let filter = SearchFilter::from(&params);
    let conn = &mut pool.get().await?;

    let rows = filter.query().load::<EventRow>(conn).await?;
    let (club_events, dept_events) = partition_by_kind(into_events(rows)?, filter.only);
    let departments = departments::table
        .order(departments::name.asc())
        .load::<Department>(conn)
        .await?;

    let echo = |v: Option<String>| v.map(|s| s.trim().to_string()).unwrap_or_default();
    Ok(Json(SearchResponse {
        query: echo(params.q),
        date: echo(params.date),
        department: echo(params.department),
        kind: echo(params.kind),
        club_events,
        dept_events,
        departments,
    }))
}

#[derive(Serialize)]
struct ProfileResponse {
    id: i32,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    is_staff: bool,
    date_joined: NaiveDateTime,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        ProfileResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: user.is_staff,
            date_joined: user.date_joined,
        }
    }
}

/// Coordinators have no profile page of their own; they land on their
/// dashboard instead.
async fn profile(
    ExtractAuth(claims): ExtractAuth,
    Extension(pool): Extension<DbPool>,
) -> AppResult<Response> {
    let user_id = match claims.principal {
        Principal::User { user_id, .. } => user_id,
        Principal::Coordinator { .. } => {
            return Ok(Redirect::to("/api/coordinator/dashboard").into_response())
        }
    };

    let conn = &mut pool.get().await?;
    let user = users::table
        .find(user_id)
        .first::<User>(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::unauthorized("account no longer exists"))?;

    Ok(Json(ProfileResponse::from(user)).into_response())
}

pub fn app() -> Router {
    Router::new()
        .route("/home", get(home))
        .route("/calendar", get(calendar))
        .route("/search", get(search))
        .route("/profile", get(profile))
}
