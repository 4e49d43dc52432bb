use crate::{
    auth::ExtractAuth,
    error::{AppError, AppResult},
    query::{count_by_month, last_twelve_months, MonthCount},
    schema::*,
    DbPool,
};
use axum::{extract::Path, routing::get, Extension, Json, Router};
use chrono::{Local, NaiveDate};
use diesel::{dsl::count_star, prelude::*};
use diesel_async::RunQueryDsl;
use serde::Serialize;

#[derive(Serialize)]
struct DepartmentCount {
    department: String,
    count: i64,
}

#[derive(Serialize)]
struct EventStats {
    total_events: i64,
    upcoming_events: i64,
    past_events: i64,
    /// Participants are not tracked yet.
    total_participants: i64,
    events_by_department: Vec<DepartmentCount>,
    events_by_month: Vec<MonthCount>,
}

async fn event_stats(
    _: ExtractAuth,
    Extension(pool): Extension<DbPool>,
) -> AppResult<Json<EventStats>> {
    let conn = &mut pool.get().await?;
    let today = Local::now().date_naive();

    let total_events = events::table.count().get_result::<i64>(conn).await?;
    let upcoming_events = events::table
        .filter(events::start_date.ge(today))
        .count()
        .get_result::<i64>(conn)
        .await?;
    let past_events = events::table
        .filter(events::end_date.lt(today))
        .count()
        .get_result::<i64>(conn)
        .await?;

    let events_by_department = events::table
        .group_by(events::department_name)
        .select((events::department_name, count_star()))
        .order(events::department_name.asc())
        .load::<(String, i64)>(conn)
        .await?
        .into_iter()
        .map(|(department, count)| DepartmentCount { department, count })
        .collect();

    let months = last_twelve_months(today);
    let start_dates = match (<[_]>::first(&months), months.last()) {
        (Some((first, _)), Some((_, last))) => {
            events::table
                .select(events::start_date)
                .filter(events::start_date.between(*first, *last))
                .load::<NaiveDate>(conn)
                .await?
        }
        _ => Vec::new(),
    };

    Ok(Json(EventStats {
        total_events,
        upcoming_events,
        past_events,
        total_participants: 0,
        events_by_department,
        events_by_month: count_by_month(&months, &start_dates),
    }))
}

#[derive(Serialize)]
struct EventAnalytics {
    event_id: i32,
    event_name: String,
    total_participants: i64,
    registration_rate: f64,
    engagement_score: f64,
}

async fn event_analytics(
    Extension(pool): Extension<DbPool>,
    Path(event_id): Path<i32>,
) -> AppResult<Json<EventAnalytics>> {
    let conn = &mut pool.get().await?;

    let event_name = events::table
        .find(event_id)
        .select(events::name)
        .first::<String>(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::not_found("Event"))?;

    Ok(Json(EventAnalytics {
        event_id,
        event_name,
        total_participants: 0,
        registration_rate: 0.0,
        engagement_score: 0.0,
    }))
}

pub fn app() -> Router {
    Router::new()
        .route("/stats", get(event_stats))
        .route("/events/:event_id", get(event_analytics))
}
