//! `/events` (club-owned) and `/department-events` share one table and one
//! set of handlers; each collection only ever sees rows of its own kind.

use crate::{
    auth::StaffOnly,
    error::{db_error, AppError, AppResult},
    models::{Event, EventKind, EventRow},
    query::{EventListFilter, EventListParams},
    schema::*,
    DbPool,
};
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chrono::{Local, NaiveDate};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Deserialize)]
struct EventFields {
    event_name: String,
    event_start_date: NaiveDate,
    event_end_date: NaiveDate,
    #[serde(default)]
    event_time: String,
    #[serde(default)]
    event_venue: String,
    registration_link: Option<String>,
    event_poster: Option<String>,
    department_name: String,
}

#[derive(Deserialize)]
struct ClubEventRequest {
    #[serde(flatten)]
    fields: EventFields,
    club_name: Option<String>,
}

#[derive(Deserialize)]
struct DepartmentEventRequest {
    #[serde(flatten)]
    fields: EventFields,
    fest_name: Option<String>,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = events, treat_none_as_null = true)]
struct EventValues {
    name: String,
    kind: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    time: String,
    venue: String,
    registration_link: Option<String>,
    poster: Option<String>,
    department_name: String,
    club_name: Option<String>,
    fest_name: Option<String>,
}

impl EventValues {
    fn new(
        kind: EventKind,
        fields: EventFields,
        club_name: Option<String>,
        fest_name: Option<String>,
    ) -> AppResult<Self> {
        if fields.event_end_date < fields.event_start_date {
            return Err(AppError::Invalid(vec![
                "event_end_date must not be before event_start_date".to_string(),
            ]));
        }

        Ok(EventValues {
            name: fields.event_name,
            kind: kind.as_str().to_string(),
            start_date: fields.event_start_date,
            end_date: fields.event_end_date,
            time: fields.event_time,
            venue: fields.event_venue,
            registration_link: fields.registration_link,
            poster: fields.event_poster,
            department_name: fields.department_name,
            club_name,
            fest_name,
        })
    }
}

/// One of the two event collections.
trait Collection: Send + Sync + 'static {
    const KIND: EventKind;
    const NAME: &'static str;
    type Request: DeserializeOwned + Send + 'static;

    fn values(req: Self::Request) -> AppResult<EventValues>;
}

struct ClubEvents;

impl Collection for ClubEvents {
    const KIND: EventKind = EventKind::Club;
    const NAME: &'static str = "Event";
    type Request = ClubEventRequest;

    fn values(req: ClubEventRequest) -> AppResult<EventValues> {
        EventValues::new(Self::KIND, req.fields, req.club_name, None)
    }
}

struct DepartmentEvents;

impl Collection for DepartmentEvents {
    const KIND: EventKind = EventKind::Department;
    const NAME: &'static str = "Department event";
    type Request = DepartmentEventRequest;

    fn values(req: DepartmentEventRequest) -> AppResult<EventValues> {
        EventValues::new(Self::KIND, req.fields, None, req.fest_name)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn list<C: Collection>(
    Extension(pool): Extension<DbPool>,
    Query(params): Query<EventListParams>,
) -> AppResult<Json<Vec<Event>>> {
    let conn = &mut pool.get().await?;

    let rows = EventListFilter::from(&params)
        .query(C::KIND, today())
        .order((events::start_date.desc(), events::name.asc()))
        .load::<EventRow>(conn)
        .await?;

    Ok(Json(crate::models::into_events(rows)?))
}

async fn create<C: Collection>(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Json(req): Json<C::Request>,
) -> AppResult<(StatusCode, Json<Event>)> {
    let values = C::values(req)?;
    let conn = &mut pool.get().await?;

    let row = diesel::insert_into(events::table)
        .values(&values)
        .get_result::<EventRow>(conn)
        .await
        .map_err(db_error)?;

    tracing::info!(event = row.id, kind = %row.kind, name = %row.name, "event created");
    Ok((StatusCode::CREATED, Json(Event::try_from(row)?)))
}

async fn retrieve<C: Collection>(
    Extension(pool): Extension<DbPool>,
    Path(id): Path<i32>,
) -> AppResult<Json<Event>> {
    let conn = &mut pool.get().await?;

    let row = events::table
        .find(id)
        .filter(events::kind.eq(C::KIND.as_str()))
        .first::<EventRow>(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::not_found(C::NAME))?;

    Ok(Json(Event::try_from(row)?))
}

async fn update<C: Collection>(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(id): Path<i32>,
    Json(req): Json<C::Request>,
) -> AppResult<Json<Event>> {
    let values = C::values(req)?;
    let conn = &mut pool.get().await?;

    let row = diesel::update(
        events::table
            .find(id)
            .filter(events::kind.eq(C::KIND.as_str())),
    )
    .set(&values)
    .get_result::<EventRow>(conn)
    .await
    .optional()
    .map_err(db_error)?
    .ok_or_else(|| AppError::not_found(C::NAME))?;

    Ok(Json(Event::try_from(row)?))
}

async fn destroy<C: Collection>(
    _: StaffOnly,
    Extension(pool): Extension<DbPool>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    let conn = &mut pool.get().await?;

    let deleted = diesel::delete(
        events::table
            .find(id)
            .filter(events::kind.eq(C::KIND.as_str())),
    )
    .execute(conn)
    .await?;

    match deleted {
        0 => Err(AppError::not_found(C::NAME)),
        _ => {
            tracing::info!(event = id, kind = C::KIND.as_str(), "event deleted");
            Ok(StatusCode::NO_CONTENT)
        }
    }
}

#[derive(Serialize)]
struct EventStats {
    total: i64,
    upcoming: i64,
    today: i64,
}

async fn stats<C: Collection>(
    Extension(pool): Extension<DbPool>,
    Query(params): Query<EventListParams>,
) -> AppResult<Json<EventStats>> {
    let conn = &mut pool.get().await?;
    let filter = EventListFilter::from(&params);
    let today = today();

    let total = filter
        .query(C::KIND, today)
        .count()
        .get_result::<i64>(conn)
        .await?;
    let upcoming = filter
        .query(C::KIND, today)
        .filter(events::start_date.ge(today))
        .count()
        .get_result::<i64>(conn)
        .await?;
    let running = filter
        .query(C::KIND, today)
        .filter(events::start_date.le(today))
        .filter(events::end_date.ge(today))
        .count()
        .get_result::<i64>(conn)
        .await?;

    Ok(Json(EventStats {
        total,
        upcoming,
        today: running,
    }))
}

fn collection<C: Collection>() -> Router {
    Router::new()
        .route("/", get(list::<C>).post(create::<C>))
        .route(
            "/:id",
            get(retrieve::<C>).put(update::<C>).delete(destroy::<C>),
        )
}

pub fn club_app() -> Router {
    collection::<ClubEvents>()
}

pub fn department_app() -> Router {
    collection::<DepartmentEvents>()
}

pub fn stats_app() -> Router {
    Router::new()
        .route("/events", get(stats::<ClubEvents>))
        .route("/department-events", get(stats::<DepartmentEvents>))
}
