use crate::{
    auth::ExtractAuth,
    error::{AppError, AppResult},
    models::{Event, EventRow},
    schema::*,
    DbPool,
};
use axum::{
    extract::Query,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Report formats rendered by the frontend from the returned event data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportFormat {
    Pdf,
    Excel,
}

impl FromStr for ReportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(ReportFormat::Pdf),
            "excel" => Ok(ReportFormat::Excel),
            _ => Err(AppError::from(
                StatusCode::BAD_REQUEST,
                r#"Invalid format. Use "pdf" or "excel""#,
            )),
        }
    }
}

impl ReportFormat {
    fn message(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "Event data ready for PDF generation",
            ReportFormat::Excel => "Event data ready for Excel generation",
        }
    }
}

#[derive(Deserialize)]
struct GenerateRequest {
    event_id: Option<i32>,
    format: Option<String>,
}

#[derive(Debug, Serialize)]
struct EventData {
    event_name: String,
    event_venue: String,
    event_start_date: NaiveDate,
    event_end_date: NaiveDate,
    event_time: String,
    department: String,
}

impl From<Event> for EventData {
    fn from(event: Event) -> Self {
        EventData {
            event_name: event.name,
            event_venue: event.venue,
            event_start_date: event.start_date,
            event_end_date: event.end_date,
            event_time: event.time,
            department: event.department_name,
        }
    }
}

#[derive(Serialize)]
struct GenerateResponse {
    success: bool,
    event_data: EventData,
    message: &'static str,
}

async fn generate(
    _: ExtractAuth,
    Extension(pool): Extension<DbPool>,
    Json(req): Json<GenerateRequest>,
) -> AppResult<Json<GenerateResponse>> {
    let Some(event_id) = req.event_id else {
        return Err(AppError::from(StatusCode::BAD_REQUEST, "event_id is required"));
    };
    let format = req.format.as_deref().unwrap_or("pdf").parse::<ReportFormat>()?;

    let conn = &mut pool.get().await?;
    let row = events::table
        .find(event_id)
        .first::<EventRow>(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::not_found("Event"))?;

    Ok(Json(GenerateResponse {
        success: true,
        event_data: EventData::from(Event::try_from(row)?),
        message: format.message(),
    }))
}

#[derive(Deserialize)]
struct ReportsQuery {
    #[allow(dead_code)]
    event_id: Option<i32>,
}

#[derive(Serialize)]
struct ReportsResponse {
    reports: Vec<String>,
}

// TODO: persist generated reports so this can list them per event
async fn reports(_: ExtractAuth, Query(_): Query<ReportsQuery>) -> Json<ReportsResponse> {
    Json(ReportsResponse {
        reports: Vec::new(),
    })
}

pub fn app() -> Router {
    Router::new()
        .route("/", get(reports))
        .route("/generate", post(generate))
}
