use crate::schema::*;
use anyhow::anyhow;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Minutes a password reset link stays usable.
pub const RESET_VALID_MINUTES: i64 = 10;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = departments)]
#[diesel(primary_key(name))]
pub struct Department {
    #[serde(rename = "department_name")]
    pub name: String,
    #[serde(rename = "department_description")]
    pub description: String,
    #[serde(rename = "department_poster")]
    pub poster: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = clubs)]
#[diesel(primary_key(name))]
pub struct Club {
    #[serde(rename = "club_name")]
    pub name: String,
    pub department_name: String,
    #[serde(rename = "club_description")]
    pub description: String,
    #[serde(rename = "club_poster")]
    pub poster: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = fests)]
#[diesel(primary_key(name))]
pub struct Fest {
    #[serde(rename = "fest_name")]
    pub name: String,
    pub department_name: String,
    #[serde(rename = "event_start_date")]
    pub start_date: NaiveDate,
    #[serde(rename = "event_end_date")]
    pub end_date: NaiveDate,
    #[serde(rename = "fest_poster")]
    pub poster: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Club,
    Department,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Club => "club",
            EventKind::Department => "department",
        }
    }

    /// Display tag used in calendar and search payloads.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Club => "Club",
            EventKind::Department => "Department",
        }
    }
}

impl FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "club" => Ok(EventKind::Club),
            "department" => Ok(EventKind::Department),
            other => Err(anyhow!("unknown event kind `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = events)]
pub struct EventRow {
    pub id: i32,
    pub name: String,
    pub kind: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub time: String,
    pub venue: String,
    pub registration_link: Option<String>,
    pub poster: Option<String>,
    pub department_name: String,
    pub club_name: Option<String>,
    pub fest_name: Option<String>,
}

/// Who runs an event. Every event belongs to a department; club events may
/// also name their club, department events may sit under a fest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum EventOwner {
    Club { club_name: Option<String> },
    Department { fest_name: Option<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: i32,
    #[serde(rename = "event_name")]
    pub name: String,
    #[serde(rename = "event_start_date")]
    pub start_date: NaiveDate,
    #[serde(rename = "event_end_date")]
    pub end_date: NaiveDate,
    #[serde(rename = "event_time")]
    pub time: String,
    #[serde(rename = "event_venue")]
    pub venue: String,
    pub registration_link: Option<String>,
    #[serde(rename = "event_poster")]
    pub poster: Option<String>,
    pub department_name: String,
    #[serde(flatten)]
    pub owner: EventOwner,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self.owner {
            EventOwner::Club { .. } => EventKind::Club,
            EventOwner::Department { .. } => EventKind::Department,
        }
    }
}

impl TryFrom<EventRow> for Event {
    type Error = anyhow::Error;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let owner = match row.kind.parse::<EventKind>()? {
            EventKind::Club => EventOwner::Club {
                club_name: row.club_name,
            },
            EventKind::Department => EventOwner::Department {
                fest_name: row.fest_name,
            },
        };

        Ok(Event {
            id: row.id,
            name: row.name,
            start_date: row.start_date,
            end_date: row.end_date,
            time: row.time,
            venue: row.venue,
            registration_link: row.registration_link,
            poster: row.poster,
            department_name: row.department_name,
            owner,
        })
    }
}

pub fn into_events(rows: Vec<EventRow>) -> anyhow::Result<Vec<Event>> {
    rows.into_iter().map(Event::try_from).collect()
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = notices)]
pub struct Notice {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub date_posted: NaiveDateTime,
    pub club_name: Option<String>,
    pub department_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorType {
    Club,
    Department,
}

impl CoordinatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinatorType::Club => "club",
            CoordinatorType::Department => "department",
        }
    }
}

impl From<&str> for CoordinatorType {
    /// Anything other than `department` is treated as a club coordinator.
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("department") {
            CoordinatorType::Department
        } else {
            CoordinatorType::Club
        }
    }
}

impl fmt::Display for CoordinatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = coordinators)]
pub struct Coordinator {
    pub id: i32,
    #[serde(rename = "coordinator_name")]
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub coordinator_type: String,
    pub club_name: Option<String>,
    pub department_name: Option<String>,
    pub email: String,
}

impl Coordinator {
    pub fn kind(&self) -> CoordinatorType {
        CoordinatorType::from(self.coordinator_type.as_str())
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(belongs_to(User))]
pub struct PasswordReset {
    pub id: i32,
    pub user_id: i32,
    pub reset_id: String,
    pub created_when: NaiveDateTime,
}

impl PasswordReset {
    pub fn expires_at(&self) -> NaiveDateTime {
        self.created_when + Duration::minutes(RESET_VALID_MINUTES)
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        now > self.expires_at()
    }
}
