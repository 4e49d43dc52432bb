//! Query composition shared by the calendar, search, home and event list
//! endpoints. Both kinds of event live in one table; this module builds the
//! filtered queries and splits the results back out by kind.

use crate::{
    models::{Event, EventKind, EventOwner},
    schema::events,
};
use chrono::{Datelike, Duration, NaiveDate};
use diesel::{pg::Pg, prelude::*, sql_types::Text};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

diesel::sql_function!(fn lower(x: Text) -> Text);

/// Years the calendar will page through.
const CALENDAR_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Escapes LIKE metacharacters and wraps the term for a substring match.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_date(value: &Option<String>) -> Option<NaiveDate> {
    non_empty(value).and_then(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d").ok())
}

#[derive(Debug, Default, Deserialize)]
pub struct CalendarParams {
    pub month: Option<String>,
    pub year: Option<String>,
}

/// Picks the displayed month. Anything unparsable or out of range shows the
/// current month instead.
pub fn resolve_month(params: &CalendarParams, today: NaiveDate) -> (i32, u32) {
    let month = non_empty(&params.month).map(|m| m.parse::<u32>());
    let year = non_empty(&params.year).map(|y| y.parse::<i32>());

    let resolved = match (month, year) {
        (Some(Err(_)), _) | (_, Some(Err(_))) => None,
        (month, year) => {
            let month = month.and_then(Result::ok).unwrap_or_else(|| today.month());
            let year = year.and_then(Result::ok).unwrap_or_else(|| today.year());
            CALENDAR_YEARS
                .contains(&year)
                .then(|| month_bounds(year, month))
                .flatten()
                .map(|_| (year, month))
        }
    };

    resolved.unwrap_or((today.year(), today.month()))
}

/// First and last day of a month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next - Duration::days(1)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EntryOwner {
    Club { club_name: Option<String> },
    Department { department_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: i32,
    #[serde(flatten)]
    pub owner: EntryOwner,
}

impl From<&Event> for CalendarEntry {
    fn from(event: &Event) -> Self {
        let owner = match &event.owner {
            EventOwner::Club { club_name } => EntryOwner::Club {
                club_name: club_name.clone(),
            },
            EventOwner::Department { .. } => EntryOwner::Department {
                department_name: event.department_name.clone(),
            },
        };
        CalendarEntry {
            name: event.name.clone(),
            kind: event.kind().label(),
            id: event.id,
            owner,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    /// Zero for padding days that belong to a neighbouring month.
    pub day: u32,
    pub events: Vec<CalendarEntry>,
}

#[derive(Debug, Serialize)]
pub struct CalendarMonth {
    pub weeks: Vec<Vec<CalendarDay>>,
    pub month: &'static str,
    pub year: i32,
    pub today: NaiveDate,
    pub prev_month: u32,
    pub prev_year: i32,
    pub next_month: u32,
    pub next_year: i32,
}

/// Lays out a Monday-first month grid. Each in-month day lists the events
/// starting on it, club events before department events.
pub fn build_calendar(year: i32, month: u32, today: NaiveDate, events: &[Event]) -> CalendarMonth {
    let mut by_day: HashMap<NaiveDate, Vec<&Event>> = events
        .iter()
        .sorted_by_key(|e| e.kind() != EventKind::Club)
        .into_group_map_by(|e| e.start_date);

    let mut weeks = Vec::new();
    let grid = month_bounds(year, month).and_then(|(first, last)| {
        let start = first
            .checked_sub_signed(Duration::days(first.weekday().num_days_from_monday() as i64))?;
        let end = last
            .checked_add_signed(Duration::days(6 - last.weekday().num_days_from_monday() as i64))?;
        Some((start, end))
    });

    if let Some((mut day, end)) = grid {
        while day <= end {
            let week = (0..7)
                .map(|offset| {
                    let date = day + Duration::days(offset);
                    if date.month() == month && date.year() == year {
                        CalendarDay {
                            date,
                            day: date.day(),
                            events: by_day
                                .remove(&date)
                                .unwrap_or_default()
                                .into_iter()
                                .map(CalendarEntry::from)
                                .collect(),
                        }
                    } else {
                        CalendarDay {
                            date,
                            day: 0,
                            events: Vec::new(),
                        }
                    }
                })
                .collect();
            weeks.push(week);
            match day.checked_add_signed(Duration::days(7)) {
                Some(next) => day = next,
                None => break,
            }
        }
    }

    let (prev_month, prev_year) = if month == 1 { (12, year - 1) } else { (month - 1, year) };
    let (next_month, next_year) = if month == 12 { (1, year + 1) } else { (month + 1, year) };

    CalendarMonth {
        weeks,
        month: MONTH_NAMES[(month as usize).saturating_sub(1) % 12],
        year,
        today,
        prev_month,
        prev_year,
        next_month,
        next_year,
    }
}

/// Calendar rows: every event starting inside the month.
pub fn calendar_query(first: NaiveDate, last: NaiveDate) -> events::BoxedQuery<'static, Pg> {
    events::table
        .into_boxed()
        .filter(events::start_date.between(first, last))
        .order((events::start_date.asc(), events::id.asc()))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub date: Option<String>,
    pub department: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub text: Option<String>,
    pub date: Option<NaiveDate>,
    pub department: Option<String>,
    /// Restricts results to one kind; the other list comes back empty.
    pub only: Option<EventKind>,
}

impl From<&SearchParams> for SearchFilter {
    fn from(params: &SearchParams) -> Self {
        let only = match non_empty(&params.kind).as_deref() {
            Some("club") => Some(EventKind::Club),
            Some("department") => Some(EventKind::Department),
            _ => None,
        };
        SearchFilter {
            text: non_empty(&params.q),
            date: parse_date(&params.date),
            department: non_empty(&params.department),
            only,
        }
    }
}

impl SearchFilter {
    pub fn query(&self) -> events::BoxedQuery<'static, Pg> {
        let mut query = events::table.into_boxed();

        if let Some(text) = &self.text {
            let pattern = like_pattern(text);
            query = query.filter(
                events::name
                    .ilike(pattern.clone())
                    .or(events::venue.ilike(pattern)),
            );
        }
        if let Some(date) = self.date {
            query = query
                .filter(events::start_date.le(date))
                .filter(events::end_date.ge(date));
        }
        if let Some(department) = &self.department {
            query = query.filter(lower(events::department_name).eq(department.to_lowercase()));
        }
        if let Some(kind) = self.only {
            query = query.filter(events::kind.eq(kind.as_str()));
        }

        query.order((events::start_date.desc(), events::id.desc()))
    }
}

/// Splits matched events into club and department lists, keeping order.
pub fn partition_by_kind(events: Vec<Event>, only: Option<EventKind>) -> (Vec<Event>, Vec<Event>) {
    let (club, department): (Vec<Event>, Vec<Event>) = events
        .into_iter()
        .partition(|e| e.kind() == EventKind::Club);

    match only {
        Some(EventKind::Club) => (club, Vec::new()),
        Some(EventKind::Department) => (Vec::new(), department),
        None => (club, department),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
    Upcoming,
    Past,
    Today,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventListParams {
    pub q: Option<String>,
    pub department: Option<String>,
    pub club: Option<String>,
    pub fest: Option<String>,
    pub when: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct EventListFilter {
    pub text: Option<String>,
    pub department: Option<String>,
    pub club: Option<String>,
    pub fest: Option<String>,
    pub when: Option<When>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl From<&EventListParams> for EventListFilter {
    fn from(params: &EventListParams) -> Self {
        let when = match non_empty(&params.when).as_deref() {
            Some("upcoming") => Some(When::Upcoming),
            Some("past") => Some(When::Past),
            Some("today") => Some(When::Today),
            _ => None,
        };
        EventListFilter {
            text: non_empty(&params.q),
            department: non_empty(&params.department),
            club: non_empty(&params.club),
            fest: non_empty(&params.fest),
            when,
            start: parse_date(&params.start),
            end: parse_date(&params.end),
        }
    }
}

impl EventListFilter {
    /// Unordered so it can also back counts.
    pub fn query(&self, kind: EventKind, today: NaiveDate) -> events::BoxedQuery<'static, Pg> {
        let mut query = events::table
            .into_boxed()
            .filter(events::kind.eq(kind.as_str()));

        if let Some(text) = &self.text {
            let pattern = like_pattern(text);
            query = query.filter(
                events::name
                    .ilike(pattern.clone())
                    .or(events::venue.ilike(pattern)),
            );
        }
        if let Some(department) = &self.department {
            query = query.filter(events::department_name.eq(department.clone()));
        }
        match (kind, &self.club, &self.fest) {
            (EventKind::Club, Some(club), _) => {
                query = query.filter(events::club_name.eq(club.clone()));
            }
            (EventKind::Department, _, Some(fest)) => {
                query = query.filter(events::fest_name.eq(fest.clone()));
            }
            _ => {}
        }
        match self.when {
            Some(When::Upcoming) => query = query.filter(events::start_date.ge(today)),
            Some(When::Past) => query = query.filter(events::end_date.lt(today)),
            Some(When::Today) => {
                query = query
                    .filter(events::start_date.le(today))
                    .filter(events::end_date.ge(today))
            }
            None => {}
        }
        if let Some(start) = self.start {
            query = query.filter(events::start_date.ge(start));
        }
        if let Some(end) = self.end {
            query = query.filter(events::end_date.le(end));
        }

        query
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    pub month: String,
    pub count: usize,
}

/// The twelve calendar months ending with the current one, oldest first.
pub fn last_twelve_months(today: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut months = Vec::with_capacity(12);
    let (mut year, mut month) = (today.year(), today.month());
    for _ in 0..12 {
        if let Some(bounds) = month_bounds(year, month) {
            months.push(bounds);
        }
        if month == 1 {
            month = 12;
            year -= 1;
        } else {
            month -= 1;
        }
    }
    months.reverse();
    months
}

pub fn count_by_month(months: &[(NaiveDate, NaiveDate)], start_dates: &[NaiveDate]) -> Vec<MonthCount> {
    months
        .iter()
        .map(|(first, last)| MonthCount {
            month: first.format("%b %Y").to_string(),
            count: start_dates
                .iter()
                .filter(|d| *d >= first && *d <= last)
                .count(),
        })
        .collect()
}
