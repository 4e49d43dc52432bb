//! Flows that depend on what the database holds. Each test migrates a fresh
//! schema and is skipped when `TEST_DATABASE_URL` is not set.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, NaiveDate, Utc};
use clue_portal::{auth, schema::*};
use common::{staff_token, ApiResponse, Database, Fixture};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::{json, Value};

async fn add_user(
    conn: &mut AsyncPgConnection,
    username: &str,
    password: &str,
    is_active: bool,
) -> i32 {
    diesel::insert_into(users::table)
        .values((
            users::username.eq(username),
            users::email.eq(format!("{username}@banasthali.in")),
            users::password_hash.eq(auth::hash_password(password).unwrap()),
            users::is_active.eq(is_active),
        ))
        .returning(users::id)
        .get_result(conn)
        .await
        .unwrap()
}

async fn count_users(conn: &mut AsyncPgConnection) -> i64 {
    users::table.count().get_result(conn).await.unwrap()
}

async fn count_resets(conn: &mut AsyncPgConnection) -> i64 {
    password_resets::table.count().get_result(conn).await.unwrap()
}

async fn login(fixture: &Fixture, username: &str, password: &str) -> StatusCode {
    fixture
        .post_json(
            "/api/auth/login",
            json!({ "username": username, "password": password }),
        )
        .await
        .status
}

async fn coordinator_login(fixture: &Fixture, username: &str, password: &str) -> ApiResponse {
    fixture
        .post_json(
            "/api/coordinator/login",
            json!({ "username": username, "password": password }),
        )
        .await
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn expired_resets_are_spent_without_changing_the_password() {
    let Some(db) = Database::create().await else {
        return;
    };
    let fixture = Fixture::with_database(&db);
    let conn = &mut db.connection().await;
    let user_id = add_user(conn, "asha", "original", true).await;

    diesel::insert_into(password_resets::table)
        .values((
            password_resets::user_id.eq(user_id),
            password_resets::reset_id.eq("stale"),
            password_resets::created_when.eq(Utc::now().naive_utc() - Duration::minutes(11)),
        ))
        .execute(conn)
        .await
        .unwrap();

    assert_eq!(
        fixture.get("/api/auth/password/reset/stale").await.status,
        StatusCode::OK
    );

    let response = fixture
        .post_json(
            "/api/auth/password/reset/stale",
            json!({ "password": "brand-new", "confirm_password": "brand-new" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["messages"], json!(["Reset link has expired"]));

    assert_eq!(count_resets(conn).await, 0);
    assert_eq!(
        fixture.get("/api/auth/password/reset/stale").await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(login(&fixture, "asha", "original").await, StatusCode::OK);
    assert_eq!(login(&fixture, "asha", "brand-new").await, StatusCode::UNAUTHORIZED);

    db.teardown().await;
}

#[tokio::test]
async fn resets_change_the_password_once() {
    let Some(db) = Database::create().await else {
        return;
    };
    let fixture = Fixture::with_database(&db);
    let conn = &mut db.connection().await;
    add_user(conn, "meera", "original", true).await;

    let response = fixture
        .post_json(
            "/api/auth/password/forgot",
            json!({ "email": "nobody@banasthali.in" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = fixture
        .post_json(
            "/api/auth/password/forgot",
            json!({ "email": "meera@banasthali.in" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    let reset_id: String = password_resets::table
        .select(password_resets::reset_id)
        .first(conn)
        .await
        .unwrap();
    let link = format!("/api/auth/password/reset/{reset_id}");

    let response = fixture
        .post_json(&link, json!({ "password": "abc", "confirm_password": "abd" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(count_resets(conn).await, 1);

    let response = fixture
        .post_json(
            &link,
            json!({ "password": "brand-new", "confirm_password": "brand-new" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(count_resets(conn).await, 0);

    assert_eq!(login(&fixture, "meera", "brand-new").await, StatusCode::OK);
    assert_eq!(login(&fixture, "meera", "original").await, StatusCode::UNAUTHORIZED);

    db.teardown().await;
}

#[tokio::test]
async fn rejected_registrations_store_nothing() {
    let Some(db) = Database::create().await else {
        return;
    };
    let fixture = Fixture::with_database(&db);
    let conn = &mut db.connection().await;

    let response = fixture
        .post_json(
            "/api/auth/register",
            json!({ "username": "outsider", "email": "outsider@gmail.com", "password": "long-enough" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json()["messages"],
        json!(["Only @banasthali.in emails are allowed for registration."])
    );
    assert_eq!(count_users(conn).await, 0);

    add_user(conn, "taken", "whatever", true).await;
    let response = fixture
        .post_json(
            "/api/auth/register",
            json!({ "username": "taken", "email": "taken@banasthali.in", "password": "abc" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json()["messages"],
        json!([
            "Username already exists.",
            "Email already exists.",
            "Password must be at least 5 characters."
        ])
    );
    assert_eq!(count_users(conn).await, 1);

    let response = fixture
        .post_json(
            "/api/auth/register",
            json!({ "username": "newcomer", "email": "newcomer@banasthali.in", "password": "long-enough" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(count_users(conn).await, 2);
    assert_eq!(
        login(&fixture, "newcomer", "long-enough").await,
        StatusCode::FORBIDDEN
    );

    db.teardown().await;
}

#[tokio::test]
async fn coordinator_login_needs_matching_name_and_password() {
    let Some(db) = Database::create().await else {
        return;
    };
    let staff = Fixture::with_database(&db).with_token(staff_token());
    let fixture = Fixture::with_database(&db);
    let conn = &mut db.connection().await;

    diesel::insert_into(departments::table)
        .values(departments::name.eq("Physics"))
        .execute(conn)
        .await
        .unwrap();
    diesel::insert_into(clubs::table)
        .values((clubs::name.eq("Drama"), clubs::department_name.eq("Physics")))
        .execute(conn)
        .await
        .unwrap();

    for (name, password, kind, club, department) in [
        ("drama-head", "curtain", "club", Some("Drama"), None),
        ("physics-head", "labcoat", "department", None, Some("Physics")),
    ] {
        let response = staff
            .post_json(
                "/api/coordinators",
                json!({
                    "coordinator_name": name,
                    "password": password,
                    "coordinator_type": kind,
                    "club_name": club,
                    "department_name": department,
                    "email": format!("{name}@banasthali.in"),
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{name}");
        assert!(response.json().get("password_hash").is_none());
    }

    let response = coordinator_login(&fixture, "drama-head", "curtain").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["redirect"], "/api/coordinator/dashboard");
    assert!(response.json()["token"].as_str().is_some());

    for (name, password) in [
        ("drama-head", "labcoat"),
        ("physics-head", "curtain"),
        ("nobody", "curtain"),
    ] {
        let response = coordinator_login(&fixture, name, password).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{name}/{password}");
        assert_eq!(response.json()["message"], "Invalid login credentials");
    }

    // fields and password change together
    let id: i32 = coordinators::table
        .filter(coordinators::name.eq("drama-head"))
        .select(coordinators::id)
        .first(conn)
        .await
        .unwrap();
    let response = staff
        .send_json(
            Method::PUT,
            &format!("/api/coordinators/{id}"),
            json!({
                "coordinator_name": "drama-head",
                "password": "spotlight",
                "coordinator_type": "club",
                "club_name": "Drama",
                "email": "stage@banasthali.in",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["email"], "stage@banasthali.in");
    assert_eq!(
        coordinator_login(&fixture, "drama-head", "curtain").await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        coordinator_login(&fixture, "drama-head", "spotlight").await.status,
        StatusCode::OK
    );

    // a rejected edit leaves the stored password alone
    let response = staff
        .send_json(
            Method::PUT,
            &format!("/api/coordinators/{id}"),
            json!({
                "coordinator_name": "drama-head",
                "password": "footlights",
                "coordinator_type": "club",
                "club_name": "No Such Club",
                "email": "stage@banasthali.in",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        coordinator_login(&fixture, "drama-head", "spotlight").await.status,
        StatusCode::OK
    );

    diesel::update(coordinators::table.filter(coordinators::name.eq("physics-head")))
        .set(coordinators::password_hash.eq("labcoat"))
        .execute(conn)
        .await
        .unwrap();
    assert_eq!(
        coordinator_login(&fixture, "physics-head", "labcoat").await.status,
        StatusCode::UNAUTHORIZED
    );

    db.teardown().await;
}

async fn seed_events(conn: &mut AsyncPgConnection) {
    diesel::insert_into(departments::table)
        .values(vec![
            departments::name.eq("Physics"),
            departments::name.eq("Chemistry"),
        ])
        .execute(conn)
        .await
        .unwrap();
    diesel::insert_into(clubs::table)
        .values((clubs::name.eq("Robotics"), clubs::department_name.eq("Physics")))
        .execute(conn)
        .await
        .unwrap();

    for (name, kind, start, end, department, club) in [
        ("50% Off Fair", "club", date(2025, 3, 10), date(2025, 3, 12), "Physics", Some("Robotics")),
        ("500 Club Meet", "department", date(2025, 3, 20), date(2025, 3, 20), "Chemistry", None),
        ("Quantum Night", "department", date(2025, 4, 1), date(2025, 4, 1), "Physics", None),
    ] {
        diesel::insert_into(events::table)
            .values((
                events::name.eq(name),
                events::kind.eq(kind),
                events::start_date.eq(start),
                events::end_date.eq(end),
                events::venue.eq("Main Hall"),
                events::department_name.eq(department),
                events::club_name.eq(club),
            ))
            .execute(conn)
            .await
            .unwrap();
    }
}

fn names(body: &Value, list: &str) -> Vec<String> {
    body[list]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn search_matches_text_department_and_date() {
    let Some(db) = Database::create().await else {
        return;
    };
    let fixture = Fixture::with_database(&db);
    seed_events(&mut db.connection().await).await;

    let cases: [(&str, &[&str], &[&str]); 7] = [
        // a literal percent sign, not a wildcard
        ("q=50%25", &["50% Off Fair"], &[]),
        ("q=500", &[], &["500 Club Meet"]),
        ("q=main+hall", &["50% Off Fair"], &["Quantum Night", "500 Club Meet"]),
        ("department=physics", &["50% Off Fair"], &["Quantum Night"]),
        ("date=2025-03-10", &["50% Off Fair"], &[]),
        ("date=2025-03-12", &["50% Off Fair"], &[]),
        ("type=department&department=PHYSICS", &[], &["Quantum Night"]),
    ];
    for (query, clubs, departments) in cases {
        let response = fixture.get(&format!("/api/search?{query}")).await;
        assert_eq!(response.status, StatusCode::OK, "{query}");
        let body = response.json();
        assert_eq!(names(&body, "club_events"), clubs, "{query}");
        assert_eq!(names(&body, "dept_events"), departments, "{query}");
    }

    let body = fixture.get("/api/search?date=2025-03-13").await.json();
    assert!(names(&body, "club_events").is_empty());
    assert!(names(&body, "dept_events").is_empty());
    assert_eq!(body["departments"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["departments"][0]["department_name"], "Chemistry");

    db.teardown().await;
}

#[tokio::test]
async fn calendar_shows_both_kinds_on_their_start_day() {
    let Some(db) = Database::create().await else {
        return;
    };
    let fixture = Fixture::with_database(&db);
    seed_events(&mut db.connection().await).await;

    let body = fixture
        .get("/api/calendar?month=3&year=2025")
        .await
        .json();
    assert_eq!(body["month"], "March");

    let shown: Vec<(u64, String, String)> = body["weeks"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|week| week.as_array().unwrap().iter())
        .flat_map(|day| {
            let number = day["day"].as_u64().unwrap();
            day["events"].as_array().unwrap().iter().map(move |e| {
                (
                    number,
                    e["name"].as_str().unwrap().to_string(),
                    e["type"].as_str().unwrap().to_string(),
                )
            })
        })
        .collect();
    assert_eq!(
        shown,
        vec![
            (10, "50% Off Fair".to_string(), "Club".to_string()),
            (20, "500 Club Meet".to_string(), "Department".to_string()),
        ]
    );

    db.teardown().await;
}
