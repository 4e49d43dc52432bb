mod common;

use axum::{
    body::Body,
    http::{Method, StatusCode},
};
use clue_portal::api::gallery::MAX_UPLOAD_BYTES;
use common::{student_token, Fixture};
use serde_json::json;

const BOUNDARY: &str = "portal-test-boundary";
const PNG: [u8; 16] = [
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
];

fn multipart(parts: &[(&str, &str, &[u8])]) -> (String, Body) {
    let mut body = Vec::new();
    for (field, file_name, content) in parts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    (
        format!("multipart/form-data; boundary={BOUNDARY}"),
        Body::from(body),
    )
}

async fn upload(
    fixture: &Fixture,
    event_id: i32,
    parts: &[(&str, &str, &[u8])],
) -> common::ApiResponse {
    let (content_type, body) = multipart(parts);
    fixture
        .request(
            Method::POST,
            &format!("/api/gallery/{event_id}/upload"),
            Some(&content_type),
            body,
        )
        .await
}

#[tokio::test]
async fn empty_gallery_lists_nothing() {
    let response = Fixture::new().get("/api/gallery/12").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "images": [] }));
}

#[tokio::test]
async fn uploaded_images_are_listed_and_served() {
    let fixture = Fixture::new().with_token(student_token());

    let response = upload(&fixture, 3, &[("images", "stage.png", &PNG[..])]).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["uploaded"][0]["url"], "/media/event_gallery/3/stage.png");
    assert_eq!(body["uploaded"][0]["content_type"], "image/png");

    let listing = fixture.get("/api/gallery/3").await.json();
    assert_eq!(listing["images"][0]["image_url"], "/media/event_gallery/3/stage.png");
    assert_eq!(listing["images"][0]["event_id"], 3);

    let served = fixture.get("/media/event_gallery/3/stage.png").await;
    assert_eq!(served.status, StatusCode::OK);
    assert_eq!(&served.body[..], &PNG[..]);
}

#[tokio::test]
async fn uploads_overwrite_same_named_files() {
    let fixture = Fixture::new().with_token(student_token());
    let mut second = PNG.to_vec();
    second.extend_from_slice(b"-v2");

    upload(&fixture, 8, &[("images", "a.png", &PNG[..])]).await;
    upload(&fixture, 8, &[("images", "a.png", &second[..])]).await;

    let stored = std::fs::read(fixture.media.path().join("event_gallery/8/a.png")).unwrap();
    assert_eq!(stored, second);
    assert_eq!(
        fixture.get("/api/gallery/8").await.json()["images"]
            .as_array()
            .map(Vec::len),
        Some(1)
    );
}

#[tokio::test]
async fn uploads_without_images_are_rejected() {
    let fixture = Fixture::new().with_token(student_token());

    let response = upload(&fixture, 1, &[("caption", "notes.txt", &b"hello"[..])]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["message"], "No files provided");

    let response = upload(&fixture, 1, &[("images", "fake.png", &b"not really a png"[..])]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(!fixture.media.path().join("event_gallery/1/fake.png").exists());
}

#[tokio::test]
async fn oversized_uploads_are_refused_unread() {
    let fixture = Fixture::new().with_token(student_token());
    let mut huge = PNG.to_vec();
    huge.resize(MAX_UPLOAD_BYTES as usize + 1, 0);

    let response = upload(&fixture, 2, &[("images", "huge.png", &huge[..])]).await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!fixture.media.path().join("event_gallery/2").exists());
}

#[tokio::test]
async fn uploads_must_declare_their_length() {
    let fixture = Fixture::new().with_token(student_token());
    let (content_type, _) = multipart(&[("images", "a.png", &PNG[..])]);
    // a streamed body has no length to declare
    let (_sender, streamed) = Body::channel();

    let response = fixture
        .request(
            Method::POST,
            "/api/gallery/2/upload",
            Some(&content_type),
            streamed,
        )
        .await;
    assert_eq!(response.status, StatusCode::LENGTH_REQUIRED);
}

#[tokio::test]
async fn images_can_be_deleted_once() {
    let fixture = Fixture::new().with_token(student_token());
    upload(&fixture, 5, &[("images", "crowd.png", &PNG[..])]).await;
    let path = fixture.media.path().join("event_gallery/5/crowd.png");
    assert!(path.exists());

    let delete = || {
        fixture.send_json(
            Method::DELETE,
            "/api/gallery/5/images/0",
            json!({ "image_path": "event_gallery/5/crowd.png" }),
        )
    };

    let response = delete().await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "success": true }));
    assert!(!path.exists());

    let response = delete().await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["message"], "Image not found");
}

#[tokio::test]
async fn deletes_cannot_escape_the_media_root() {
    let fixture = Fixture::new().with_token(student_token());
    let response = fixture
        .send_json(
            Method::DELETE,
            "/api/gallery/5/images/0",
            json!({ "image_path": "../Cargo.toml" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reports_check_their_input_first() {
    let fixture = Fixture::new().with_token(student_token());

    let response = fixture
        .post_json("/api/reports/generate", json!({ "format": "pdf" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["message"], "event_id is required");

    let response = fixture
        .post_json(
            "/api/reports/generate",
            json!({ "event_id": 1, "format": "csv" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json()["message"],
        r#"Invalid format. Use "pdf" or "excel""#
    );
}

#[tokio::test]
async fn report_listing_is_empty() {
    let response = Fixture::new()
        .with_token(student_token())
        .get("/api/reports?event_id=4")
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "reports": [] }));
}
