//! Event photo galleries, kept as plain files under
//! `{MEDIA_ROOT}/event_gallery/{event_id}/` and served from `/media`.

use crate::{
    auth::ExtractAuth,
    config::Config,
    error::{AppError, AppResult},
};
use axum::{
    extract::{ContentLengthLimit, Multipart, Path},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Component, Path as FsPath, PathBuf},
    sync::Arc,
};
use tokio::fs;

const GALLERY_DIR: &str = "event_gallery";
/// Largest accepted upload request, all files together.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

fn gallery_dir(media_root: &FsPath, event_id: i32) -> PathBuf {
    media_root.join(GALLERY_DIR).join(event_id.to_string())
}

fn media_url(event_id: i32, file_name: &str) -> String {
    format!("/media/{GALLERY_DIR}/{event_id}/{file_name}")
}

fn has_image_extension(file_name: &str) -> bool {
    FsPath::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct GalleryImage {
    id: usize,
    event_id: i32,
    image_url: String,
    caption: String,
    uploaded_at: String,
}

/// Image files in an event's gallery, by name. A gallery that was never
/// uploaded to is empty.
async fn list_images(media_root: &FsPath, event_id: i32) -> io::Result<Vec<GalleryImage>> {
    let mut entries = match fs::read_dir(gallery_dir(media_root, event_id)).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            if has_image_extension(name) && entry.file_type().await?.is_file() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    Ok(names
        .into_iter()
        .enumerate()
        .map(|(id, name)| GalleryImage {
            id,
            event_id,
            image_url: media_url(event_id, &name),
            caption: String::new(),
            uploaded_at: String::new(),
        })
        .collect())
}

#[derive(Serialize)]
struct GalleryResponse {
    images: Vec<GalleryImage>,
}

async fn gallery(
    Extension(config): Extension<Arc<Config>>,
    Path(event_id): Path<i32>,
) -> AppResult<Json<GalleryResponse>> {
    Ok(Json(GalleryResponse {
        images: list_images(&config.media_root(), event_id).await?,
    }))
}

/// The final path component of an uploaded file's name, if it is usable.
fn safe_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(|c: char| c == '/' || c == '\\').next()?.trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Sniffs the content; the client's declared type is ignored.
fn image_mime(bytes: &[u8]) -> Option<mime::Mime> {
    let kind = infer::get(bytes)?;
    let parsed = kind.mime_type().parse::<mime::Mime>().ok()?;
    (parsed.type_() == mime::IMAGE).then_some(parsed)
}

#[derive(Serialize)]
struct UploadedImage {
    filename: String,
    url: String,
    content_type: String,
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    uploaded: Vec<UploadedImage>,
}

async fn upload(
    _: ExtractAuth,
    Extension(config): Extension<Arc<Config>>,
    Path(event_id): Path<i32>,
    ContentLengthLimit(mut multipart): ContentLengthLimit<Multipart, MAX_UPLOAD_BYTES>,
) -> AppResult<Json<UploadResponse>> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("images") {
            continue;
        }
        let Some(name) = field.file_name().and_then(safe_file_name) else {
            return Err(AppError::from(StatusCode::BAD_REQUEST, "invalid file name"));
        };
        let bytes = field.bytes().await?;
        let Some(content_type) = image_mime(&bytes) else {
            return Err(AppError::from(
                StatusCode::BAD_REQUEST,
                format!("{name} is not an image"),
            ));
        };
        files.push((name, content_type, bytes));
    }

    if files.is_empty() {
        return Err(AppError::from(StatusCode::BAD_REQUEST, "No files provided"));
    }

    let dir = gallery_dir(&config.media_root(), event_id);
    fs::create_dir_all(&dir).await?;

    let mut uploaded = Vec::with_capacity(files.len());
    for (name, content_type, bytes) in files {
        fs::write(dir.join(&name), &bytes).await?;
        tracing::info!(event = event_id, file = %name, size = bytes.len(), "gallery image saved");
        uploaded.push(UploadedImage {
            url: media_url(event_id, &name),
            filename: name,
            content_type: content_type.to_string(),
        });
    }

    Ok(Json(UploadResponse {
        success: true,
        uploaded,
    }))
}

/// Resolves a client supplied media path, refusing anything that would
/// leave the media root.
fn resolve_media_path(media_root: &FsPath, image_path: &str) -> Option<PathBuf> {
    let relative = image_path
        .trim()
        .trim_start_matches("/media/")
        .trim_start_matches('/');
    if relative.is_empty() {
        return None;
    }

    let mut resolved = media_root.to_path_buf();
    for component in FsPath::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(resolved)
}

#[derive(Deserialize)]
struct DeleteRequest {
    image_path: Option<String>,
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
}

async fn delete_image(
    _: ExtractAuth,
    Extension(config): Extension<Arc<Config>>,
    Path((event_id, image_id)): Path<(i32, String)>,
    Json(req): Json<DeleteRequest>,
) -> AppResult<Json<DeleteResponse>> {
    let not_found = || AppError::from(StatusCode::NOT_FOUND, "Image not found");

    let path = req
        .image_path
        .as_deref()
        .and_then(|p| resolve_media_path(&config.media_root(), p))
        .ok_or_else(not_found)?;

    match fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(not_found()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(e.into()),
    }
    fs::remove_file(&path).await?;

    tracing::info!(event = event_id, image = %image_id, path = %path.display(), "gallery image deleted");
    Ok(Json(DeleteResponse { success: true }))
}

pub fn app() -> Router {
    Router::new()
        .route("/:event_id", get(gallery))
        .route("/:event_id/upload", post(upload))
        .route("/:event_id/images/:image_id", delete(delete_image))
}
