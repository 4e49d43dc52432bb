use std::{io, sync::Arc};

use axum::{http::StatusCode, routing::get_service, Extension, Router};
use deadpool::managed::Pool;
use diesel_async::{pooled_connection::AsyncDieselConnectionManager, AsyncPgConnection};
use tower_http::services::ServeDir;

pub mod api;
pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod models;
pub mod query;
pub mod schema;

use auth::Sessions;
use config::Config;
use email::Mailer;

pub type DbPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Builds the pool without connecting; connections open on first use.
pub fn connect_to_db(db_url: &str) -> anyhow::Result<DbPool> {
    let db_config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
    Pool::builder(db_config)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build database pool: {e}"))
}

pub fn app(config: Arc<Config>) -> Router {
    let media = get_service(ServeDir::new(config.media_root())).handle_error(handle_error);
    Router::new()
        .nest("/api", api::app())
        .nest("/media", media)
        .layer(Extension(Sessions::shared()))
        .layer(Extension(config))
}

/// The application with its database and mail transport attached.
pub fn service(config: Arc<Config>, pool: DbPool, mailer: Mailer) -> Router {
    app(config)
        .layer(Extension(pool))
        .layer(Extension(Arc::new(mailer)))
}

async fn handle_error(_: io::Error) -> error::AppError {
    error::AppError::from(StatusCode::INTERNAL_SERVER_ERROR, "failed to fetch media")
}
