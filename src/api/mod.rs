use axum::Router;

pub mod analytics;
pub mod auth;
pub mod club;
pub mod coordinator;
pub mod department;
pub mod event;
pub mod fest;
pub mod gallery;
pub mod notice;
pub mod pages;
pub mod password;
pub mod reports;

pub fn app() -> Router {
    Router::new()
        .merge(pages::app())
        .nest("/auth", auth::app())
        .nest("/coordinator", coordinator::session_app())
        .nest("/coordinators", coordinator::app())
        .nest("/departments", department::app())
        .nest("/clubs", club::app())
        .nest("/fests", fest::app())
        .nest("/events", event::club_app())
        .nest("/department-events", event::department_app())
        .nest("/stats", event::stats_app())
        .nest("/notices", notice::app())
        .nest("/analytics", analytics::app())
        .nest("/gallery", gallery::app())
        .nest("/reports", reports::app())
}
