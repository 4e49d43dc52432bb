use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clue_portal::{auth, config::Config, connect_to_db, email::Mailer};
use envconfig::Envconfig;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logger(debug: bool) -> anyhow::Result<()> {
    let log_level = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| log_level.into());

    let subscriber = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_target(false);

    tracing_subscriber::registry()
        .with(subscriber)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

fn cors(config: &Config) -> CorsLayer {
    let origin = match config.allowed_origins() {
        None => AllowOrigin::from(Any),
        Some(hosts) => AllowOrigin::list(
            hosts
                .iter()
                .filter_map(|host| host.parse::<HeaderValue>().ok()),
        ),
    };

    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_origin(origin)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::init_from_env().context("failed to read configuration")?;
    init_logger(config.is_debug())?;
    auth::install_secret(&config.secret_key);

    let mailer = Mailer::from_config(&config)?;
    if let Err(e) = mailer.sanity_check().await {
        tracing::warn!(error = %e, "email sanity check failed. verification and password reset mail will not be delivered");
    }

    let pool = connect_to_db(&config.db_url)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let cors = cors(&config);

    let app = clue_portal::service(Arc::new(config), pool, mailer)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        );

    tracing::info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .context("unexpected error happened in server")
        .map_err(|e| {
            tracing::error!(error.cause_chain = ?e, error.message = %e, "server stopped");
            e
        })
}
