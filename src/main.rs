mod api;
mod cache;
mod config;
mod models;
mod providers;
mod rt;
mod services;
mod stations;
mod stream;

use axum::http::{header, HeaderValue, Method};
use std::path::Path;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use api::{ApiDoc, AppState};
use config::Config;
use providers::cicero::CiceroClient;
use providers::italo::ItaloClient;
use providers::motis::MotisClient;
use providers::trentino::TrentinoClient;
use providers::viaggiatreno::ViaggiatrenoClient;
use stations::StationDirectory;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "binario=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;
    info!(config = %config_path, "Starting realtime transit server");

    let stations = match StationDirectory::load(Path::new(&config.stations_path)) {
        Ok(directory) => directory,
        Err(e) => {
            warn!(error = %e, path = %config.stations_path, "Station directory unavailable, name matching disabled");
            StationDirectory::empty()
        }
    };

    let providers = &config.providers;
    let state = AppState {
        stations: Arc::new(stations),
        viaggiatreno: Arc::new(ViaggiatrenoClient::new(&providers.viaggiatreno.base_url)?),
        italo: Arc::new(ItaloClient::new(&providers.italo.base_url)?),
        trentino: Arc::new(TrentinoClient::new(
            &providers.trentino.base_url,
            &providers.trentino.username,
            &providers.trentino.password,
        )?),
        cicero: Arc::new(CiceroClient::new(
            &providers.cicero.base_url,
            &providers.cicero.agency,
        )?),
        motis: Arc::new(MotisClient::new(&providers.motis.base_url)?),
        poll: config.polling.to_poll_config(),
    };

    // Configure CORS
    let cors = if config.cors_permissive {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET])
            .allow_headers([header::CONTENT_TYPE])
    };

    // Build router
    let (app, openapi) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(api::trips::get_trip))
        .routes(routes!(api::trips::get_trip_position))
        .routes(routes!(api::trips::stream_trip))
        .routes(routes!(api::departures::get_departures))
        .routes(routes!(api::board::get_board))
        .routes(routes!(api::directions::get_directions))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .split_for_parts();

    let app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi));

    // Start server
    info!(address = %config.bind_address, "Listening");
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
