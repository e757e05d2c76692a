//! Portfolio Edge - request handlers behind a personal portfolio site.
//!
//! # API Endpoints
//!
//! - `GET /probe` - Caller IP and geolocation
//! - `GET /telemetry` - Geolocation plus an access log record
//! - `POST /sos` - Broadcast an SOS alert
//! - `POST /face-compare` - Compare two faces
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use portfolio_edge::config::Settings;
use portfolio_edge::gateway;
use portfolio_edge::handlers::{AlertDispatcher, BiometricCompare, GeoProbe, TelemetryProbe};
use portfolio_edge::services::{AnthropicClient, FaceCompareClient, IpApiClient, NtfyPublisher};
use portfolio_edge::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment filter
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("portfolio_edge=info".parse()?))
        .init();

    let settings = Settings::from_env();

    info!(
        port = settings.port,
        db_url = %settings.database_url,
        table = %settings.probe_table,
        region = %settings.region,
        "Starting Portfolio Edge"
    );

    if settings.alert_topic.is_none() {
        warn!("ALERT_TOPIC is not set; /sos will answer 500");
    }
    if settings.vision_api_key.is_none() {
        warn!("VISION_API_KEY is not set; face analysis will be skipped");
    }

    // Initialize storage
    let storage = Storage::new(&settings.database_url, &settings.probe_table).await?;
    info!(table = storage.table(), "Database initialized");

    // Service clients are built once and shared by every invocation
    let locator = IpApiClient::with_base_url(&settings.geo_api_url, settings.geo_timeout);

    let app = gateway::app(
        GeoProbe::new(locator.clone()),
        TelemetryProbe::new(locator, storage, settings.telemetry_offset),
        AlertDispatcher::new(
            NtfyPublisher::with_base_url(&settings.broadcast_url),
            settings.alert_topic.clone(),
            settings.region.clone(),
        ),
        BiometricCompare::new(
            FaceCompareClient::with_base_url(&settings.face_compare_url),
            AnthropicClient::with_base_url(
                &settings.vision_api_url,
                settings.vision_api_key.clone(),
                &settings.vision_model,
            ),
        ),
    );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Portfolio Edge is listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
