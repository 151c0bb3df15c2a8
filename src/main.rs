use tokio_util::sync::CancellationToken;
use tracing::info;

use varsel::app::{AppState, main_router, otlp_router, serve};
use varsel::app::tracing::init_tracing;
use varsel::config;
use varsel::error::VarselError;

#[tokio::main]
async fn main() -> Result<(), VarselError> {
    init_tracing();

    let settings = config::get_configuration().map_err(|e| VarselError::Config(e.to_string()))?;
    info!("Loaded settings");

    let state = AppState::from_settings(&settings);

    let app = main_router(state.coordinator.clone()).merge(otlp_router(state.coordinator.clone()));

    let shutdown_token = CancellationToken::new();
    serve(app, settings.http_port, shutdown_token).await
}
