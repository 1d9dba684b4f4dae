//! RICO web server
//!
//! Serves the single-page UI and the turn API. Capture runs through the
//! configured recorder; without one, voice turns report no speech.

use rico::api::{create_router, AppState};
use rico::capture::{CaptureError, CapturedAudio};
use rico::config::Config;
use rico::runtime::{AudioSource, Assistant};
use rico::state_machine::CaptureMode;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Stand-in device for a server without a recorder
struct NoMicrophone;

#[async_trait::async_trait]
impl AudioSource for NoMicrophone {
    async fn record(
        &self,
        _mode: CaptureMode,
        _window: Duration,
        _cancel: CancellationToken,
    ) -> Result<CapturedAudio, CaptureError> {
        Err(CaptureError::Failed("No recorder configured (set RICO_RECORDER)".into()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rico::logging::init(true);

    let config = Config::from_env();
    config.validate();

    let source = config
        .recorder_source()
        .unwrap_or_else(|| Arc::new(NoMicrophone) as Arc<dyn AudioSource>);
    let wiring = config.services(source)?;
    tracing::info!(dir = %wiring.store.dir().display(), "Audio store ready");

    let assistant = Arc::new(Assistant::new(wiring.services, config.context));
    let state = AppState::new(assistant, wiring.store);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("RICO server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
