use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, path::Path, sync::Arc};
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phishnet_engine::{
    classifier::load_latest_model,
    parser::UrlParser,
    routes::{self, AppState},
    Config, PredictionEngine, UrlFeatureExtractor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phishnet_engine=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    info!(
        "Loaded configuration: models in {}, {} concurrent predictions",
        config.model_dir, config.max_concurrent_predictions
    );

    // No model, no service
    let model = load_latest_model(Path::new(&config.model_dir))?;

    let parser = UrlParser::load(&config).await?;
    let extractor = UrlFeatureExtractor::new(&config)?;
    let engine = PredictionEngine::new(parser, extractor, model, config.max_concurrent_predictions);

    // Initialize metrics recorder, rendered by GET /metrics
    let metrics = PrometheusBuilder::new().install_recorder()?;

    let state = Arc::new(AppState {
        engine,
        deadline: config.prediction_deadline(),
        metrics: Some(metrics),
    });

    let app: Router = routes::router(state.clone())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting PhishNet prediction engine on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            state.engine.close();
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Shutdown signal received, starting graceful shutdown");
}
