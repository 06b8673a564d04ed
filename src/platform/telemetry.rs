use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::platform::config::ObservabilitySettings;
use crate::platform::service::ServiceRegistration;

pub fn telemetry_service(settings: ObservabilitySettings) -> ServiceRegistration {
    ServiceRegistration::new(
        "telemetry",
        Arc::new(move |_ctx, token: CancellationToken| {
            let settings = settings.clone();
            tokio::spawn(async move {
                let outcome: Result<()> = async {
                    if !settings.enable_metrics {
                        return Ok(());
                    }

                    let app = Router::new()
                        .route("/metrics", get(metrics_handler))
                        .route("/healthz", get(healthz_handler));
                    let addr = SocketAddr::from(([0, 0, 0, 0], settings.metrics_port));
                    let shutdown = token.clone();

                    let listener = tokio::net::TcpListener::bind(addr).await?;
                    info!(port = settings.metrics_port, "telemetry server started");

                    axum::serve(listener, app)
                        .with_graceful_shutdown(async move {
                            shutdown.cancelled().await;
                            info!("shutting down telemetry server");
                        })
                        .await?;

                    Ok(())
                }
                .await;

                outcome
            })
        }),
    )
}

async fn healthz_handler() -> &'static str {
    "ok"
}

async fn metrics_handler() -> String {
    use prometheus::Encoder;

    let families = prometheus::gather();
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %err, "failed to encode prometheus metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
