use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use meetscribe_worker::config::WorkerConfig;
use meetscribe_worker::manager::WorkerManager;
use meetscribe_worker::store::StoreClient;

struct HealthState {
    worker_id: String,
    mode: &'static str,
    metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() {
    let config = match WorkerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!(worker_id = %config.worker_id, mode = ?config.mode, "meetscribe worker starting");

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    let store = match StoreClient::connect(&config.store_url, 10).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to coordination store");
            std::process::exit(1);
        }
    };

    if let Err(e) = store.migrate().await {
        tracing::error!(error = %e, "Failed to run coordination store migrations");
        std::process::exit(1);
    }

    let store = Arc::new(store);

    let health_port = config.port;
    let mode_label = config.mode.as_db_str();
    let worker_id = config.worker_id;

    let manager = Arc::new(WorkerManager::new(config, Arc::clone(&store)));
    let cancel = manager.cancellation_token();

    let health_server = health_port.map(|port| {
        let state = Arc::new(HealthState {
            worker_id: worker_id.to_string(),
            mode: mode_label,
            metrics_handle,
        });

        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state);

        let cancel = cancel.clone();
        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!(error = %e, port, "Failed to bind health server port");
                    return;
                }
            };

            tracing::info!(port, "Health endpoint listening");

            axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
                .ok();
        })
    });

    let manager_task = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run().await })
    };

    wait_for_shutdown_signal().await;
    tracing::info!("Shutdown signal received");
    manager.shutdown();

    let exit_code = match manager_task.await {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Worker manager exited with error");
            1
        }
        Err(e) => {
            tracing::error!(error = %e, "Worker manager task panicked");
            1
        }
    };

    if let Some(health_server) = health_server {
        let _ = health_server.await;
    }

    std::process::exit(exit_code);
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "workerId": state.worker_id,
        "mode": state.mode,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> String {
    state.metrics_handle.render()
}
