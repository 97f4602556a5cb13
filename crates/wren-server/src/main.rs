mod health;
mod ws;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::{Router, routing::get};
use color_eyre::eyre::{Context, Result};
use tower_http::cors::{Any, CorsLayer};

use wren_worker::{WorkerConfig, WrenWorker};

use crate::health::ConnectionHealth;

pub(crate) struct AppState {
    pub worker: Arc<WrenWorker>,
    pub health: ConnectionHealth,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .from_env_lossy()
                .add_directive("wren_server=info".parse().unwrap())
                .add_directive("wren_worker=info".parse().unwrap())
                .add_directive("wren_engine=info".parse().unwrap())
                .add_directive("wren_store=info".parse().unwrap()),
        )
        .init();

    let host_dir = find_host_dir()?;
    let data_dir = resolve_data_dir()?;
    tracing::info!("Automation host directory: {}", host_dir.display());

    let worker = Arc::new(
        WrenWorker::new(WorkerConfig { host_dir, data_dir })
            .await
            .wrap_err("Failed to create worker")?,
    );
    worker.start().await;

    let state = Arc::new(AppState {
        worker: worker.clone(),
        health: ConnectionHealth::new(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws::websocket_handler))
        .route("/healthz", get(healthz))
        .layer(cors)
        .with_state(state);

    let host = std::env::var("WREN_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("WREN_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4500);
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Bridge listening at ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, closing engine sessions");
    worker.shutdown().await;
    Ok(())
}

async fn healthz(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "health": state.health.state() }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn resolve_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("WREN_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let dirs = directories::ProjectDirs::from("dev", "wren", "wren")
        .ok_or_else(|| color_eyre::eyre::eyre!("Could not resolve a data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

/// The automation host ships beside the binaries as `host/`; walk up from
/// the executable, then try the working directory.
fn find_host_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("WREN_HOST_DIR") {
        let dir = PathBuf::from(dir);
        if dir.join("package.json").exists() {
            return Ok(dir);
        }
        return Err(color_eyre::eyre::eyre!(
            "WREN_HOST_DIR does not contain a package.json: {}",
            dir.display()
        ));
    }

    let exe_path = std::env::current_exe()?;
    let mut current = exe_path.parent();
    while let Some(dir) = current {
        let host = dir.join("host");
        if host.join("package.json").exists() {
            return Ok(host);
        }
        current = dir.parent();
    }

    let cwd = std::env::current_dir()?;
    let host = cwd.join("host");
    if host.join("package.json").exists() {
        return Ok(host);
    }

    Err(color_eyre::eyre::eyre!(
        "Could not find the automation host directory. Run from the project root or set WREN_HOST_DIR."
    ))
}
