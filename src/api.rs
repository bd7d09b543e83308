use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use log::{error, info};

use crate::db::Database;
use crate::models::CoverageObservation;

/// Read API: stored observations, newest first, as a JSON array of
/// `{city, values, type, timestamp}`.
pub fn router(db: Database) -> Router {
    Router::new()
        .route("/api/observations", get(list_observations))
        .with_state(db)
}

pub async fn serve(db: Database, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind read API to {addr}"))?;
    info!("Read API listening on {addr}");
    axum::serve(listener, router(db))
        .await
        .context("read API server exited")
}

async fn list_observations(
    State(db): State<Database>,
) -> Result<Json<Vec<CoverageObservation>>, StatusCode> {
    match db.list_observations().await {
        Ok(observations) => Ok(Json(observations)),
        Err(err) => {
            error!("Failed to list observations: {err:#}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
