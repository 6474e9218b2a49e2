use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::cluster::Cluster;
use crate::settings::{APP_NAME, APP_VERSION};

pub async fn root() -> String {
    format!("{} {}", APP_NAME, APP_VERSION)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AboutResponse {
    pub name: String,
    pub version: String,
    pub member_id: String,
    pub address: String,
}

#[instrument(skip(cluster))]
pub async fn about(State(cluster): State<Arc<Cluster>>) -> Json<AboutResponse> {
    Json(AboutResponse {
        name: APP_NAME.to_string(),
        version: APP_VERSION.to_string(),
        member_id: cluster.member_id().to_string(),
        address: cluster.address().to_string(),
    })
}
