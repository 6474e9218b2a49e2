use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use tracing::instrument;

use crate::cluster::Cluster;
use crate::error::{GossamerError, Result};
use crate::membership::MembershipRecord;
use crate::transport::Address;

/// Every member this node believes is not DEAD, itself included
#[instrument(skip(cluster))]
pub async fn list_members(State(cluster): State<Arc<Cluster>>) -> Json<Vec<MembershipRecord>> {
    Json(cluster.members())
}

#[instrument(skip(cluster))]
pub async fn get_member(
    State(cluster): State<Arc<Cluster>>,
    Path(member_id): Path<String>,
) -> Result<Json<MembershipRecord>> {
    cluster
        .member(&member_id)
        .map(Json)
        .ok_or_else(|| GossamerError::NotFound(format!("member {}", member_id)))
}

/// Addresses the local failure detector currently suspects
#[instrument(skip(cluster))]
pub async fn suspected_members(State(cluster): State<Arc<Cluster>>) -> Json<Vec<Address>> {
    let mut suspected = cluster.suspected_members();
    suspected.sort();
    Json(suspected)
}
