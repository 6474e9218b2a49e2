mod base;
mod members;

use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    error_handling::HandleErrorLayer, http::StatusCode, response::IntoResponse, routing, Router,
};
use tokio::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

pub mod paths;

pub use base::{AboutResponse, HealthResponse};

use crate::cluster::Cluster;

/// Read-only status API over a joined cluster member
pub fn api(cluster: Arc<Cluster>) -> Router {
    Router::new()
        .route(paths::base::ROOT, routing::get(base::root))
        .route(paths::base::HEALTH, routing::get(base::health))
        .route(paths::base::ABOUT, routing::get(base::about))
        .route(paths::members::MEMBERS, routing::get(members::list_members))
        // static segment wins over the capture in axum's router
        .route(paths::members::SUSPECTED, routing::get(members::suspected_members))
        .route(paths::members::MEMBER, routing::get(members::get_member))
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .timeout(Duration::from_secs(10)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(cluster)
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Cow::from("service is overloaded, try again later"),
        );
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Cow::from(format!("Unhandled internal error: {}", error)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::MembershipRecord;
    use crate::settings::ClusterConfig;
    use crate::transport::MemoryNetwork;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn cluster() -> Arc<Cluster> {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.bind().unwrap());
        Arc::new(
            Cluster::join_with_transport(ClusterConfig::default(), transport)
                .await
                .unwrap(),
        )
    }

    async fn get(router: Router, path: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let cluster = cluster().await;
        let (status, body) = get(api(Arc::clone(&cluster)), paths::base::HEALTH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        cluster.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_members_lists_local_member() {
        let cluster = cluster().await;
        let (status, body) = get(api(Arc::clone(&cluster)), paths::members::MEMBERS).await;
        assert_eq!(status, StatusCode::OK);
        let members: Vec<MembershipRecord> = serde_json::from_value(body).unwrap();
        assert_eq!(members, vec![cluster.local_member()]);
        cluster.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_member_lookup() {
        let cluster = cluster().await;
        let path = paths::member_path(cluster.member_id());
        let (status, body) = get(api(Arc::clone(&cluster)), &path).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], cluster.member_id());
        assert_eq!(body["status"], "ALIVE");

        let (status, body) = get(api(Arc::clone(&cluster)), &paths::member_path("nobody")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "not_found");

        let (status, body) = get(api(Arc::clone(&cluster)), paths::members::SUSPECTED).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
        cluster.shutdown().await.unwrap();
    }
}
