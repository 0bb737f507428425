#![allow(dead_code)]
//! Shared fixtures for the integration tests.

pub mod app;
pub mod fs_watch;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use dingrelay::{
    api::{routes, Api},
    config::{Config, Target},
    state::{ConfigState, StateHolder},
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

/// A two-alert payload as Alertmanager sends it.
pub fn sample_payload() -> String {
    json!({
        "version": "4",
        "groupKey": "{}:{alertname=\"HighLatency\"}",
        "status": "firing",
        "receiver": "dingtalk",
        "groupLabels": {"alertname": "HighLatency"},
        "commonLabels": {"alertname": "HighLatency", "severity": "critical"},
        "commonAnnotations": {},
        "externalURL": "http://alertmanager.local:9093",
        "alerts": [
            {
                "status": "firing",
                "labels": {"alertname": "HighLatency", "instance": "api-1"},
                "annotations": {"summary": "p99 latency above 2s"},
                "startsAt": "2024-05-01T10:00:00Z",
                "endsAt": "0001-01-01T00:00:00Z",
                "generatorURL": "http://prometheus.local/graph"
            },
            {
                "status": "firing",
                "labels": {"alertname": "HighLatency", "instance": "api-2"},
                "annotations": {"summary": "p99 latency above 2s"},
                "startsAt": "2024-05-01T10:01:00Z",
                "generatorURL": "http://prometheus.local/graph"
            }
        ]
    })
    .to_string()
}

/// A robot that answers every POST to `/robot/send` with `errcode`.
pub async fn mock_robot(errcode: i64, errmsg: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/robot/send"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"errcode": errcode, "errmsg": errmsg})),
        )
        .mount(&server)
        .await;
    server
}

pub fn robot_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/robot/send?access_token=test", server.uri())).unwrap()
}

/// A config with a single target `ops` pointing at `url`.
pub fn config_with_target(url: Url) -> Config {
    let mut config = Config::default();
    config
        .targets
        .insert("ops".to_string(), Target::new("ops", url));
    config
}

/// Publishes `config` as the first generation of a fresh holder.
pub async fn holder_for(config: Config) -> Arc<StateHolder> {
    let config = config.finalize().unwrap();
    let state = ConfigState::build(config).await.unwrap();
    let holder = Arc::new(StateHolder::new().unwrap());
    holder.update(state);
    holder
}

pub async fn router_for(config: Config) -> Router {
    routes(Api::new(holder_for(config).await))
}

/// Drives `router` in-process and returns status and body text.
pub async fn request(router: Router, method: &str, uri: &str, body: impl Into<Body>) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub async fn post_send(router: Router, name: &str, body: impl Into<Body>) -> (StatusCode, String) {
    request(router, "POST", &format!("/{}/send", name), body).await
}
