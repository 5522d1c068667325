#![allow(dead_code, unused_imports)]

pub use jobvisor_test_utils::builders::{
    ConfigFileBuilder, Harness, HarnessBuilder, JobSpecBuilder, SupervisorConfigBuilder,
};
pub use jobvisor_test_utils::{
    InterruptBehaviour, RecordingSink, ScriptedLauncher, WorkerControl, init_tracing, settle,
    with_timeout, with_timeout_of,
};

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use http_body_util::BodyExt;
use jobvisor::http::REQUESTER_HEADER;
use serde_json::Value;
use tower::ServiceExt;

/// Send one request through the router, optionally as `requester` and with
/// a JSON body.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    requester: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(requester) = requester {
        builder = builder.header(REQUESTER_HEADER, requester);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
