//! Integration tests for the `reqwest` transport against a local HTTP server

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::Arc;

use composable_api_core::transport::Headers;
use composable_api_core::{
    ApiAction, CancelToken, Method, Params, Payload, RequestBody, RequestConfig, Transport,
    TransportError, Value,
};
use composable_api_runtime::{ApiMiddleware, MiddlewareOptions, ReqwestTransport, Settled};
use composable_api_testing::{RecordingNext, RecordingStore, TestAction};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(url: String, method: Method, body: RequestBody) -> RequestConfig {
    RequestConfig {
        url,
        method,
        headers: Headers::new(),
        body,
        cancel: CancelToken::never(),
    }
}

fn params(value: Value) -> Params {
    let Value::Object(params) = value else {
        panic!("expected an object");
    };
    params
}

#[tokio::test]
async fn test_get_sends_query_and_parses_json() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/fetch"))
        .and(query_param("id", "7"))
        .and(query_param("name", "Alejandro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"id": 7}})))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::with_default_timeout().unwrap();
    let response = transport
        .request(request(
            format!("{}/users/fetch", server.uri()),
            Method::Get,
            RequestBody::Query(params(json!({"id": 7, "name": "Alejandro", "skip": null}))),
        ))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.data, json!({"user": {"id": 7}}));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users"))
        .and(body_json(json!({"name": "Alejandro"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::with_default_timeout().unwrap();
    let response = transport
        .request(request(
            format!("{}/users", server.uri()),
            Method::Post,
            RequestBody::Data(params(json!({"name": "Alejandro"}))),
        ))
        .await
        .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.data, json!({"id": 1}));
}

#[tokio::test]
async fn test_non_success_status_is_rejected_with_response() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/users/7"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "missing"})))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::with_default_timeout().unwrap();
    let error = transport
        .request(request(
            format!("{}/users/7", server.uri()),
            Method::Delete,
            RequestBody::Query(Params::new()),
        ))
        .await
        .unwrap_err();

    let TransportError::Status { response } = error else {
        panic!("expected a status rejection, got {error:?}");
    };
    assert_eq!(response.status, 404);
    assert_eq!(response.data, json!({"error": "missing"}));
}

#[tokio::test]
async fn test_plain_text_body_is_kept_as_string() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Down for maintenance"))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::with_default_timeout().unwrap();
    let response = transport
        .request(request(
            format!("{}/status", server.uri()),
            Method::Get,
            RequestBody::Query(Params::new()),
        ))
        .await
        .unwrap();

    assert_eq!(response.data, json!("Down for maintenance"));
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    let transport = ReqwestTransport::with_default_timeout().unwrap();
    let error = transport
        .request(request(
            "http://127.0.0.1:1/unreachable".to_string(),
            Method::Get,
            RequestBody::Query(Params::new()),
        ))
        .await
        .unwrap_err();

    assert!(matches!(error, TransportError::Network { .. }));
}

#[tokio::test]
async fn test_middleware_revalidates_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/fetch"))
        .and(header("If-None-Match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/fetch"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_json(json!({"user": {"name": "Alejandro"}})),
        )
        .mount(&server)
        .await;

    let config = MiddlewareOptions::new()
        .base(server.uri())
        .use_etags(true)
        .build()
        .unwrap();
    let middleware: ApiMiddleware<TestAction, Value> =
        ApiMiddleware::new(config, Arc::new(ReqwestTransport::with_default_timeout().unwrap()));
    let store = RecordingStore::new(json!({}));
    let next = RecordingNext::new();

    let action = || {
        ApiAction::new("API", ["FETCH_USER", "FETCH_USER_SUCCESS", "FETCH_USER_FAILED"])
            .with_payload(|_| {
                Payload::new("/users/fetch")
                    .on_success(TestAction::from_success)
                    .on_not_modified_dispatch(TestAction::custom("USE_CACHE"))
            })
    };

    let first = middleware
        .handle(&store.access(), &next.handle(), action().into())
        .await
        .unwrap();
    assert!(matches!(first, Settled::Completed(ref response) if response.status == 200));

    let second = middleware
        .handle(&store.access(), &next.handle(), action().into())
        .await
        .unwrap();
    assert_eq!(second, Settled::NotModified);

    let actions = store.actions();
    assert_eq!(actions.len(), 2);
    assert!(matches!(actions[0], TestAction::Success { .. }));
    assert_eq!(actions[1], TestAction::custom("USE_CACHE"));
}
