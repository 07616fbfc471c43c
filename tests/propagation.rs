//! End-to-end propagation through the service router.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use hop_trace::http::middleware::{trace_context_middleware, PropagationState};
use hop_trace::trace::{HostNetwork, OriginClassifier, TraceHandle, TRACEPARENT, TRACESTATE};
use hop_trace::HttpServer;
use tower::ServiceExt;

mod common;

const TRACE: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90";

fn header<'a>(res: &'a axum::http::Response<Body>, name: &str) -> Option<&'a str> {
    res.headers().get(name).map(|v| v.to_str().unwrap())
}

#[tokio::test]
async fn external_request_without_context_starts_root_trace() {
    let router = HttpServer::new(common::test_config(common::TEST_HOST)).router();
    let req = common::request_from("203.0.113.5", Request::builder().uri("/"));

    let res = router.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let parent = header(&res, TRACEPARENT).unwrap().to_string();
    let parts: Vec<&str> = parent.split('-').collect();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0], "00");
    assert_eq!(parts[1].len(), 32);
    assert_ne!(parts[1], "0".repeat(32));
    assert_eq!(parts[2], "0100000000000000");
    assert_eq!(parts[3], "00");
    assert!(header(&res, TRACESTATE).is_none());

    let body = common::json_body(res).await;
    assert_eq!(body["trace"]["trace_id"], parts[1]);
    assert_eq!(body["trace"]["span_id"], "0100000000000000");
    assert_eq!(body["node_state"], "01");
    assert_eq!(body["internal"], false);
}

#[tokio::test]
async fn internal_request_reuses_context() {
    let router = HttpServer::new(common::test_config(common::TEST_HOST)).router();
    let req = common::request_from(
        "10.0.0.7",
        Request::builder()
            .uri("/")
            .header(TRACEPARENT, format!("00-{TRACE}-a1b2c30000000000-00"))
            .header(TRACESTATE, "node=03"),
    );

    let res = router.oneshot(req).await.unwrap();
    assert_eq!(
        header(&res, TRACEPARENT),
        Some(format!("00-{TRACE}-a1b2c30300000000-00").as_str())
    );
    assert_eq!(header(&res, TRACESTATE), Some("node=03"));

    let body = common::json_body(res).await;
    assert_eq!(body["trace"]["trace_id"], TRACE);
    assert_eq!(body["trace"]["span_id"], "a1b2c30300000000");
    assert_eq!(body["node_state"], "03");
    assert_eq!(body["internal"], true);
}

#[tokio::test]
async fn external_request_discards_inbound_context() {
    let router = HttpServer::new(common::test_config(common::TEST_HOST)).router();
    let req = common::request_from(
        "8.8.8.8",
        Request::builder()
            .uri("/")
            .header(TRACEPARENT, format!("00-{TRACE}-a1b2c30000000000-00"))
            .header(TRACESTATE, "node=03"),
    );

    let res = router.oneshot(req).await.unwrap();
    let parent = header(&res, TRACEPARENT).unwrap();
    assert!(!parent.contains(TRACE));
    assert!(parent.ends_with("-0100000000000000-00"));
    assert!(header(&res, TRACESTATE).is_none());
}

#[tokio::test]
async fn own_subnet_is_trusted() {
    let router = HttpServer::new(common::test_config(common::TEST_HOST)).router();
    let req = common::request_from(
        "198.51.100.200",
        Request::builder()
            .uri("/")
            .header(TRACEPARENT, format!("00-{TRACE}-a1b2c30000000000-00")),
    );

    let res = router.oneshot(req).await.unwrap();
    assert_eq!(
        header(&res, TRACEPARENT),
        Some(format!("00-{TRACE}-a1b2c30100000000-00").as_str())
    );
    assert_eq!(header(&res, TRACESTATE), Some("node=01"));
}

#[tokio::test]
async fn ipv6_link_local_is_trusted() {
    let router = HttpServer::new(common::test_config(common::TEST_HOST)).router();
    let req = common::request_from_v6(
        "fe80::1",
        Request::builder()
            .uri("/")
            .header(TRACEPARENT, format!("00-{TRACE}-a1b2c30000000000-00"))
            .header(TRACESTATE, "node=02"),
    );

    let res = router.oneshot(req).await.unwrap();
    assert_eq!(
        header(&res, TRACEPARENT),
        Some(format!("00-{TRACE}-a1b2c30200000000-00").as_str())
    );
}

#[tokio::test]
async fn malformed_context_from_internal_caller_regenerates() {
    let router = HttpServer::new(common::test_config(common::TEST_HOST)).router();
    for bad in [
        format!("01-{TRACE}-a1b2c30000000000-00"),
        format!("00-{}-a1b2c30000000000-00", &TRACE[..30]),
        format!("00-{TRACE}-A1B2C30000000000-00"),
        "not a trace header".to_string(),
    ] {
        let req = common::request_from(
            "10.0.0.7",
            Request::builder()
                .uri("/")
                .header(TRACEPARENT, bad.as_str())
                .header(TRACESTATE, "node=05"),
        );
        let res = router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{bad}");

        let parent = header(&res, TRACEPARENT).unwrap();
        assert!(!parent.contains(TRACE), "{bad}");
        assert!(parent.ends_with("-0100000000000000-00"), "{bad}");
        // Internal callers still get their (root) state echoed.
        assert_eq!(header(&res, TRACESTATE), Some("node=01"), "{bad}");
    }
}

#[tokio::test]
async fn relay_paths_reach_handler() {
    let router = HttpServer::new(common::test_config(common::TEST_HOST)).router();
    for path in ["/relay", "/relay/", "/relay/anything", "/relay?q=1"] {
        let req = common::request_from("10.0.0.7", Request::builder().uri(path));

        let res = router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
        assert!(header(&res, TRACEPARENT).is_some(), "{path}");

        // The router fallback would answer with an empty body.
        let body = common::json_body(res).await;
        assert_eq!(body["code"], "404", "{path}");
        assert_eq!(body["error"], "no downstream service configured", "{path}");
    }
}

#[tokio::test]
async fn headers_flushed_once_when_handler_writes_early() {
    let classifier = OriginClassifier::new(
        Some(HostNetwork::from_addr(common::TEST_HOST.parse().unwrap())),
        Vec::new(),
    );
    let app = Router::new()
        .route(
            "/",
            get(|trace: TraceHandle| async move {
                let mut response = "early".into_response();
                assert!(trace.write_response_headers(response.headers_mut()));
                assert!(!trace.write_response_headers(response.headers_mut()));
                response
            }),
        )
        .layer(middleware::from_fn_with_state(
            PropagationState::new(classifier),
            trace_context_middleware,
        ));

    let req = common::request_from(
        "10.0.0.7",
        Request::builder()
            .uri("/")
            .header(TRACEPARENT, format!("00-{TRACE}-a1b2c30000000000-00"))
            .header(TRACESTATE, "node=03"),
    );
    let res = app.oneshot(req).await.unwrap();

    assert_eq!(res.headers().get_all(TRACEPARENT).iter().count(), 1);
    assert_eq!(res.headers().get_all(TRACESTATE).iter().count(), 1);
}
