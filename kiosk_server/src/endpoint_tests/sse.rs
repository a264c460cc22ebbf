use actix_web::{
    http::{header, StatusCode},
    test,
    test::TestRequest,
};
use kiosk_engine::{events::Topic, stream::SseDecoder};

use super::helpers::{authorized, init_app, json_post, next_chunk, send, test_config};
use crate::server::ServerState;

#[actix_web::test]
async fn unknown_topics_are_not_found() {
    let _ = env_logger::try_init();
    let config = test_config();
    let app = init_app(config.clone(), ServerState::new(&config)).await;
    let (status, body) = send(&app, authorized(TestRequest::get().uri("/sse/drinks"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Unknown event topic: drinks"));
}

#[actix_web::test]
async fn streams_need_the_access_token() {
    let _ = env_logger::try_init();
    let config = test_config();
    let app = init_app(config.clone(), ServerState::new(&config)).await;
    let (status, _) = send(&app, TestRequest::get().uri("/sse/orders")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, json_post("/sse/menu/publish", r#"{"event":"menu.updated"}"#)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn published_events_reach_the_stream() {
    let _ = env_logger::try_init();
    let config = test_config();
    let state = ServerState::new(&config);
    let app = init_app(config, state.clone()).await;

    let res = test::call_service(&app, authorized(TestRequest::get().uri("/sse/menu")).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get(header::CONTENT_TYPE).unwrap(), "text/event-stream");
    assert_eq!(res.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");
    let mut body = Box::pin(res.into_body());
    let hello = next_chunk(&mut body).await.unwrap();
    assert_eq!(hello.as_ref(), b": connected to menu\n\n");
    assert_eq!(state.broker.listeners(Topic::Menu), 1);

    let publish = json_post("/sse/menu/publish", r#"{"event":"menu.updated","payload":{"version":7}}"#);
    let (status, reply) = send(&app, authorized(publish)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, r#"{"event":"menu.updated","listeners":1}"#);

    let chunk = next_chunk(&mut body).await.unwrap();
    let frames = SseDecoder::new().feed(&chunk);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event_name(), "menu.updated");
    assert_eq!(frames[0].data, r#"{"version":7}"#);
    assert!(frames[0].id.is_some());

    drop(body);
    assert_eq!(state.broker.listeners(Topic::Menu), 0);
}

#[actix_web::test]
async fn events_must_match_their_topic() {
    let _ = env_logger::try_init();
    let config = test_config();
    let app = init_app(config.clone(), ServerState::new(&config)).await;
    let publish = json_post("/sse/menu/publish", r#"{"event":"order.paid","payload":{}}"#);
    let (status, body) = send(&app, authorized(publish)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("order.paid events belong on the orders topic"));

    // Kinds the kiosks may not know yet are passed through
    let publish = json_post("/sse/custom-cakes/publish", r#"{"event":"custom_cake.photo_added"}"#);
    let (status, body) = send(&app, authorized(publish)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"event":"custom_cake.photo_added","listeners":0}"#);
}
