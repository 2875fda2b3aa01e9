//! HTTP backend client against a mock REST server

use crate::common::*;
use crate::{assert_err, assert_ok};
use wardrobe_core::client::api::{HttpBackend, RemoteCollection, RemoteError};
use wardrobe_core::client::Config;
use wardrobe_core::shared::config::AppConfig;
use wardrobe_core::shared::wardrobe::{Outfit, WardrobeItem};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_for(server: &MockServer, token: Option<&str>) -> HttpBackend {
    let app = AppConfig::builder()
        .server_url(server.uri())
        .build()
        .expect("mock server url is valid");
    let mut config = Config::from_app(app);
    config.set_token(token.map(str::to_string));
    HttpBackend::new(config).expect("client builds")
}

#[tokio::test]
async fn test_list_sends_user_and_token() {
    let server = MockServer::start().await;
    let items = vec![item("i-1", "Oxford Shirt"), item("i-2", "Chelsea Boots")];
    Mock::given(method("GET"))
        .and(path("/api/v1/items"))
        .and(query_param("user_id", USER))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&items))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server, Some("secret"));
    let listed = assert_ok!(RemoteCollection::<WardrobeItem>::list(&backend, USER).await);

    pretty_assertions::assert_eq!(listed, items);
}

#[tokio::test]
async fn test_create_returns_stored_entity() {
    let server = MockServer::start().await;
    let mut stored = item("srv-9", "Oxford Shirt");
    stored.brand = Some("Acme".to_string());
    Mock::given(method("POST"))
        .and(path("/api/v1/items"))
        .and(body_partial_json(serde_json::json!({ "title": "Oxford Shirt" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(&stored))
        .mount(&server)
        .await;

    let backend = backend_for(&server, None);
    let created = assert_ok!(RemoteCollection::<WardrobeItem>::create(&backend, &item("local-1", "Oxford Shirt")).await);

    assert_eq!(created.id, "srv-9");
    assert_eq!(created.brand.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn test_outfits_use_their_own_resource() {
    let server = MockServer::start().await;
    let updated = outfit("o-1", "Office", &["i-1", "i-2"]);
    Mock::given(method("PATCH"))
        .and(path("/api/v1/outfits/o-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&updated))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server, None);
    let result = assert_ok!(RemoteCollection::<Outfit>::update(&backend, &updated).await);

    assert_eq!(result.item_ids, vec!["i-1".to_string(), "i-2".to_string()]);
}

#[tokio::test]
async fn test_missing_entity_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/items/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let backend = backend_for(&server, None);
    let result = RemoteCollection::<WardrobeItem>::delete(&backend, "gone").await;

    assert_eq!(result, Err(RemoteError::NotFound("gone".to_string())));
}

#[tokio::test]
async fn test_server_failure_keeps_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/items"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
        .mount(&server)
        .await;

    let backend = backend_for(&server, None);
    let result = RemoteCollection::<WardrobeItem>::list(&backend, USER).await;

    assert_eq!(
        result,
        Err(RemoteError::Server {
            status: 500,
            message: "database unavailable".to_string(),
        })
    );
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/outfits"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let backend = backend_for(&server, None);
    let result = RemoteCollection::<Outfit>::list(&backend, USER).await;

    assert_err!(result, RemoteError::Decode(_));
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    let app = AppConfig::builder()
        .server_url("http://127.0.0.1:9")
        .build()
        .expect("url is valid");
    let backend = HttpBackend::new(Config::from_app(app)).expect("client builds");

    let result = RemoteCollection::<WardrobeItem>::list(&backend, USER).await;

    assert_err!(result, RemoteError::Network(_));
}

#[tokio::test]
async fn test_entity_id_is_percent_encoded_in_path() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/items/wool%20coat%2F2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server, None);
    let result = RemoteCollection::<WardrobeItem>::delete(&backend, "wool coat/2").await;

    assert_ok!(result);
}
