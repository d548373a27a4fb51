//! Tests for the Twitch catalog and its credentials using mock servers.

use std::path::PathBuf;
use std::sync::Arc;

use httpmock::Method::GET;
use httpmock::Method::POST;
use httpmock::MockServer;
use livewatch::catalog::Catalog;
use livewatch::catalog::credentials::ClientCredentials;
use livewatch::catalog::credentials::CredentialCache;
use livewatch::catalog::credentials::TokenSource;
use livewatch::catalog::error::CatalogError;
use livewatch::catalog::twitch_catalog::TwitchCatalog;

/// Loads a test response file from the responses directory.
fn get_response(filename: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/responses");
    path.push(filename);
    std::fs::read_to_string(path).expect("Failed to read response file")
}

fn catalog_for(server: &MockServer) -> TwitchCatalog {
    let source = Arc::new(
        ClientCredentials::new(server.url("/oauth2/token"), "client-id", "client-secret")
            .expect("Failed to build token source"),
    );
    let credentials = Arc::new(CredentialCache::new("client-id", source));
    TwitchCatalog::new(server.url("/helix"), 100, credentials).expect("Failed to build catalog")
}

fn mock_token(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/oauth2/token")
            .query_param("client_id", "client-id")
            .query_param("client_secret", "client-secret")
            .query_param("grant_type", "client_credentials");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"access_token":"app-token","expires_in":5011271,"token_type":"bearer"}"#);
    })
}

#[tokio::test]
async fn test_fetch_live_items() {
    let server = MockServer::start();
    let catalog = catalog_for(&server);
    let token_mock = mock_token(&server);

    let streams_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/helix/streams")
            .query_param("game_id", "32982")
            .query_param("first", "100")
            .query_param("type", "live")
            .header("client-id", "client-id")
            .header("authorization", "Bearer app-token");
        then.status(200)
            .header("content-type", "application/json")
            .body(get_response("twitch_streams.json"));
    });

    let items = catalog
        .fetch_live_items("32982")
        .await
        .expect("Failed to fetch live items");

    token_mock.assert();
    streams_mock.assert();
    assert_eq!(items.len(), 2);

    let first = &items[0];
    assert_eq!(first.id, "40952121085");
    assert_eq!(first.broadcaster_id, "101051819");
    assert_eq!(first.broadcaster_login, "afro");
    assert_eq!(first.category_id, "32982");
    assert_eq!(first.viewer_count, 1490);
    assert_eq!(first.tags, vec!["English", "Roleplay"]);
    assert_eq!(first.language, "en");
    assert_eq!(first.started_at.timestamp(), 1617224246);
    assert_eq!(first.url, "https://www.twitch.tv/afro");
    assert_eq!(
        first.thumbnail(440, 248),
        "https://static-cdn.jtvnw.net/previews-ttv/live_user_afro-440x248.jpg"
    );

    // Null tags are an empty list.
    assert!(items[1].tags.is_empty());
}

#[tokio::test]
async fn test_token_is_reused_across_requests() {
    let server = MockServer::start();
    let catalog = catalog_for(&server);
    let token_mock = mock_token(&server);

    let streams_mock = server.mock(|when, then| {
        when.method(GET).path("/helix/streams");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"data":[],"pagination":{}}"#);
    });

    assert!(catalog.fetch_live_items("32982").await.unwrap().is_empty());
    assert!(catalog.fetch_live_items("509658").await.unwrap().is_empty());

    token_mock.assert_hits(1);
    streams_mock.assert_hits(2);
}

#[tokio::test]
async fn test_unauthorized_invalidates_token() {
    let server = MockServer::start();
    let catalog = catalog_for(&server);
    let token_mock = mock_token(&server);

    let streams_mock = server.mock(|when, then| {
        when.method(GET).path("/helix/streams");
        then.status(401)
            .header("content-type", "application/json")
            .body(r#"{"error":"Unauthorized","status":401,"message":"Invalid OAuth token"}"#);
    });

    for _ in 0..2 {
        match catalog.fetch_live_items("32982").await {
            Err(CatalogError::ApiError { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid OAuth token");
            }
            other => panic!("Expected ApiError, got {other:?}"),
        }
    }

    // Each rejection forces a fresh token on the next request.
    token_mock.assert_hits(2);
    streams_mock.assert_hits(2);
}

#[tokio::test]
async fn test_server_error_is_api_error() {
    let server = MockServer::start();
    let catalog = catalog_for(&server);
    let token_mock = mock_token(&server);

    server.mock(|when, then| {
        when.method(GET).path("/helix/streams");
        then.status(503).body("upstream unavailable");
    });

    let err = catalog.fetch_live_items("32982").await.unwrap_err();
    assert!(matches!(err, CatalogError::ApiError { status: 503, .. }));
    token_mock.assert_hits(1);
}

#[tokio::test]
async fn test_malformed_stream_is_skipped() {
    let server = MockServer::start();
    let catalog = catalog_for(&server);
    let _token_mock = mock_token(&server);

    server.mock(|when, then| {
        when.method(GET).path("/helix/streams");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"data":[
                {"id":"1","user_id":"2","user_login":null,"user_name":"X","game_id":"3","viewer_count":1,"started_at":"2021-03-31T20:57:26Z"},
                {"id":"4","user_id":"5","user_login":"y","user_name":"Y","game_id":"3","viewer_count":9,"started_at":"2021-03-31T20:57:26Z"}
            ]}"#);
    });

    let items = catalog.fetch_live_items("3").await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "4");
}

#[tokio::test]
async fn test_missing_data_is_rejected() {
    let server = MockServer::start();
    let catalog = catalog_for(&server);
    let _token_mock = mock_token(&server);

    server.mock(|when, then| {
        when.method(GET).path("/helix/streams");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"pagination":{}}"#);
    });

    let err = catalog.fetch_live_items("3").await.unwrap_err();
    assert!(matches!(err, CatalogError::MissingField { .. }));
}

#[tokio::test]
async fn test_client_credentials_are_encoded() {
    let server = MockServer::start();
    let token_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/oauth2/token")
            .query_param("client_id", "client-id")
            .query_param("client_secret", "s&c=r+t secret")
            .query_param("grant_type", "client_credentials");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"access_token":"app-token","expires_in":3600,"token_type":"bearer"}"#);
    });

    let source = ClientCredentials::new(server.url("/oauth2/token"), "client-id", "s&c=r+t secret")
        .expect("Failed to build token source");
    let token = source.fetch_token().await.expect("Failed to fetch token");

    token_mock.assert();
    assert_eq!(token.value, "app-token");
}

#[tokio::test]
async fn test_invalid_category_id_makes_no_request() {
    let server = MockServer::start();
    let catalog = catalog_for(&server);
    let token_mock = mock_token(&server);

    let err = catalog.fetch_live_items("abc&first=1").await.unwrap_err();

    assert!(matches!(err, CatalogError::InvalidCategoryId { .. }));
    token_mock.assert_hits(0);
}

#[tokio::test]
async fn test_client_credentials_rejected() {
    let server = MockServer::start();
    let token_mock = server.mock(|when, then| {
        when.method(POST).path("/oauth2/token");
        then.status(400)
            .body(r#"{"status":400,"message":"invalid client secret"}"#);
    });

    let source = ClientCredentials::new(server.url("/oauth2/token"), "client-id", "wrong")
        .expect("Failed to build token source");
    let err = source.fetch_token().await.unwrap_err();

    token_mock.assert();
    assert!(matches!(err, CatalogError::Unauthorized { .. }));
}
