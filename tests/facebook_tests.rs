use httpmock::prelude::*;
use media_parser::{
    ApiCredentials, ApiEndpoints, ErrorKind, EvidenceSource, Fetcher, MediaService, MediaType,
    ParserConfig, Provider, Subtype,
};
use serde_json::json;
use std::time::Duration;

const POST_URL: &str = "https://www.facebook.com/teste637621352/posts/1028416870556238";
const POST_UUID: &str = "749262715138323_1028416870556238";

/// Graph and oEmbed point at the mock server; no redirect probing leaves
/// the machine.
fn facebook_config(server: &MockServer) -> ParserConfig {
    let endpoints = ApiEndpoints {
        facebook_graph: server.url("/v2.6"),
        facebook_oembed: server.url("/plugins/post/oembed.json/"),
        ..Default::default()
    };
    let credentials = ApiCredentials {
        facebook_auth_token: Some("test-token".to_string()),
        ..Default::default()
    };

    ParserConfig::new()
        .with_credentials(credentials)
        .with_endpoints(endpoints)
        .with_https_upgrade(false)
        .with_max_redirects(0)
        .with_timeout(Duration::from_secs(5))
}

/// A fetcher for which www.facebook.com resolves to the mock server.
fn facebook_host_fetcher(server: &MockServer) -> Fetcher {
    let client = |redirects| {
        reqwest::Client::builder()
            .resolve("www.facebook.com", *server.address())
            .redirect(redirects)
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    };
    Fetcher::with_clients(
        client(reqwest::redirect::Policy::limited(10)),
        client(reqwest::redirect::Policy::none()),
    )
}

#[tokio::test]
async fn test_post_identity_comes_from_graph_owner() {
    let server = MockServer::start_async().await;
    let graph = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v2.6/1028416870556238")
                .query_param("access_token", "test-token");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "id": POST_UUID,
                    "type": "status",
                    "message": "This is just a test with many photos.",
                    "created_time": "2016-05-25T17:39:38+0000",
                    "from": {"name": "Teste", "id": "749262715138323"}
                }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/plugins/post/oembed.json/");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "author_name": "Teste",
                    "provider_url": "https://www.facebook.com",
                    "html": "<div class=\"fb-post\"></div>"
                }));
        })
        .await;

    let service = MediaService::new_with_config(facebook_config(&server));
    let record = service.parse(POST_URL).await.unwrap();

    graph.assert_hits_async(1).await;
    assert_eq!(record.provider, Provider::Facebook);
    assert_eq!(record.media_type, MediaType::Item);
    assert_eq!(record.identity.uuid, POST_UUID);
    assert_eq!(record.identity.user_uuid, "749262715138323");
    assert_eq!(record.identity.object_id, "1028416870556238");

    let fields = &record.fields;
    assert_eq!(fields.media_count, Some(0));
    assert_eq!(fields.author_name, "Teste");
    assert_eq!(fields.title, "Teste on Facebook");
    assert_eq!(fields.description, "This is just a test with many photos.");
    assert_eq!(fields.author_url, "http://facebook.com/749262715138323");
    assert_eq!(
        fields.author_picture,
        "https://graph.facebook.com/749262715138323/picture"
    );
    assert!(fields.published_at.is_some());
    assert!(fields.html.contains(POST_URL));

    assert!(record.raw.contains(EvidenceSource::Api));
    assert_eq!(
        record.raw.get(EvidenceSource::Oembed).unwrap()["provider_url"],
        "https://www.facebook.com"
    );
    assert!(record.error.is_none());

    let json = record.to_json();
    assert_eq!(json["uuid"], POST_UUID);
    assert_eq!(json["media_count"], 0);
    assert_eq!(json["raw"]["api"]["from"]["name"], "Teste");
}

#[tokio::test]
async fn test_rate_limit_reaches_the_caller() {
    let server = MockServer::start_async().await;
    let graph = server
        .mock_async(|when, then| {
            when.method(GET).path("/v2.6/1028416870556238");
            then.status(403)
                .header("content-type", "application/json")
                .json_body(json!({
                    "error": {"code": 4, "message": "Application request limit reached"}
                }));
        })
        .await;

    let service = MediaService::new_with_config(facebook_config(&server));

    let err = service.parse(POST_URL).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(err.kind(), ErrorKind::RateLimited);

    // Nothing was cached, so the next call asks again.
    assert!(service.parse(POST_URL).await.is_err());
    graph.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_expired_token_falls_back_to_markup() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v2.6/1028416870556238");
            then.status(400)
                .header("content-type", "application/json")
                .json_body(json!({
                    "error": {"code": 190, "message": "Error validating access token"}
                }));
        })
        .await;
    let page = server
        .mock_async(|when, then| {
            when.method(GET).path("/teste637621352/posts/1028416870556238");
            then.status(200)
                .header("content-type", "text/html")
                .body(
                    r#"<html><head>
                    <meta property="og:title" content="Teste">
                    <meta property="og:description" content="Post text See Translation">
                    <meta property="og:image" content="https://scontent.example/photo.jpg">
                    </head><body>
                    <script>{"entity_id":"749262715138323","username":"teste637621352"}</script>
                    </body></html>"#,
                );
        })
        .await;

    let service = MediaService::new_with_config(facebook_config(&server))
        .with_fetcher(facebook_host_fetcher(&server));

    let url = format!(
        "http://www.facebook.com:{}/teste637621352/posts/1028416870556238",
        server.port()
    );
    let record = service.parse(&url).await.unwrap();

    page.assert_hits_async(1).await;
    assert_eq!(record.provider, Provider::Facebook);
    assert_eq!(record.identity.uuid, POST_UUID);
    assert_eq!(record.error.as_ref().unwrap().kind, ErrorKind::AuthInvalid);

    let fields = &record.fields;
    assert_eq!(fields.author_name, "Teste");
    assert_eq!(fields.username, "teste637621352");
    assert_eq!(fields.text, "Post text");
    assert_eq!(fields.picture, "https://scontent.example/photo.jpg");
    assert_eq!(fields.photos, vec!["https://scontent.example/photo.jpg"]);
    assert_eq!(fields.media_count, Some(0));
    assert!(!record.raw.contains(EvidenceSource::Api));
}

#[tokio::test]
async fn test_equivalent_post_urls_share_uuid() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v2.6/100009078379548_1649526595359937");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "id": "100009078379548_1649526595359937",
                    "type": "status",
                    "message": "Same post",
                    "from": {"name": "Someone", "id": "100009078379548"}
                }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v2.6/1649526595359937");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "id": "100009078379548_1649526595359937",
                    "type": "status",
                    "message": "Same post",
                    "from": {"name": "Someone", "id": "100009078379548"}
                }));
        })
        .await;

    let service = MediaService::new_with_config(facebook_config(&server));
    let permalink = service
        .parse("https://www.facebook.com/permalink.php?story_fbid=1649526595359937&id=100009078379548")
        .await
        .unwrap();
    let post = service
        .parse("https://www.facebook.com/someone/posts/1649526595359937")
        .await
        .unwrap();

    assert_eq!(permalink.identity.uuid, "100009078379548_1649526595359937");
    assert_eq!(post.identity.uuid, permalink.identity.uuid);
}

#[tokio::test]
async fn test_event_owner_does_not_rekey_uuid() {
    let server = MockServer::start_async().await;
    let graph = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v2.6/364677040588691")
                .query_param("fields", "id,type,owner,updated_time,description,name");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "id": "364677040588691",
                    "name": "Nascimento de Jesus",
                    "description": "Christmas celebration",
                    "updated_time": "2016-12-20T10:00:00+0000",
                    "owner": {"name": "Igreja", "id": "1234567890"}
                }));
        })
        .await;

    let service = MediaService::new_with_config(facebook_config(&server));
    let record = service
        .parse("https://www.facebook.com/events/364677040588691/")
        .await
        .unwrap();

    graph.assert_hits_async(1).await;
    assert_eq!(record.subtype, Some(Subtype::Event));
    assert_eq!(record.identity.object_id, "364677040588691");
    assert_eq!(record.identity.uuid, "364677040588691");
    assert_eq!(record.identity.user_uuid, "1234567890");

    let fields = &record.fields;
    assert_eq!(fields.author_name, "Nascimento de Jesus");
    assert_eq!(fields.description, "Christmas celebration");
    assert_eq!(fields.author_url, "http://facebook.com/1234567890");
    assert_eq!(
        fields.author_picture,
        "https://graph.facebook.com/364677040588691/picture"
    );
}

#[tokio::test]
async fn test_unknown_script_params_degrade_to_empty_identity() {
    let server = MockServer::start_async().await;
    let page = server
        .mock_async(|when, then| {
            when.method(GET).path("/photo.php");
            then.status(404);
        })
        .await;

    let service = MediaService::new_with_config(facebook_config(&server))
        .with_fetcher(facebook_host_fetcher(&server));
    let url = format!("http://www.facebook.com:{}/photo.php?foo=bar", server.port());
    let record = service.parse(&url).await.unwrap();

    page.assert_hits_async(1).await;
    assert_eq!(record.provider, Provider::Facebook);
    assert_eq!(record.media_type, MediaType::Item);
    assert!(record.identity.is_empty());
    assert_eq!(record.identity.uuid, "");

    let fields = &record.fields;
    assert_eq!(fields.author_name, "Not Identified");
    assert_eq!(fields.title, "Not Identified on Facebook");
    assert_eq!(fields.picture, "");
    assert_eq!(fields.author_url, "");
    assert!(!record.raw.contains(EvidenceSource::Api));
}
