use httpmock::prelude::*;
use media_parser::{
    CacheStrategy, MediaError, MediaParser, MediaService, ParseOptions, ParserConfig,
};
use std::time::Duration;

fn test_config() -> ParserConfig {
    ParserConfig::new()
        .with_https_upgrade(false)
        .with_timeout(Duration::from_secs(5))
}

async fn slow_page<'a>(server: &'a MockServer, path: &str, title: &str) -> httpmock::Mock<'a> {
    let body = format!("<html><head><title>{title}</title></head></html>");
    let path = path.to_string();
    server
        .mock_async(move |when, then| {
            when.method(GET).path(path);
            then.status(200)
                .header("content-type", "text/html")
                .delay(Duration::from_millis(200))
                .body(body);
        })
        .await
}

#[tokio::test]
async fn test_concurrent_requests_extract_once() {
    let server = MockServer::start_async().await;
    let page = slow_page(&server, "/article", "Article").await;

    let service = MediaService::new_with_config(test_config());
    let url = server.url("/article");
    let padded = format!("  {url}  ");

    let (a, b) = tokio::join!(service.parse(&url), service.parse(&padded));
    let (a, b) = (a.unwrap(), b.unwrap());

    page.assert_hits_async(1).await;
    assert_eq!(a.fields.title, "Article");
    assert_eq!(b.fields.title, "Article");
    // Each caller sees its own input.
    assert_eq!(a.url, url);
    assert_eq!(b.url, url);

    service.parse(&url).await.unwrap();
    page.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_force_recomputes_and_refreshes() {
    let server = MockServer::start_async().await;
    let page = slow_page(&server, "/news", "News").await;

    let service = MediaService::new_with_config(test_config());
    let url = server.url("/news");

    service.parse(&url).await.unwrap();
    service
        .parse_with(&url, ParseOptions { force: true })
        .await
        .unwrap();
    page.assert_hits_async(2).await;

    let cached = service.parse(&url).await.unwrap();
    assert_eq!(cached.fields.title, "News");
    page.assert_hits_async(2).await;
    assert!(service.cache.get(&url).is_some());
}

#[tokio::test]
async fn test_no_cache_strategy_always_extracts() {
    let server = MockServer::start_async().await;
    let page = slow_page(&server, "/live", "Live").await;

    let service = MediaService::new_with_config(
        test_config().with_cache_strategy(CacheStrategy::NoCache),
    );
    let url = server.url("/live");

    service.parse(&url).await.unwrap();
    service.parse(&url).await.unwrap();
    page.assert_hits_async(2).await;
    assert!(service.cache.is_empty());
}

#[tokio::test]
async fn test_batch_and_parser_trait() {
    let server = MockServer::start_async().await;
    slow_page(&server, "/one", "One").await;
    slow_page(&server, "/two", "Two").await;

    let service = MediaService::new_with_config(test_config());
    let one = server.url("/one");
    let two = server.url("/two");

    let results = service.parse_batch(&[one.as_str(), two.as_str(), "ftp://example.com/file"]).await;
    assert_eq!(results[0].as_ref().unwrap().fields.title, "One");
    assert_eq!(results[1].as_ref().unwrap().fields.title, "Two");
    assert!(matches!(results[2], Err(MediaError::InvalidUrl(_))));

    let parser: &dyn MediaParser = &service;
    let record = parser.parse(&one).await.unwrap();
    assert_eq!(record.fields.title, "One");
}

#[tokio::test]
async fn test_oembed_projection_of_parsed_record() {
    let server = MockServer::start_async().await;
    slow_page(&server, "/story", "Story").await;

    let service = MediaService::new_with_config(test_config());
    let url = server.url("/story");
    let record = service.parse(&url).await.unwrap();

    let viewer = format!("http://viewer.test/medias.html?url={url}");
    let data = service.as_oembed(&record, &viewer, 300, 150);

    assert_eq!(data.title, "Story");
    assert_eq!(data.provider_name, "page");
    assert_eq!(data.provider_url, "http://127.0.0.1");
    assert_eq!((data.width, data.height), (300, 150));
    assert!(data.html.starts_with(&format!("<iframe src=\"{viewer}\"")));
}

#[tokio::test]
async fn test_blank_input_is_rejected() {
    let service = MediaService::new_with_config(test_config());
    let err = service.parse("   ").await.unwrap_err();
    assert!(matches!(err, MediaError::InvalidUrl(_)));
}
