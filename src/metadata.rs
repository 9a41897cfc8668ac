use crate::fetcher::OEmbedPayload;
use crate::record::{is_blank, Fields};
use crate::utils;
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use tracing::debug;

/// Everything read from one HTML document, one `Fields` per dialect.
///
/// `scraper::Html` is not `Send`, so documents are parsed and dropped inside
/// [`MetadataExtractor::extract`] and only owned data crosses await points.
#[derive(Debug, Clone, Default)]
pub struct PageMetadata {
    /// Attributes of every `<meta>` element, in document order.
    pub metatags: Vec<BTreeMap<String, String>>,
    pub basic: Fields,
    pub opengraph: Fields,
    pub twitter: Fields,
    /// Discovered `application/json+oembed` endpoint, absolute.
    pub oembed_url: Option<String>,
    /// `link[rel=canonical]`, falling back to `og:url`.
    pub canonical_url: Option<String>,
}

/// Metadata extractor for the HTML dialects a page can speak.
#[derive(Clone)]
pub struct MetadataExtractor;

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, html: &str, url: &str) -> PageMetadata {
        let document = Html::parse_document(html);

        let metadata = PageMetadata {
            metatags: self.extract_metatags(&document),
            basic: self.extract_basic(&document, url),
            opengraph: self.extract_opengraph(&document),
            twitter: self.extract_twitter_card(&document),
            oembed_url: self.extract_oembed_url(&document, url),
            canonical_url: self.extract_canonical_url(&document, url),
        };

        debug!(
            url = %url,
            metatags = metadata.metatags.len(),
            oembed = metadata.oembed_url.is_some(),
            "Extracted page metadata"
        );
        metadata
    }

    fn extract_metatags(&self, document: &Html) -> Vec<BTreeMap<String, String>> {
        let Ok(selector) = Selector::parse("meta") else {
            return Vec::new();
        };

        document
            .select(&selector)
            .map(|el| {
                el.value()
                    .attrs()
                    .filter(|(_, value)| !is_blank(value))
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect::<BTreeMap<_, _>>()
            })
            .filter(|attrs| !attrs.is_empty())
            .collect()
    }

    fn extract_basic(&self, document: &Html, url: &str) -> Fields {
        let title = self
            .meta_content(document, "name", "title")
            .or_else(|| self.extract_title_tag(document))
            .unwrap_or_default();

        Fields {
            title,
            description: self
                .meta_content(document, "name", "description")
                .unwrap_or_default(),
            username: self.meta_content(document, "name", "author").unwrap_or_default(),
            author_url: utils::top_url(url).unwrap_or_default(),
            ..Default::default()
        }
    }

    fn extract_opengraph(&self, document: &Html) -> Fields {
        let og = |key: &str| self.meta_content(document, "property", key).unwrap_or_default();

        Fields {
            title: og("og:title"),
            picture: og("og:image"),
            description: og("og:description"),
            username: og("article:author"),
            published_at: utils::parse_timestamp(&og("article:published_time")),
            ..Default::default()
        }
    }

    fn extract_twitter_card(&self, document: &Html) -> Fields {
        // Sites mix up `name` and `property` for twitter tags; `property`
        // wins when both are present.
        let card = |key: &str| {
            self.meta_content(document, "property", key)
                .or_else(|| self.meta_content(document, "name", key))
                .unwrap_or_default()
        };

        let username = card("twitter:creator");
        let author_url = if is_blank(&username) {
            String::new()
        } else {
            format!("https://twitter.com/{}", username.trim_start_matches('@'))
        };

        Fields {
            title: card("twitter:title"),
            picture: card("twitter:image"),
            description: card("twitter:description"),
            username,
            author_url,
            ..Default::default()
        }
    }

    fn extract_oembed_url(&self, document: &Html, url: &str) -> Option<String> {
        let selector = Selector::parse("link[type='application/json+oembed']").ok()?;
        let href = document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("href"))?;

        let href = utils::add_scheme(href.trim(), url);
        Some(utils::absolute_url(url, Some(&href)))
    }

    fn extract_canonical_url(&self, document: &Html, url: &str) -> Option<String> {
        let selector = Selector::parse("link[rel='canonical']").ok()?;
        let href = document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string)
            .or_else(|| self.meta_content(document, "property", "og:url"))
            .filter(|href| !is_blank(href))?;

        let absolute = utils::absolute_url(url, Some(&href));
        if absolute.starts_with("http://") || absolute.starts_with("https://") {
            Some(absolute)
        } else {
            None
        }
    }

    fn extract_title_tag(&self, document: &Html) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|title| !title.is_empty())
    }

    fn meta_content(&self, document: &Html, attr: &str, key: &str) -> Option<String> {
        let selector = Selector::parse(&format!("meta[{attr}='{key}']")).ok()?;
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Reads a tweet out of the `<blockquote>` markup an oEmbed endpoint
    /// returns.
    pub fn extract_from_oembed(&self, oembed_html: &str) -> Fields {
        let document = Html::parse_fragment(oembed_html);

        let tweet_text = Selector::parse("p")
            .ok()
            .and_then(|selector| {
                document
                    .select(&selector)
                    .next()
                    .map(|el| el.text().collect::<String>())
            })
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let posted = Selector::parse("a")
            .ok()
            .and_then(|selector| {
                document
                    .select(&selector)
                    .last()
                    .map(|el| el.text().collect::<String>())
            })
            .and_then(|text| utils::parse_timestamp(&text));

        Fields {
            title: tweet_text.clone(),
            description: tweet_text.clone(),
            text: tweet_text,
            published_at: posted,
            ..Default::default()
        }
    }
}

/// The oEmbed dialect. Frame-restricted embeds keep no `html`.
pub fn oembed_fields(payload: &OEmbedPayload) -> Fields {
    let data = &payload.data;
    Fields {
        title: data.title.clone(),
        username: data.author_name.clone(),
        author_name: data.author_name.clone(),
        author_url: data.author_url.clone(),
        picture: data.thumbnail_url.clone(),
        html: if payload.frame_restricted {
            String::new()
        } else {
            data.html.clone()
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::OEmbedResponse;
    use serde_json::json;

    const PAGE: &str = r#"<html><head>
        <title> Fallback title </title>
        <meta name="description" content="Basic description">
        <meta name="author" content="Caio">
        <meta property="og:title" content="OG title">
        <meta property="og:image" content="https://example.com/og.png">
        <meta property="article:published_time" content="2016-10-19T06:00:03Z">
        <meta name="twitter:title" content="Card title">
        <meta property="twitter:creator" content="@krislc">
        <link rel="canonical" href="/articles/1">
        <link rel="alternate" type="application/json+oembed" href="//example.com/oembed?url=x">
    </head><body></body></html>"#;

    #[test]
    fn test_reads_each_dialect() {
        let metadata = MetadataExtractor::new().extract(PAGE, "https://example.com/a?b=c");

        assert_eq!(metadata.basic.title, "Fallback title");
        assert_eq!(metadata.basic.description, "Basic description");
        assert_eq!(metadata.basic.username, "Caio");
        assert_eq!(metadata.basic.author_url, "https://example.com");

        assert_eq!(metadata.opengraph.title, "OG title");
        assert_eq!(metadata.opengraph.picture, "https://example.com/og.png");
        assert!(metadata.opengraph.published_at.is_some());

        assert_eq!(metadata.twitter.title, "Card title");
        assert_eq!(metadata.twitter.username, "@krislc");
        assert_eq!(metadata.twitter.author_url, "https://twitter.com/krislc");
    }

    #[test]
    fn test_twitter_property_beats_name() {
        let html = r#"<html><head>
            <meta name="twitter:title" content="Name title">
            <meta property="twitter:title" content="Property title">
            <meta name="twitter:image" content="https://example.com/name.png">
            <meta property="twitter:image" content="">
        </head></html>"#;
        let metadata = MetadataExtractor::new().extract(html, "https://example.com/");

        assert_eq!(metadata.twitter.title, "Property title");
        assert_eq!(metadata.twitter.picture, "https://example.com/name.png");
    }

    #[test]
    fn test_discovers_links() {
        let metadata = MetadataExtractor::new().extract(PAGE, "https://example.com/a");
        assert_eq!(
            metadata.oembed_url.as_deref(),
            Some("https://example.com/oembed?url=x")
        );
        assert_eq!(
            metadata.canonical_url.as_deref(),
            Some("https://example.com/articles/1")
        );
        assert!(metadata
            .metatags
            .iter()
            .any(|tag| tag.get("property").map(String::as_str) == Some("og:title")));
    }

    #[test]
    fn test_missing_metadata_is_blank() {
        let metadata = MetadataExtractor::new().extract("<html></html>", "https://example.com/");
        assert_eq!(metadata.basic.title, "");
        assert_eq!(metadata.opengraph, Fields::default());
        assert!(metadata.oembed_url.is_none());
        assert!(metadata.canonical_url.is_none());
    }

    #[test]
    fn test_extract_tweet_from_oembed() {
        let html = r#"<blockquote class="twitter-tweet"><p lang="en">I'll be talking in @rubyconfbr this year!</p>&mdash; Caio Almeida (@caiosba) <a href="https://twitter.com/caiosba/status/742779467521773568">June 14, 2016</a></blockquote>"#;
        let fields = MetadataExtractor::new().extract_from_oembed(html);
        assert_eq!(fields.title, "I'll be talking in @rubyconfbr this year!");
        assert_eq!(fields.description, fields.title);
    }

    #[test]
    fn test_frame_restricted_oembed_drops_html() {
        let payload = OEmbedPayload {
            data: OEmbedResponse {
                html: "<iframe></iframe>".into(),
                author_name: "meedan".into(),
                ..Default::default()
            },
            raw: json!({"html": "<iframe></iframe>"}),
            frame_restricted: true,
        };
        let fields = oembed_fields(&payload);
        assert_eq!(fields.html, "");
        assert_eq!(fields.username, "meedan");
    }
}
