//! Facebook-specific reads of a rendered page: content blocks and the
//! inline-script JSON fragments the page embeds.

use crate::utils;
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static OWNER_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"ownerName:"([^"]+)""#).unwrap());
static ENTITY_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""entity_id":"([^"]+)""#).unwrap());
static PERMALINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"permalink:"([^"]+)""#).unwrap());
static USERNAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""username":"([^"]+)""#).unwrap());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacebookMarkup {
    /// Text of the post body with tags removed.
    pub content_text: String,
    pub owner_name: String,
    pub entity_id: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Permalink as found in the page, possibly relative.
    pub permalink: String,
    pub username: String,
}

pub fn scan(html: &str) -> FacebookMarkup {
    let document = Html::parse_document(html);

    FacebookMarkup {
        content_text: content_text(&document),
        owner_name: inline_value(&OWNER_NAME, html),
        entity_id: inline_value(&ENTITY_ID, html),
        published_at: published_at(&document),
        permalink: inline_value(&PERMALINK, html),
        username: inline_value(&USERNAME, html),
    }
}

fn content_text(document: &Html) -> String {
    ["div.userContent", "span.hasCaption"]
        .iter()
        .filter_map(|selector| Selector::parse(selector).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<Vec<_>>().join(" "))
                .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|text| !text.is_empty())
        })
        .unwrap_or_default()
}

fn published_at(document: &Html) -> Option<DateTime<Utc>> {
    let utime = Selector::parse("abbr[data-utime]").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("data-utime"))
            .and_then(utils::parse_timestamp)
    });

    utime.or_else(|| {
        let selector = Selector::parse("span.timestampContent").ok()?;
        document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>())
            .and_then(|text| utils::parse_timestamp(&text))
    })
}

/// First capture of `pattern`, with JSON slash escapes undone.
fn inline_value(pattern: &Regex, html: &str) -> String {
    pattern
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().replace("\\/", "/"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div class="userContentWrapper">
          <abbr data-utime="1447854481"><span class="timestampContent">Yesterday</span></abbr>
          <div class="userContent"><p>Teste added 2 new photos.</p> <span>See Translation</span></div>
        </div>
        <script>require("Bootloader").handle({ownerName:"Teste",permalink:"\/teste637621352\/posts\/1028416870556238","entity_id":"749262715138323","username":"teste637621352"});</script>
    </body></html>"#;

    #[test]
    fn test_scans_inline_data() {
        let markup = scan(PAGE);
        assert_eq!(markup.owner_name, "Teste");
        assert_eq!(markup.entity_id, "749262715138323");
        assert_eq!(markup.permalink, "/teste637621352/posts/1028416870556238");
        assert_eq!(markup.username, "teste637621352");
        assert_eq!(markup.content_text, "Teste added 2 new photos. See Translation");
        assert!(markup.published_at.is_some());
    }

    #[test]
    fn test_missing_markup_stays_blank() {
        assert_eq!(scan("<html><body></body></html>"), FacebookMarkup::default());
    }
}
