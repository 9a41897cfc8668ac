//! Facebook posts, photos, videos, events and profiles.
//!
//! Items go Graph API first; when that yields nothing (no token, expired
//! token, unsupported node) the rendered page is scraped instead. Rate
//! limits are the only failure that reaches the caller.

mod graph;
pub mod identity;
mod markup;

use super::{ExtractionContext, MediaExtractor};
use crate::canonicalizer::canonicalize;
use crate::classifier::PatternRule;
use crate::record::{is_blank, EvidenceSource, Identity, MediaType, Provider, Subtype};
use crate::utils;
use crate::MediaError;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use graph::media_count_from_text;
use identity::picture_url;

const HOST: &str = r"^https?://([^/]+\.)?facebook\.com(:[0-9]+)?/";
const NOT_IDENTIFIED: &str = "Not Identified";

fn rule(
    name: &'static str,
    media_type: MediaType,
    path: &str,
    sample: &'static str,
) -> PatternRule {
    PatternRule::new(name, Provider::Facebook, media_type, &format!("{HOST}{path}"), sample)
}

#[derive(Default)]
pub struct FacebookExtractor;

impl FacebookExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaExtractor for FacebookExtractor {
    fn provider(&self) -> Provider {
        Provider::Facebook
    }

    fn rules(&self) -> Vec<PatternRule> {
        vec![
            rule(
                "facebook_event",
                MediaType::Item,
                r"events/(?P<id>[0-9]+)/?(\?.*)?$",
                "https://www.facebook.com/events/1090503577698748/",
            )
            .with_subtype(Subtype::Event),
            rule(
                "facebook_event_permalink",
                MediaType::Item,
                r"events/(?P<event>[0-9]+)/permalink/(?P<id>[0-9]+)",
                "https://www.facebook.com/events/364677040588691/permalink/379973812392347/",
            ),
            rule(
                "facebook_post",
                MediaType::Item,
                r"(?P<profile>[^/?]+)/posts/(?P<id>[0-9]+)",
                "https://www.facebook.com/teste637621352/posts/1028416870556238",
            ),
            rule(
                "facebook_album_photo",
                MediaType::Item,
                r"(?P<profile>[^/?]+)/photos/a\.[0-9]+\.[0-9]+\.(?P<owner>[0-9]+)/(?P<id>[0-9]+)",
                "https://www.facebook.com/quoted.pictures/photos/a.128828073875334.28784.128791873878954/1096134023811396/",
            ),
            rule(
                "facebook_photo_set",
                MediaType::Item,
                r"(?P<profile>[^/?]+)/photos/(pcb|pb)\.[^/]+/(?P<id>[0-9]+)",
                "https://www.facebook.com/Bimbo.Memories/photos/pb.235404669918505.-2207520000.1476164972./1393223624136598/",
            ),
            rule(
                "facebook_photo_php",
                MediaType::Item,
                r"photo\.php\?(.*&)?fbid=(?P<id>[0-9]+)",
                "https://www.facebook.com/photo.php?fbid=1195161923843707&set=a.155912291102014.38637.100000497329098&type=3",
            ),
            rule(
                "facebook_video_set",
                MediaType::Item,
                r"(?P<profile>[^/?]+)/videos/vb\.(?P<owner>[0-9]+)/(?P<id>[0-9]+)",
                "https://www.facebook.com/scmp/videos/vb.355665009819/10154584426664820/",
            ),
            rule(
                "facebook_video",
                MediaType::Item,
                r"(?P<profile>[^/?]+)/videos/(?P<id>[0-9]+)",
                "https://www.facebook.com/democrats/videos/10154268929856943",
            ),
            rule(
                "facebook_permalink",
                MediaType::Item,
                r"(permalink|story)\.php\?(.*&)?story_fbid=(?P<id>[0-9]+)",
                "https://www.facebook.com/permalink.php?story_fbid=1649526595359937&id=100009078379548",
            ),
            rule(
                "facebook_album_php",
                MediaType::Item,
                r"album\.php\?(.*&)?fbid=(?P<id>[0-9]+)",
                "https://www.facebook.com/album.php?fbid=10154534110871407&id=54212446406&aid=1073742048",
            ),
            rule(
                "facebook_media_set",
                MediaType::Item,
                r"media/set/?\?(.*&)?set=(?P<set>[^&]+)",
                "https://www.facebook.com/media/set/?set=a.10154534110871407.1073742048.54212446406&type=3",
            ),
            rule(
                "facebook_album_tab",
                MediaType::Item,
                r"pg/(?P<profile>[^/?]+)/photos/?",
                "https://www.facebook.com/pg/Mariano-Rajoy-Brey-54212446406/photos/?tab=album&album_id=10154534110871407",
            ),
            rule(
                "facebook_livemap",
                MediaType::Item,
                r"livemap(/.*)?$",
                "https://www.facebook.com/livemap/",
            ),
            rule(
                "facebook_profile_php",
                MediaType::Profile,
                r"profile\.php\?(.*&)?id=(?P<id>[0-9]+)",
                "https://www.facebook.com/profile.php?id=100008161175765",
            )
            .with_subtype(Subtype::User),
            rule(
                "facebook_page",
                MediaType::Profile,
                r"pages/(?P<profile>[^/?]+)/(?P<id>[0-9]+)/?(\?.*)?$",
                "https://www.facebook.com/pages/Meedan/105510962816034",
            )
            .with_subtype(Subtype::Page),
            rule(
                "facebook_script_item",
                MediaType::Item,
                r"(?P<script>[^/?]+\.php)(\?.*)?$",
                "https://www.facebook.com/photo.php?foo=bar",
            ),
            rule(
                "facebook_profile",
                MediaType::Profile,
                r"(?P<profile>[^/?]+)/?(\?.*)?$",
                "https://www.facebook.com/ironmaiden",
            )
            .with_subtype(Subtype::User),
            rule(
                "facebook_item",
                MediaType::Item,
                r"(?P<profile>[^/?]+)/.+",
                "https://www.facebook.com/Mariano-Rajoy-Brey-54212446406/photos",
            ),
        ]
    }

    #[instrument(level = "debug", skip(self, ctx), fields(url = %ctx.record.canonical_url))]
    async fn extract(&self, ctx: &mut ExtractionContext<'_>) -> Result<(), MediaError> {
        match ctx.record.media_type {
            MediaType::Profile => self.extract_profile(ctx).await,
            _ => self.extract_item(ctx).await,
        }
    }
}

impl FacebookExtractor {
    async fn extract_item(&self, ctx: &mut ExtractionContext<'_>) -> Result<(), MediaError> {
        let resolved = identity::resolve(&ctx.record.canonical_url, &ctx.original_url);
        ctx.record.refine_canonical_url(&resolved.url);
        ctx.record.identity = resolved.identity.clone();

        if resolved.is_event {
            ctx.record.subtype = Some(Subtype::Event);
            ctx.record.fields.author_picture = picture_url(&resolved.identity.object_id);
        } else if !resolved.identity.user_uuid.is_empty() {
            ctx.record.fields.author_picture = picture_url(&resolved.identity.user_uuid);
        }

        let fields = if resolved.is_event {
            graph::EVENT_FIELDS
        } else {
            graph::ITEM_FIELDS
        };
        let node = ctx.record.identity.uuid.clone();
        let object = self.fetch_graph_node(ctx, &node, fields).await?;

        let slug = match object {
            Some(object) => {
                self.apply_item_object(ctx, &object, resolved.is_event);
                String::new()
            }
            None => self.apply_item_markup(ctx, resolved.is_event).await,
        };

        self.store_oembed(ctx).await;
        self.finalize_item(ctx, &resolved.url, &slug);
        Ok(())
    }

    /// Rate limits propagate; any other failure is noted and read as "no
    /// data" so the markup fallback runs.
    async fn fetch_graph_node(
        &self,
        ctx: &mut ExtractionContext<'_>,
        node: &str,
        fields: &str,
    ) -> Result<Option<Value>, MediaError> {
        match graph::fetch_node(ctx.fetcher, ctx.config, node, fields).await {
            Ok(object) => Ok(object),
            Err(e) if e.is_rate_limited() => {
                e.log();
                Err(e)
            }
            Err(e) => {
                ctx.note_fallback(&e);
                Ok(None)
            }
        }
    }

    fn apply_item_object(&self, ctx: &mut ExtractionContext<'_>, object: &Value, is_event: bool) {
        ctx.record.raw.add(EvidenceSource::Api, object.clone());

        let text = ["message", "story", "description"]
            .into_iter()
            .map(|key| graph::str_field(object, &[key]))
            .find(|value| !is_blank(value))
            .unwrap_or_default()
            .to_string();

        let fields = &mut ctx.record.fields;
        fields.text = text;
        fields.published_at = utils::parse_timestamp(graph::str_field(object, &["created_time"]))
            .or_else(|| utils::parse_timestamp(graph::str_field(object, &["updated_time"])));

        let (author_name, user_id) = if is_event {
            (
                graph::str_field(object, &["name"]),
                graph::str_field(object, &["owner", "id"]),
            )
        } else {
            (
                graph::str_field(object, &["from", "name"]),
                graph::str_field(object, &["from", "id"]),
            )
        };
        fields.author_name = author_name.to_string();

        let (photos, media_count) = graph::media_from_object(object);
        fields.photos = photos;
        fields.media_count = media_count;
        let link = graph::str_field(object, &["link"]);
        if !is_blank(link) {
            fields.link = link.to_string();
        }

        self.attach_user(ctx, user_id, is_event);

        if let Some(canonical) = graph::canonical_from_object(object) {
            match canonicalize(&canonical) {
                Ok(canonical) => ctx.record.refine_canonical_url(&canonical),
                Err(e) => debug!(error = %e, "Ignoring unusable permalink from Graph API"),
            }
        }
    }

    /// Markup fallback. Returns the username slug found in the page.
    async fn apply_item_markup(&self, ctx: &mut ExtractionContext<'_>, is_event: bool) -> String {
        let Some((page, metadata)) = ctx.fetch_page_metadata().await else {
            return String::new();
        };
        let markup = markup::scan(&page.body);

        let og = metadata.opengraph;
        let fields = &mut ctx.record.fields;
        fields.author_name = og.title;
        fields.text = og.description;
        if !is_blank(&og.picture) {
            fields.photos = vec![og.picture];
        }

        if is_blank(&fields.text) {
            fields.text = if is_blank(&markup.content_text) {
                metadata.basic.description
            } else {
                markup.content_text
            };
        }
        fields.text = fields.text.replace("See Translation", " ");

        if is_blank(&fields.author_name) {
            fields.author_name = markup.owner_name;
        }
        if markup.published_at.is_some() {
            fields.published_at = markup.published_at;
        }
        fields.media_count = media_count_from_text(&fields.text);

        if ctx.record.identity.user_uuid.is_empty() {
            self.attach_user(ctx, &markup.entity_id, is_event);
        }

        if !is_blank(&markup.permalink) {
            let permalink = utils::absolute_url("https://www.facebook.com/", Some(&markup.permalink));
            if let Ok(canonical) = canonicalize(&permalink) {
                ctx.record.refine_canonical_url(&canonical);
            }
        }

        markup.username
    }

    /// Events keep `uuid = object_id`; everything else re-keys on the owner.
    fn attach_user(&self, ctx: &mut ExtractionContext<'_>, user_id: &str, is_event: bool) {
        if is_blank(user_id) {
            return;
        }
        let identity = &mut ctx.record.identity;
        if is_event {
            identity.user_uuid = user_id.to_string();
            return;
        }
        if identity.user_uuid.is_empty() {
            *identity = Identity::new(identity.object_id.clone(), user_id);
            ctx.record.fields.author_picture = picture_url(user_id);
        }
    }

    async fn store_oembed(&self, ctx: &mut ExtractionContext<'_>) {
        let endpoint = Url::parse_with_params(
            &ctx.config.endpoints.facebook_oembed,
            &[("url", ctx.record.canonical_url.as_str())],
        );
        match endpoint {
            Ok(endpoint) => {
                ctx.fetch_oembed("facebook", endpoint.as_str()).await;
            }
            Err(e) => debug!(error = %e, "Invalid Facebook oEmbed endpoint"),
        }
    }

    fn finalize_item(&self, ctx: &mut ExtractionContext<'_>, resolved_url: &str, slug: &str) {
        let record = &mut ctx.record;
        let fields = &mut record.fields;

        fields.text = fields.text.trim().to_string();
        if resolved_url.contains("photo.php") || record.canonical_url.contains("photo.php") {
            fields.media_count = Some(1);
        }
        fields.media_count.get_or_insert(0);

        if is_blank(&fields.author_name) {
            fields.author_name = NOT_IDENTIFIED.to_string();
        }
        fields.username = if is_blank(slug) {
            fields.author_name.clone()
        } else {
            slug.to_string()
        };
        fields.title = format!("{} on Facebook", fields.author_name);
        fields.description = fields.text.clone();
        fields.picture = fields.photos.first().cloned().unwrap_or_default();
        if !record.identity.user_uuid.is_empty() {
            fields.author_url = format!("http://facebook.com/{}", record.identity.user_uuid);
        }
        fields.html = embed_html(&record.canonical_url);
    }

    async fn extract_profile(&self, ctx: &mut ExtractionContext<'_>) -> Result<(), MediaError> {
        let url = identity::normalize_mobile_host(&ctx.record.canonical_url);
        ctx.record.refine_canonical_url(&url);

        let slug = ctx
            .classification
            .capture("profile")
            .unwrap_or_default()
            .to_string();
        let user_id = identity::user_id_from_url(&url);
        ctx.record.identity = Identity::new("", user_id.as_str());

        let node = if user_id.is_empty() { slug.clone() } else { user_id };
        let object = self.fetch_graph_node(ctx, &node, graph::PROFILE_FIELDS).await?;

        match object {
            Some(object) => {
                ctx.record.raw.add(EvidenceSource::Api, object.clone());
                let fields = &mut ctx.record.fields;
                fields.title = graph::str_field(&object, &["name"]).to_string();
                fields.author_name = fields.title.clone();
                fields.username = graph::str_field(&object, &["username"]).to_string();
                fields.description = [graph::str_field(&object, &["about"]), graph::str_field(&object, &["description"])]
                    .into_iter()
                    .find(|value| !is_blank(value))
                    .unwrap_or_default()
                    .to_string();
                if !is_blank(graph::str_field(&object, &["category"])) {
                    ctx.record.subtype = Some(Subtype::Page);
                }
                let id = graph::str_field(&object, &["id"]);
                if !is_blank(id) {
                    ctx.record.identity = Identity::new("", id);
                }
            }
            None => {
                if let Some((page, metadata)) = ctx.fetch_page_metadata().await {
                    let markup = markup::scan(&page.body);
                    let fields = &mut ctx.record.fields;
                    fields.merge_from(metadata.basic);
                    fields.merge_from(metadata.opengraph);
                    fields.author_name = fields.title.clone();
                    if ctx.record.identity.user_uuid.is_empty() && !is_blank(&markup.entity_id) {
                        ctx.record.identity = Identity::new("", markup.entity_id.as_str());
                    }
                    if is_blank(&ctx.record.fields.username) {
                        ctx.record.fields.username = markup.username;
                    }
                }
            }
        }

        let record = &mut ctx.record;
        let fields = &mut record.fields;
        if is_blank(&fields.username) && !is_blank(&slug) {
            fields.username = slug;
        }
        if is_blank(&fields.title) {
            fields.title = if is_blank(&fields.username) {
                record.canonical_url.clone()
            } else {
                fields.username.clone()
            };
        }
        if !record.identity.user_uuid.is_empty() {
            let picture = picture_url(&record.identity.user_uuid);
            if is_blank(&fields.picture) {
                fields.picture = picture.clone();
            }
            fields.author_picture = picture;
        } else {
            fields.author_picture = fields.picture.clone();
        }
        fields.author_url = record.canonical_url.clone();
        Ok(())
    }
}

fn embed_html(url: &str) -> String {
    format!(
        "<script>window.fbAsyncInit = function() {{ FB.init({{ xfbml: true, version: 'v2.6' }}); FB.Canvas.setAutoGrow(); }}; \
         (function(d, s, id) {{ var js, fjs = d.getElementsByTagName(s)[0]; if (d.getElementById(id)) return; \
         js = d.createElement(s); js.id = id; js.src = \"//connect.facebook.net/en_US/sdk.js\"; \
         fjs.parentNode.insertBefore(js, fjs); }}(document, 'script', 'facebook-jssdk'));</script>\
         <div class=\"fb-post\" data-href=\"{url}\"></div>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_points_at_post() {
        let html = embed_html("https://www.facebook.com/teste637621352/posts/1028416870556238");
        assert!(html.contains("data-href=\"https://www.facebook.com/teste637621352/posts/1028416870556238\""));
        assert!(html.contains("facebook-jssdk"));
    }
}
