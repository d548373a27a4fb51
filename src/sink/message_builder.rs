use serde_json::Value;
use serde_json::json;

use crate::catalog::LiveItem;

/// Twitch brand purple.
pub const LIVE_COLOUR: u32 = 0x9146FF;

const THUMBNAIL_WIDTH: u32 = 440;
const THUMBNAIL_HEIGHT: u32 = 248;

/// Builds the webhook payload announcing a live item.
pub struct LiveMessageBuilder<'a> {
    item: &'a LiveItem,
}

impl<'a> LiveMessageBuilder<'a> {
    pub fn new(item: &'a LiveItem) -> Self {
        Self { item }
    }

    pub fn build(&self) -> Value {
        let item = self.item;

        let mut fields = vec![
            json!({ "name": "Viewers", "value": item.viewer_count.to_string(), "inline": true }),
            json!({ "name": "Language", "value": Self::or_unknown(&item.language), "inline": true }),
        ];
        if !item.tags.is_empty() {
            fields.push(json!({ "name": "Tags", "value": item.tags.join(", "), "inline": false }));
        }

        let title = if item.category_name.is_empty() {
            format!("{} is live", item.broadcaster_name)
        } else {
            format!("{} is live: {}", item.broadcaster_name, item.category_name)
        };

        let embed = json!({
            "title": title,
            "description": item.title,
            "url": item.url,
            "color": LIVE_COLOUR,
            "timestamp": item.started_at.to_rfc3339(),
            "image": { "url": item.thumbnail(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT) },
            "fields": fields,
        });

        json!({ "embeds": [embed] })
    }

    fn or_unknown(value: &str) -> String {
        if value.is_empty() {
            "unknown".to_string()
        } else {
            value.to_string()
        }
    }
}
