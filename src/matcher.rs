//! Scoring a live item against a subscription filter.

use crate::catalog::LiveItem;
use crate::entity::MatchFilter;

/// Whether `item` satisfies every condition of `filter`.
///
/// Checked in order: minimum viewers (default 1), required tags
/// (case-insensitive, all must be present), required language
/// (case-insensitive).
pub fn matches(item: &LiveItem, filter: &MatchFilter) -> bool {
    let min_viewers = filter.minimum_viewers.unwrap_or(1);
    if item.viewer_count < min_viewers {
        return false;
    }

    if !filter.required_tags.is_empty() {
        let item_tags: Vec<String> = item.tags.iter().map(|t| t.to_lowercase()).collect();
        let all_present = filter
            .required_tags
            .iter()
            .all(|required| item_tags.contains(&required.to_lowercase()));
        if !all_present {
            return false;
        }
    }

    if let Some(language) = &filter.required_language
        && !item.language.eq_ignore_ascii_case(language)
    {
        return false;
    }

    true
}
