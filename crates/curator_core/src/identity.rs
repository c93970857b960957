use url::Url;

use crate::ItemId;

const VIDEO_PARAM: &str = "v";
const BASE: &str = "https://host.invalid/";

/// Derives a stable item id from a link attribute.
///
/// A `v` query parameter wins when present (`/watch?v=abc` → `abc`). Otherwise
/// the canonical URL is the id: lower-case host, no fragment, no `utm_*`
/// parameters, no trailing slash. Relative links resolve against a fixed base
/// so the same path always yields the same id.
pub fn item_id_from_link(raw: &str) -> Option<ItemId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let base = Url::parse(BASE).ok()?;
    let mut url = base.join(trimmed).ok()?;

    if let Some((_, value)) = url.query_pairs().find(|(key, _)| key == VIDEO_PARAM) {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        return Some(ItemId::new(value));
    }

    url.set_fragment(None);
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut canonical = url.to_string();
    if canonical.ends_with('/') && url.query().is_none() {
        canonical.pop();
    }
    Some(ItemId::new(canonical))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_param_is_the_id() {
        assert_eq!(
            item_id_from_link("/watch?v=abc123&t=42s"),
            Some(ItemId::new("abc123"))
        );
        assert_eq!(
            item_id_from_link("https://www.example.com/watch?list=x&v=abc123"),
            Some(ItemId::new("abc123"))
        );
    }

    #[test]
    fn canonical_url_ignores_case_fragment_and_tracking() {
        let a = item_id_from_link("HTTPS://Example.COM/post/7/#comments");
        let b = item_id_from_link("https://example.com/post/7?utm_source=feed");
        assert_eq!(a, b);
        assert_eq!(a, Some(ItemId::new("https://example.com/post/7")));
    }

    #[test]
    fn meaningful_query_survives() {
        let id = item_id_from_link("https://example.com/p?id=9&utm_medium=x").unwrap();
        assert_eq!(id.as_str(), "https://example.com/p?id=9");
    }

    #[test]
    fn empty_links_have_no_id() {
        assert_eq!(item_id_from_link("   "), None);
        assert_eq!(item_id_from_link("/watch?v="), None);
    }
}
