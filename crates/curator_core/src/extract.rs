use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::identity::item_id_from_link;
use crate::{Extracted, ExtractionError, HostTree, ItemExtractor, ItemRecord};

/// Structural patterns of one host surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceProfile {
    pub item_tag: String,
    pub id_attribute: String,
    pub title_attribute: String,
    pub metadata_attributes: Vec<String>,
    /// Items carrying this attribute are treated as noise (e.g. short-form clips).
    pub exclude_marker: Option<String>,
    pub noise_tags: Vec<String>,
}

impl Default for SurfaceProfile {
    fn default() -> Self {
        Self {
            item_tag: "item".to_string(),
            id_attribute: "href".to_string(),
            title_attribute: "title".to_string(),
            metadata_attributes: vec!["channel".to_string()],
            exclude_marker: Some("data-short".to_string()),
            noise_tags: vec!["shelf".to_string(), "chip-bar".to_string()],
        }
    }
}

/// Attribute-driven extractor usable with any [`HostTree`].
#[derive(Debug, Clone, Default)]
pub struct SurfaceExtractor {
    profile: SurfaceProfile,
}

impl SurfaceExtractor {
    pub fn new(profile: SurfaceProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &SurfaceProfile {
        &self.profile
    }
}

impl<T: HostTree> ItemExtractor<T> for SurfaceExtractor {
    fn extract(&self, tree: &T) -> Vec<Extracted<T::Handle>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for handle in tree.children() {
            let Some(tag) = tree.tag(&handle) else {
                out.push(Extracted::Skipped {
                    handle,
                    error: ExtractionError::Unreadable("node has no tag".to_string()),
                });
                continue;
            };
            if self.profile.noise_tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
                out.push(Extracted::Noise(handle));
                continue;
            }
            if !tag.eq_ignore_ascii_case(&self.profile.item_tag) {
                continue;
            }
            if let Some(marker) = self.profile.exclude_marker.as_deref() {
                if tree.attribute(&handle, marker).is_some() {
                    out.push(Extracted::Noise(handle));
                    continue;
                }
            }

            let id = tree
                .attribute(&handle, &self.profile.id_attribute)
                .and_then(|link| item_id_from_link(&link));
            let Some(id) = id else {
                out.push(Extracted::Skipped {
                    handle,
                    error: ExtractionError::MissingId,
                });
                continue;
            };
            if !seen.insert(id.clone()) {
                out.push(Extracted::Skipped {
                    handle,
                    error: ExtractionError::DuplicateId(id.to_string()),
                });
                continue;
            }

            let title = tree
                .attribute(&handle, &self.profile.title_attribute)
                .map(|t| t.trim().to_string())
                .unwrap_or_default();
            let mut record = ItemRecord::new(id, title, handle.clone());
            for name in &self.profile.metadata_attributes {
                if let Some(value) = tree.attribute(&handle, name) {
                    record.metadata.insert(name.clone(), value);
                }
            }
            out.push(Extracted::Item(record));
        }
        out
    }
}
