use std::collections::BTreeMap;

use curator_core::{BatchRequest, FailureKind, ItemId, Verdict};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireItem {
    pub id: ItemId,
    pub title: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Body posted to the classification service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRequest {
    pub items: Vec<WireItem>,
    pub active_filters: Vec<String>,
}

impl ClassifyRequest {
    pub fn from_batch(batch: &BatchRequest) -> Self {
        Self {
            items: batch
                .items
                .iter()
                .map(|item| WireItem {
                    id: item.id.clone(),
                    title: item.title.clone(),
                    metadata: item.metadata.clone(),
                })
                .collect(),
            active_filters: batch.filters.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireDecision {
    pub id: ItemId,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub decisions: Vec<WireDecision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ClassifyError {
    pub kind: FailureKind,
    pub message: String,
}

impl ClassifyError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
