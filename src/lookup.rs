use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::TransformError;

/// Creative → (user tag → number of users with that tag seen on the creative)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreativeTagCounts {
    counts: HashMap<String, HashMap<String, i64>>,
}

impl CreativeTagCounts {
    pub fn new(counts: HashMap<String, HashMap<String, i64>>) -> Self {
        Self { counts }
    }

    /// Sum of the creative's per-tag counts over the given tags (absent tags count 0)
    pub fn user_count<'a>(&self, creative_id: &str, tags: impl Iterator<Item = &'a str>) -> Result<i64, TransformError> {
        let per_tag = self
            .counts
            .get(creative_id)
            .ok_or_else(|| TransformError::UnknownCreative(creative_id.to_string()))?;
        tags.map(|tag| per_tag.get(tag).copied().unwrap_or(0))
            .try_fold(0i64, |total, count| total.checked_add(count))
            .ok_or_else(|| TransformError::CountOverflow(creative_id.to_string()))
    }

    pub fn contains(&self, creative_id: &str) -> bool {
        self.counts.contains_key(creative_id)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Creative → ad type it was booked as
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreativeBias {
    ad_types: HashMap<String, String>,
}

impl CreativeBias {
    pub fn new(ad_types: HashMap<String, String>) -> Self {
        Self { ad_types }
    }

    pub fn ad_type(&self, creative_id: &str) -> Option<&str> {
        self.ad_types.get(creative_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ad_types.len()
    }
}

/// Read-only tables consulted by the feature transformer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupTables {
    pub creative_tags: CreativeTagCounts,
    pub creative_bias: CreativeBias,
}
