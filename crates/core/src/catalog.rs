use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::product::{has_required_keys, AttributeBundle};
use crate::fixtures::sample_handsets;

pub const DEFAULT_TOP_K: usize = 7;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Ranked product lookup. Implementations return flat attribute bundles in
/// rank order; completeness is checked by the caller.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<AttributeBundle>, CatalogError>;
}

/// Drops bundles lacking an id, model name or price ceiling.
pub fn retain_complete_bundles(bundles: Vec<AttributeBundle>) -> Vec<AttributeBundle> {
    bundles.into_iter().filter(has_required_keys).collect()
}

const NAME_FIELDS: [&str; 2] = ["Company Name", "Model Name"];
const DETAIL_FIELDS: [&str; 4] = ["Processor", "Text", "Back Camera", "Screen Size"];
const STOP_WORDS: [&str; 16] = [
    "me", "show", "the", "an", "and", "for", "with", "some", "any", "want", "need", "looking",
    "phone", "phones", "mobile", "mobiles",
];

/// Keyword-ranked catalog held in memory.
#[derive(Clone, Debug)]
pub struct InMemoryCatalog {
    bundles: Vec<AttributeBundle>,
    top_k: usize,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new(Vec::new(), DEFAULT_TOP_K)
    }
}

impl InMemoryCatalog {
    pub fn new(bundles: Vec<AttributeBundle>, top_k: usize) -> Self {
        Self { bundles, top_k: top_k.max(1) }
    }

    /// The six sample handsets the assistant ships with.
    pub fn sample(top_k: usize) -> Self {
        Self::new(sample_handsets(), top_k)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn rank(&self, query: &str) -> Vec<AttributeBundle> {
        let query_tokens = tokenize(query)
            .into_iter()
            .filter(|token| token.len() > 1 && !STOP_WORDS.contains(&token.as_str()))
            .collect::<BTreeSet<_>>();
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut scored = self
            .bundles
            .iter()
            .enumerate()
            .filter_map(|(position, bundle)| {
                let score = score_bundle(bundle, &query_tokens);
                (score > 0).then_some((score, position, bundle))
            })
            .collect::<Vec<_>>();
        scored.sort_by(|left, right| right.0.cmp(&left.0).then(left.1.cmp(&right.1)));

        scored.into_iter().take(self.top_k).map(|(_, _, bundle)| bundle.clone()).collect()
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn search(&self, query: &str) -> Result<Vec<AttributeBundle>, CatalogError> {
        Ok(self.rank(query))
    }
}

fn score_bundle(bundle: &AttributeBundle, query_tokens: &BTreeSet<String>) -> u32 {
    let name_tokens = field_tokens(bundle, &NAME_FIELDS);
    let detail_tokens = field_tokens(bundle, &DETAIL_FIELDS);

    query_tokens
        .iter()
        .map(|token| {
            if name_tokens.contains(token) {
                3
            } else if detail_tokens.contains(token) {
                1
            } else {
                0
            }
        })
        .sum()
}

fn field_tokens(bundle: &AttributeBundle, fields: &[&str]) -> BTreeSet<String> {
    fields
        .iter()
        .filter_map(|field| bundle.get(*field).and_then(Value::as_str))
        .flat_map(tokenize)
        .collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_ascii_lowercase()
        .split(|character: char| !character.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{retain_complete_bundles, InMemoryCatalog, ProductCatalog};
    use crate::domain::product::{bundle_id, AttributeBundle};

    fn ids(bundles: &[AttributeBundle]) -> Vec<&str> {
        bundles.iter().filter_map(bundle_id).collect()
    }

    #[tokio::test]
    async fn brand_query_returns_brand_models_in_catalog_order() {
        let catalog = InMemoryCatalog::sample(7);
        let results = catalog.search("show me a Samsung phone").await.expect("search");

        assert_eq!(ids(&results), vec!["mobile_13", "mobile_12"]);
    }

    #[test]
    fn name_matches_outrank_description_matches() {
        let catalog = InMemoryCatalog::sample(7);
        let results = catalog.rank("pixel photography");

        let ranked = ids(&results);
        assert_eq!(&ranked[..2], &["mobile_09", "mobile_08"]);
        assert!(ranked.contains(&"mobile_13"), "description match should still be returned");
    }

    #[test]
    fn top_k_caps_results() {
        let catalog = InMemoryCatalog::sample(1);
        assert_eq!(ids(&catalog.rank("apple iphone")), vec!["mobile_11"]);
    }

    #[test]
    fn stop_words_alone_match_nothing() {
        let catalog = InMemoryCatalog::sample(7);
        assert!(catalog.rank("show me a phone").is_empty());
        assert!(catalog.rank("").is_empty());
    }

    #[test]
    fn incomplete_bundles_are_dropped() {
        let bundles = vec![
            json!({ "ID": "a", "Model Name": "A", "Max Price": 1 }),
            json!({ "ID": "b", "Model Name": "B" }),
            json!({ "Model Name": "C", "Max Price": 3 }),
            json!({ "ID": "d", "Model Name": "D", "Max Price": null }),
        ]
        .into_iter()
        .filter_map(|value| value.as_object().cloned())
        .collect::<Vec<_>>();

        assert_eq!(ids(&retain_complete_bundles(bundles)), vec!["a"]);
    }
}
