use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use handset_core::catalog::{retain_complete_bundles, ProductCatalog};
use handset_core::domain::deal::DealOffer;
use handset_core::domain::product::{bundle_id, AttributeBundle, Product, ProductId};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::message::{ToolCall, ToolResult};

pub const PRODUCT_SEARCH_TOOL: &str = "find_product";
pub const DEAL_TOOL: &str = "get_deal";

pub const NO_DEAL_MESSAGE: &str = "No special deal is available for these products right now.";

/// Signature advertised to the decision oracle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ProductSearch,
    DealProposal,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::ProductSearch, ToolKind::DealProposal];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ProductSearch => PRODUCT_SEARCH_TOOL,
            Self::DealProposal => DEAL_TOOL,
        }
    }

    pub fn spec(&self) -> ToolSpec {
        match self {
            Self::ProductSearch => ToolSpec {
                name: PRODUCT_SEARCH_TOOL.to_string(),
                description: "Searches the mobile phone catalog. Starting a new search resets \
                              the products under discussion."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What the customer is looking for"
                        }
                    },
                    "required": ["query"]
                }),
            },
            Self::DealProposal => ToolSpec {
                name: DEAL_TOOL.to_string(),
                description: "Generates a special deal, cross-sell or upsell offer for products \
                              under discussion. Use when the customer shows buying intent, asks \
                              for a discount or compares products."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "conversation_context": {
                            "type": "string",
                            "description": "Short summary of what the customer wants"
                        },
                        "product_ids": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Identifiers of the products the deal is for"
                        }
                    },
                    "required": ["conversation_context", "product_ids"]
                }),
            },
        }
    }
}

/// Produces a free-form promotional offer for the given products.
#[async_trait]
pub trait DealGenerator: Send + Sync {
    async fn propose_deal(&self, context: &str, product_ids: &[ProductId]) -> Result<String>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool `{0}` is advertised but has no handler")]
    UnknownTool(String),
    #[error("tool `{0}` has a handler but is not advertised")]
    Unadvertised(String),
}

/// What a tool may read from the conversation while it runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolContext {
    pub conversation_context: String,
    pub product_context_ids: Vec<ProductId>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutcome {
    Search { result: ToolResult, products: Vec<Product> },
    Deal { result: ToolResult, offer: Option<DealOffer> },
    Failed { result: ToolResult },
}

impl ToolOutcome {
    pub fn result(&self) -> &ToolResult {
        match self {
            Self::Search { result, .. } | Self::Deal { result, .. } | Self::Failed { result } => {
                result
            }
        }
    }

    pub fn into_parts(self) -> (ToolResult, Vec<Product>) {
        match self {
            Self::Search { result, products } => (result, products),
            Self::Deal { result, .. } | Self::Failed { result } => (result, Vec::new()),
        }
    }

    /// Replacement context, only for searches that ran.
    pub fn context_update(&self) -> Option<Vec<ProductId>> {
        match self {
            Self::Search { products, .. } => {
                Some(products.iter().map(|product| product.id.clone()).collect())
            }
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.result().is_error
    }
}

/// Name-to-handler table shared by every conversation.
pub struct ToolRegistry {
    catalog: Arc<dyn ProductCatalog>,
    deals: Arc<dyn DealGenerator>,
    handlers: BTreeMap<&'static str, ToolKind>,
}

impl ToolRegistry {
    pub fn new(catalog: Arc<dyn ProductCatalog>, deals: Arc<dyn DealGenerator>) -> Self {
        let handlers = ToolKind::ALL.into_iter().map(|kind| (kind.name(), kind)).collect();
        Self { catalog, deals, handlers }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.handlers.values().map(ToolKind::spec).collect()
    }

    pub fn resolve(&self, name: &str) -> Option<ToolKind> {
        self.handlers.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Advertised signatures and handlers must name the same tools.
    pub fn validate(&self, advertised: &[ToolSpec]) -> Result<(), RegistryError> {
        if let Some(spec) = advertised.iter().find(|spec| self.resolve(&spec.name).is_none()) {
            return Err(RegistryError::UnknownTool(spec.name.clone()));
        }
        if let Some(name) =
            self.handlers.keys().find(|name| !advertised.iter().any(|spec| spec.name == **name))
        {
            return Err(RegistryError::Unadvertised((*name).to_string()));
        }
        Ok(())
    }

    /// Runs one call. Never fails: problems become error-bearing results.
    pub async fn execute(&self, call: &ToolCall, context: &ToolContext) -> ToolOutcome {
        match self.resolve(&call.name) {
            Some(ToolKind::ProductSearch) => self.search(call).await,
            Some(ToolKind::DealProposal) => self.deal(call, context).await,
            None => {
                let available = self.handlers.keys().copied().collect::<Vec<_>>().join(", ");
                ToolOutcome::Failed {
                    result: ToolResult::error(
                        call,
                        format!("Unknown tool `{}`. Available tools: {available}.", call.name),
                    ),
                }
            }
        }
    }

    async fn search(&self, call: &ToolCall) -> ToolOutcome {
        let Some(query) = call.str_arg("query").map(str::trim).filter(|query| !query.is_empty())
        else {
            return ToolOutcome::Failed {
                result: ToolResult::error(call, "Missing required argument `query`."),
            };
        };

        let bundles = match self.catalog.search(query).await {
            Ok(bundles) => bundles,
            Err(error) => {
                return ToolOutcome::Failed {
                    result: ToolResult::error(call, format!("Product search failed: {error}")),
                };
            }
        };

        let (bundles, products) = convert_bundles(retain_complete_bundles(bundles));
        match serde_json::to_string(&bundles) {
            Ok(content) => ToolOutcome::Search { result: ToolResult::ok(call, content), products },
            Err(error) => {
                let message = format!("Could not encode search results: {error}");
                ToolOutcome::Failed { result: ToolResult::error(call, message) }
            }
        }
    }

    async fn deal(&self, call: &ToolCall, context: &ToolContext) -> ToolOutcome {
        let conversation_context = call
            .str_arg("conversation_context")
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(context.conversation_context.as_str());

        let mut product_ids = requested_ids(call);
        if product_ids.is_empty() {
            product_ids = context.product_context_ids.clone();
        }
        if product_ids.is_empty() {
            return ToolOutcome::Failed {
                result: ToolResult::error(
                    call,
                    "No products are under discussion yet. Search for products first.",
                ),
            };
        }

        let raw = match self.deals.propose_deal(conversation_context, &product_ids).await {
            Ok(raw) => raw,
            Err(error) => {
                return ToolOutcome::Failed {
                    result: ToolResult::error(call, format!("Deal generation failed: {error}")),
                };
            }
        };

        match DealOffer::parse(&raw) {
            Ok(offer) => {
                let content = DealContent {
                    heading: &offer.heading,
                    deal_price: offer.deal_price,
                    product_ids: &product_ids,
                };
                let result = match serde_json::to_string(&content) {
                    Ok(content) => ToolResult::ok(call, content),
                    Err(error) => {
                        let message = format!("Could not encode deal: {error}");
                        return ToolOutcome::Failed { result: ToolResult::error(call, message) };
                    }
                };
                ToolOutcome::Deal { result, offer: Some(offer) }
            }
            Err(error) => {
                warn!(
                    event_name = "agent.deal_unparsable",
                    call_id = %call.id,
                    error = %error,
                    "deal generator output did not match the deal schema"
                );
                ToolOutcome::Deal { result: ToolResult::error(call, NO_DEAL_MESSAGE), offer: None }
            }
        }
    }
}

#[derive(Serialize)]
struct DealContent<'a> {
    heading: &'a str,
    deal_price: Decimal,
    product_ids: &'a [ProductId],
}

fn requested_ids(call: &ToolCall) -> Vec<ProductId> {
    call.arguments
        .get("product_ids")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .filter(|id| !id.trim().is_empty())
                .map(ProductId::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Keeps bundles that convert into products, in rank order, first occurrence per id.
fn convert_bundles(bundles: Vec<AttributeBundle>) -> (Vec<AttributeBundle>, Vec<Product>) {
    let mut kept = Vec::with_capacity(bundles.len());
    let mut products: Vec<Product> = Vec::with_capacity(bundles.len());

    for bundle in bundles {
        match Product::from_bundle(&bundle) {
            Ok(product) if products.iter().any(|seen| seen.id == product.id) => {}
            Ok(product) => {
                products.push(product);
                kept.push(bundle);
            }
            Err(error) => warn!(
                event_name = "agent.bundle_dropped",
                product_id = bundle_id(&bundle).unwrap_or("<missing>"),
                error = %error,
                "dropping catalog bundle that does not convert into a product"
            ),
        }
    }

    (kept, products)
}
