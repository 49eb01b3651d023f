use std::collections::BTreeMap;

use handset_core::domain::answer::{FinalAnswer, ResolvedAnswer, SpecialDeal};
use handset_core::domain::product::{Product, ProductId};
use tracing::warn;

pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 6;

pub const STEP_LIMIT_MESSAGE: &str = "Sorry, I could not finish looking that up. Could you \
rephrase your question or ask about a specific phone?";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Apology answer carried by a degraded turn.
    pub fn fallback_answer(&self) -> Option<FinalAnswer> {
        match self {
            Self::Allow => None,
            Self::Degrade { user_message, .. } => {
                Some(FinalAnswer::text_only(user_message.as_str()))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_tool_rounds: u32,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS }
    }
}

impl GuardrailPolicy {
    pub fn new(max_tool_rounds: u32) -> Self {
        Self { max_tool_rounds: max_tool_rounds.max(1) }
    }

    /// Checked before each tool round; `completed_rounds` counts rounds already run.
    pub fn evaluate_round(&self, completed_rounds: u32) -> GuardrailDecision {
        if completed_rounds < self.max_tool_rounds {
            return GuardrailDecision::Allow;
        }

        GuardrailDecision::Degrade {
            reason_code: "tool_round_limit_reached",
            user_message: STEP_LIMIT_MESSAGE.to_string(),
            fallback_path: "apology_answer",
        }
    }
}

/// Resolves answer identifiers against the products retrieved during the turn.
///
/// Unknown identifiers are dropped. A special deal survives only with a
/// heading, a price and at least one resolvable product.
pub fn resolve_answer(
    answer: &FinalAnswer,
    retrieved: &BTreeMap<ProductId, Product>,
) -> ResolvedAnswer {
    let products = resolve_ids(&answer.product_ids, retrieved, "product_ids");

    let special_deal = match (&answer.deal_heading, answer.deal_price) {
        (Some(heading), Some(deal_price)) if answer.has_deal() => {
            let involved = resolve_ids(&answer.deal_product_ids, retrieved, "deal_product_ids");
            (!involved.is_empty()).then(|| SpecialDeal {
                heading: heading.clone(),
                deal_price,
                products_involved: involved,
            })
        }
        _ => None,
    };

    ResolvedAnswer { text: answer.text.clone(), products, special_deal }
}

fn resolve_ids(
    ids: &[ProductId],
    retrieved: &BTreeMap<ProductId, Product>,
    field: &'static str,
) -> Vec<Product> {
    ids.iter()
        .filter_map(|id| {
            let product = retrieved.get(id).cloned();
            if product.is_none() {
                warn!(
                    event_name = "agent.unknown_product_id",
                    product_id = %id,
                    field,
                    "dropping identifier that was never retrieved"
                );
            }
            product
        })
        .collect()
}
