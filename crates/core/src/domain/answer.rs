use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::product::{Product, ProductId};

/// Schema-constrained output of one conversation turn.
///
/// Identifiers are whatever the formatter produced; they are only trusted
/// after resolution against the products retrieved during the turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub text: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub product_ids: Vec<ProductId>,
    #[serde(default)]
    pub deal_heading: Option<String>,
    #[serde(default)]
    pub deal_price: Option<Decimal>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub deal_product_ids: Vec<ProductId>,
}

impl FinalAnswer {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            product_ids: Vec::new(),
            deal_heading: None,
            deal_price: None,
            deal_product_ids: Vec::new(),
        }
    }

    pub fn has_deal(&self) -> bool {
        self.deal_heading.as_deref().is_some_and(|heading| !heading.trim().is_empty())
            && self.deal_price.is_some()
    }

    /// Every identifier the answer references, product list first.
    pub fn referenced_ids(&self) -> impl Iterator<Item = &ProductId> {
        self.product_ids.iter().chain(self.deal_product_ids.iter())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialDeal {
    pub heading: String,
    pub deal_price: Decimal,
    pub products_involved: Vec<Product>,
}

/// Final answer with identifiers resolved to full products; what callers display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAnswer {
    pub text: String,
    pub products: Vec<Product>,
    pub special_deal: Option<SpecialDeal>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
