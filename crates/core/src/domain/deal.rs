use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Structured reading of the deal generator's free-form reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealOffer {
    pub heading: String,
    #[serde(alias = "price")]
    pub deal_price: Decimal,
}

impl DealOffer {
    /// Parses a `{"heading": .., "deal_price": ..}` object, tolerating code
    /// fences or prose around it.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let payload = json_object_slice(raw)
            .ok_or_else(|| DomainError::InvalidDealOffer("no JSON object in reply".to_string()))?;

        let offer: Self = serde_json::from_str(payload)
            .map_err(|error| DomainError::InvalidDealOffer(error.to_string()))?;

        if offer.heading.trim().is_empty() {
            return Err(DomainError::InvalidDealOffer("heading is empty".to_string()));
        }
        if offer.deal_price <= Decimal::ZERO {
            return Err(DomainError::InvalidDealOffer(format!(
                "deal price must be positive, got {}",
                offer.deal_price
            )));
        }

        Ok(offer)
    }
}

fn json_object_slice(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}
