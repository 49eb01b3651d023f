use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use handset_core::domain::product::ProductId;

use crate::llm::LlmClient;
use crate::tools::DealGenerator;

/// Deal generator backed by a plain completion call.
pub struct LlmDealGenerator {
    llm: Arc<dyn LlmClient>,
}

impl LlmDealGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

pub fn deal_prompt(context: &str, product_ids: &[ProductId]) -> String {
    let ids = product_ids.iter().map(ProductId::as_str).collect::<Vec<_>>().join(", ");
    format!(
        "Based on the conversation context: '{context}', create a compelling, short, one-sentence \
         deal heading and a deal price for one of the products from this list: [{ids}].\n\
         Format the output as a simple JSON string with keys 'heading' and 'deal_price'.\n\
         Example: {{\"heading\": \"Limited Time: 15% off the Pixel 8 Pro!\", \
         \"deal_price\": 59415}}"
    )
}

#[async_trait]
impl DealGenerator for LlmDealGenerator {
    async fn propose_deal(&self, context: &str, product_ids: &[ProductId]) -> Result<String> {
        self.llm
            .complete(&deal_prompt(context, product_ids))
            .await
            .context("deal completion failed")
    }
}
