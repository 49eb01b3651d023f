use std::collections::BTreeMap;

use handset_core::domain::product::{Product, ProductId};
use handset_core::errors::DomainError;

use crate::message::ChatMessage;

/// Record threaded through every step of one turn.
///
/// `messages` only grows, `retrieved_products` only gains keys (same id keeps
/// the newest value) and `product_context_ids` is replaced wholesale.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
    pub retrieved_products: BTreeMap<ProductId, Product>,
    pub product_context_ids: Vec<ProductId>,
}

/// Partial update produced by one step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Vec<ChatMessage>,
    pub retrieved_products: Vec<Product>,
    /// `None` keeps the current context.
    pub product_context_ids: Option<Vec<ProductId>>,
}

impl StateUpdate {
    pub fn message(message: ChatMessage) -> Self {
        Self { messages: vec![message], ..Self::default() }
    }
}

impl ConversationState {
    pub fn seeded(messages: Vec<ChatMessage>) -> Self {
        Self { messages, ..Self::default() }
    }

    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        for product in update.retrieved_products {
            self.retrieved_products.insert(product.id.clone(), product);
        }
        if let Some(context) = update.product_context_ids {
            self.product_context_ids = context;
        }
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn product(&self, id: &ProductId) -> Option<&Product> {
        self.retrieved_products.get(id)
    }

    /// Every context id must name a retrieved product.
    pub fn check_context(&self) -> Result<(), DomainError> {
        match self.product_context_ids.iter().find(|id| !self.retrieved_products.contains_key(id)) {
            Some(missing) => Err(DomainError::InvariantViolation(format!(
                "context id `{missing}` is not among retrieved products"
            ))),
            None => Ok(()),
        }
    }

    /// Text of the latest user message, used as deal context.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|message| match message {
            ChatMessage::User { content } => Some(content.as_str()),
            _ => None,
        })
    }
}
