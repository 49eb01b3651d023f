use handset_core::domain::product::{Product, ProductId};
use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, HistoryTurn};
use crate::state::{ConversationState, StateUpdate};
use crate::tools::{DEAL_TOOL, PRODUCT_SEARCH_TOOL};

/// One incoming chat turn: prior history plus the new utterance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurnRequest {
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    pub user_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Products the caller kept in context from its previous turn, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub carried_products: Vec<Product>,
}

impl ChatTurnRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self { user_message: user_message.into(), ..Self::default() }
    }

    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn carrying(mut self, products: Vec<Product>) -> Self {
        self.carried_products = products;
        self
    }

    /// Fresh state holding the replayed history followed by the new message.
    /// Carried products seed both the retrieved map and the product context.
    pub fn into_state(self) -> ConversationState {
        let mut messages: Vec<ChatMessage> =
            self.history.into_iter().map(HistoryTurn::into_message).collect();
        messages.push(ChatMessage::user(self.user_message));

        let mut state = ConversationState::seeded(messages);
        if !self.carried_products.is_empty() {
            let context_ids =
                self.carried_products.iter().map(|product| product.id.clone()).collect();
            state.apply(StateUpdate {
                retrieved_products: self.carried_products,
                product_context_ids: Some(context_ids),
                ..StateUpdate::default()
            });
        }
        state
    }
}

/// Instruction placed ahead of the history on every decision call.
pub fn decision_instruction(product_context_ids: &[ProductId]) -> String {
    let context = if product_context_ids.is_empty() {
        "None".to_string()
    } else {
        product_context_ids.iter().map(ProductId::as_str).collect::<Vec<_>>().join(", ")
    };

    format!(
        "You are an expert mobile phone salesperson. Follow these rules strictly:\n\
         - For simple greetings or questions, respond directly.\n\
         - Current product context: the customer is discussing product IDs: {context}.\n\
         - Use `{PRODUCT_SEARCH_TOOL}` for new product searches. This resets the context.\n\
         - Use `{DEAL_TOOL}` for discounts on products in the current context. Pass the context \
         IDs.\n\
         - You only sell mobile phones."
    )
}

pub fn decision_messages(state: &ConversationState) -> Vec<ChatMessage> {
    let mut prompt = Vec::with_capacity(state.messages.len() + 1);
    prompt.push(ChatMessage::system(decision_instruction(&state.product_context_ids)));
    prompt.extend(state.messages.iter().cloned());
    prompt
}
