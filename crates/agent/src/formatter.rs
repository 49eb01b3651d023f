use handset_core::domain::answer::FinalAnswer;
use handset_core::domain::product::ProductId;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::message::{ChatMessage, ToolCall};
use crate::tools::ToolSpec;

pub const FINAL_ANSWER_TOOL: &str = "FinalAnswer";
pub const FINAL_ANSWER_CALL_ID: &str = "final";

pub const FORMATTER_INSTRUCTION: &str = "Format the final response using the `FinalAnswer` tool. \
`product_ids` and `deal_product_ids` must be taken from the `find_product` tool's output in the \
history. Fill the deal fields only when a `get_deal` result offered a deal; otherwise leave them \
empty.";

pub fn final_answer_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "text": {
                "type": "string",
                "description": "Reply shown to the customer"
            },
            "product_ids": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Identifiers of the products to display"
            },
            "deal_heading": {
                "type": ["string", "null"],
                "description": "One-sentence headline of the special deal, if any"
            },
            "deal_price": {
                "type": ["number", "null"],
                "description": "Deal price, if any"
            },
            "deal_product_ids": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Identifiers of the products the deal applies to"
            }
        },
        "required": ["text", "product_ids"]
    })
}

pub fn final_answer_spec() -> ToolSpec {
    ToolSpec {
        name: FINAL_ANSWER_TOOL.to_string(),
        description: "Structured final reply to the customer.".to_string(),
        parameters: final_answer_schema(),
    }
}

/// Full history behind the formatter instruction.
pub fn formatter_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut prompt = Vec::with_capacity(messages.len() + 1);
    prompt.push(ChatMessage::system(FORMATTER_INSTRUCTION));
    prompt.extend(messages.iter().cloned());
    prompt
}

/// Trims text, drops duplicate ids and clears half-filled deals.
pub fn normalize(answer: FinalAnswer) -> FinalAnswer {
    let FinalAnswer { text, product_ids, deal_heading, deal_price, deal_product_ids } = answer;

    let deal_heading = deal_heading
        .map(|heading| heading.trim().to_string())
        .filter(|heading| !heading.is_empty());
    let deal_price = deal_price.filter(|price| *price > Decimal::ZERO);
    let (deal_heading, deal_price, deal_product_ids) = match (deal_heading, deal_price) {
        (Some(heading), Some(price)) => (Some(heading), Some(price), dedupe(deal_product_ids)),
        _ => (None, None, Vec::new()),
    };

    FinalAnswer {
        text: text.trim().to_string(),
        product_ids: dedupe(product_ids),
        deal_heading,
        deal_price,
        deal_product_ids,
    }
}

/// Assistant message carrying the answer as a `FinalAnswer` call with id `final`.
pub fn terminal_message(answer: &FinalAnswer) -> ChatMessage {
    let arguments = serde_json::to_value(answer).unwrap_or(Value::Null);
    ChatMessage::Assistant {
        content: String::new(),
        tool_calls: vec![ToolCall::new(FINAL_ANSWER_CALL_ID, FINAL_ANSWER_TOOL, arguments)],
    }
}

pub fn answer_from_terminal(message: &ChatMessage) -> Option<FinalAnswer> {
    let call = message.tool_calls().iter().find(|call| call.name == FINAL_ANSWER_TOOL)?;
    serde_json::from_value(Value::Object(call.arguments.clone())).ok()
}

fn dedupe(ids: Vec<ProductId>) -> Vec<ProductId> {
    let mut unique: Vec<ProductId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !id.as_str().trim().is_empty() && !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}
