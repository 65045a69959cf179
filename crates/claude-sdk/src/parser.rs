//! Mapping from decoded stream-json documents to typed [`Message`]s.
//!
//! Never fails: unrecognised message types, unknown content blocks and
//! documents with wrongly typed fields are dropped (and logged at debug).

use serde_json::Value;
use tracing::debug;

use crate::types::{
    AssistantMessage, ContentBlock, Message, ResultMessage, SystemMessage, UserMessage,
};

/// Parse one decoded document. Returns `None` for anything outside the
/// closed set of message types.
pub fn parse_message(value: &Value) -> Option<Message> {
    let kind = value.get("type").and_then(Value::as_str);
    match kind {
        Some("user") => Some(Message::User(parse_user(value))),
        Some("assistant") => parse_assistant(value).map(Message::Assistant),
        Some("system") => Some(Message::System(parse_system(value))),
        Some("result") => parse_result(value).map(Message::Result),
        Some(other) => {
            debug!(message_type = other, "skipping unrecognised message type");
            None
        }
        None => {
            debug!("skipping document without a type field");
            None
        }
    }
}

fn nested_content(value: &Value) -> Option<&Value> {
    value.get("message").and_then(|m| m.get("content"))
}

fn parse_user(value: &Value) -> UserMessage {
    UserMessage {
        content: nested_content(value).cloned().unwrap_or(Value::Null),
    }
}

fn parse_assistant(value: &Value) -> Option<AssistantMessage> {
    let content = match nested_content(value) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(blocks)) => blocks.iter().filter_map(parse_block).collect(),
        Some(_) => {
            debug!("dropping assistant message whose content is not a list");
            return None;
        }
    };
    Some(AssistantMessage { content })
}

/// One content block; `None` for unknown or malformed blocks.
pub fn parse_block(block: &Value) -> Option<ContentBlock> {
    match serde_json::from_value::<ContentBlock>(block.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            let block_type = block.get("type").and_then(Value::as_str).unwrap_or("<none>");
            debug!(block_type, error = %e, "dropping content block");
            None
        }
    }
}

fn parse_system(value: &Value) -> SystemMessage {
    SystemMessage {
        subtype: value
            .get("subtype")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        data: value.clone(),
    }
}

fn parse_result(value: &Value) -> Option<ResultMessage> {
    match serde_json::from_value::<ResultMessage>(value.clone()) {
        Ok(result) => Some(result),
        Err(e) => {
            debug!(error = %e, "dropping malformed result message");
            None
        }
    }
}
