use claude_sdk::parser::parse_block;
use claude_sdk::{ContentBlock, Message, ResultMessage, ToolResultBlock};
use serde::Serialize;
use serde_json::Value;

/// Longest tool result echoed in human-readable output.
const TOOL_RESULT_PREVIEW: usize = 200;

pub fn print_json_line<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string(value)?;
    println!("{json}");
    Ok(())
}

/// Human-readable rendering of one message; `None` when there is nothing
/// worth printing.
pub fn render(msg: &Message) -> Option<String> {
    let lines: Vec<String> = match msg {
        Message::Assistant(a) => a.content.iter().map(render_block).collect(),
        // Tool results come back to the model as user turns.
        Message::User(u) => u
            .content
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(parse_block)
                    .filter(|b| matches!(b, ContentBlock::ToolResult(_)))
                    .map(|b| render_block(&b))
                    .collect()
            })
            .unwrap_or_default(),
        Message::System(s) => vec![format!("[system: {}]", s.subtype)],
        Message::Result(r) => vec![render_result(r)],
    };

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn render_block(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Text(t) => t.text.clone(),
        ContentBlock::ToolUse(t) => format!("[tool: {}] {}", t.name, t.input),
        ContentBlock::ToolResult(r) => render_tool_result(r),
    }
}

fn render_tool_result(r: &ToolResultBlock) -> String {
    let mut line = format!("[tool result: {}]", r.tool_use_id);
    if let Some(content) = &r.content {
        let text = content_text(content);
        if !text.is_empty() {
            line.push(' ');
            line.push_str(&truncate(&text, TOOL_RESULT_PREVIEW));
        }
    }
    if r.is_error == Some(true) {
        line.push_str(" (error)");
    }
    line
}

/// Plain text of a tool result: strings as-is, text blocks joined, anything
/// else as compact JSON.
fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item.get("text").and_then(Value::as_str) {
                Some(text) => text.to_string(),
                None => item.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    let mut chars = flat.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn render_result(r: &ResultMessage) -> String {
    let mut line = format!(
        "[result: {}] turns={} duration={}ms",
        r.subtype, r.num_turns, r.duration_ms
    );
    if let Some(cost) = r.total_cost_usd {
        line.push_str(&format!(" cost=${cost:.4}"));
    }
    if !r.session_id.is_empty() {
        line.push_str(&format!(" session={}", r.session_id));
    }
    line
}
