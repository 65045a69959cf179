use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::decoder::MAX_BUFFER_SIZE;

// ─── Outer Message enum ───────────────────────────────────────────────────

/// A typed message decoded from the CLI's stream-json output.
///
/// Closed set: anything the parser does not recognise never becomes a
/// `Message` (see [`crate::parser::parse_message`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    System(SystemMessage),
    Result(ResultMessage),
}

impl Message {
    /// Returns `Some(&ResultMessage)` if this is the terminal result message.
    pub fn as_result(&self) -> Option<&ResultMessage> {
        if let Message::Result(r) = self {
            Some(r)
        } else {
            None
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        if let Message::Assistant(a) = self {
            Some(a)
        } else {
            None
        }
    }
}

// ─── User messages ────────────────────────────────────────────────────────

/// `type = "user"`: content is passed through untouched (a string, or the
/// structured block list carrying tool results).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMessage {
    pub content: Value,
}

// ─── Assistant messages ───────────────────────────────────────────────────

/// `type = "assistant"`: the model's response as ordered content blocks.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,
}

impl AssistantMessage {
    /// All text blocks concatenated in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUseBlock> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse(t) => Some(t),
            _ => None,
        })
    }
}

/// One unit of an assistant message's payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TextBlock {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolUseBlock {
    /// Correlates with [`ToolResultBlock::tool_use_id`].
    pub id: String,
    pub name: String,
    /// Tool inputs are schema-polymorphic (varies per tool), so Value is correct here.
    #[serde(default = "empty_object")]
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

// ─── System messages ──────────────────────────────────────────────────────

/// `type = "system"`: `data` keeps the whole raw object so fields this
/// crate does not model (tools, model, cwd, ...) stay reachable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemMessage {
    pub subtype: String,
    pub data: Value,
}

impl SystemMessage {
    pub fn is_init(&self) -> bool {
        self.subtype == "init"
    }

    /// The session id carried by `init` messages, if present.
    pub fn session_id(&self) -> Option<&str> {
        self.data.get("session_id").and_then(Value::as_str)
    }
}

// ─── Result messages ──────────────────────────────────────────────────────

/// `type = "result"`: the summary the CLI emits at the end of a query.
///
/// Required fields that are missing on the wire default to zero/empty;
/// optional ones stay `None`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ResultMessage {
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_api_ms: Option<u64>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ResultMessage {
    pub fn is_success(&self) -> bool {
        !self.is_error && self.subtype == "success"
    }
}

// ─── QueryOptions ─────────────────────────────────────────────────────────

/// Options for driving a Claude subprocess query.
///
/// Every field maps to one CLI flag (see [`crate::command::build_args`]) or
/// to how the subprocess is spawned.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Override system prompt (default: CLI's own)
    pub system_prompt: Option<String>,
    /// Text to append to the default system prompt
    pub append_system_prompt: Option<String>,
    /// Tool names that are auto-approved without user prompting
    pub allowed_tools: Vec<String>,
    /// Tool names that are explicitly disallowed
    pub disallowed_tools: Vec<String>,
    /// Maximum number of agentic turns (default: unlimited)
    pub max_turns: Option<u32>,
    /// Budget for extended thinking tokens
    pub max_thinking_tokens: Option<u32>,
    /// Claude model name (default: CLI's own)
    pub model: Option<String>,
    /// MCP tool that answers permission prompts
    pub permission_prompt_tool_name: Option<String>,
    /// Permission mode for tool execution
    pub permission_mode: PermissionMode,
    /// Continue the most recent conversation
    pub continue_conversation: bool,
    /// Session ID to resume (loads conversation history)
    pub resume: Option<String>,
    /// MCP servers to register for this session
    pub mcp_servers: Vec<McpServerConfig>,
    /// Additional working directories (`--add-dir`)
    pub add_dirs: Vec<PathBuf>,
    /// Working directory for the subprocess (default: current dir)
    pub cwd: Option<PathBuf>,
    /// Additional environment variables for the subprocess
    pub env: HashMap<String, String>,
    /// Custom path to the `claude` binary (default: discovered)
    pub path_to_executable: Option<PathBuf>,
    /// How user input reaches the subprocess
    pub input_format: InputFormat,
    /// Largest stdout document accepted before decoding aborts (default: 50 MiB)
    pub max_buffer_size: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            append_system_prompt: None,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            max_turns: None,
            max_thinking_tokens: None,
            model: None,
            permission_prompt_tool_name: None,
            permission_mode: PermissionMode::default(),
            continue_conversation: false,
            resume: None,
            mcp_servers: Vec::new(),
            add_dirs: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            path_to_executable: None,
            input_format: InputFormat::default(),
            max_buffer_size: MAX_BUFFER_SIZE,
        }
    }
}

/// How prompts are delivered to the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputFormat {
    /// Single prompt passed on the command line; stdin closed at spawn.
    #[default]
    Text,
    /// One JSON user turn per stdin line; stdin closed after the last turn.
    StreamJson,
}

/// Controls how tool executions are authorized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermissionMode {
    /// Standard: prompts for dangerous operations
    #[default]
    Default,
    /// Auto-accept file edit operations
    AcceptEdits,
    /// Bypass all permission checks
    BypassPermissions,
    /// Planning mode, no actual tool execution
    Plan,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::Plan => "plan",
        }
    }
}

impl std::str::FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PermissionMode::Default),
            "acceptEdits" => Ok(PermissionMode::AcceptEdits),
            "bypassPermissions" => Ok(PermissionMode::BypassPermissions),
            "plan" => Ok(PermissionMode::Plan),
            other => Err(format!(
                "unknown permission mode '{other}' \
                 (expected default, acceptEdits, bypassPermissions or plan)"
            )),
        }
    }
}

// ─── MCP server configuration ─────────────────────────────────────────────

/// An MCP server the CLI should start or connect to for this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpServerConfig {
    Stdio {
        /// Logical name (tools appear as `mcp__<name>__<tool>`)
        name: String,
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Sse {
        name: String,
        url: String,
        headers: HashMap<String, String>,
    },
    Http {
        name: String,
        url: String,
        headers: HashMap<String, String>,
    },
}

impl McpServerConfig {
    pub fn stdio(
        name: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        McpServerConfig::Stdio {
            name: name.into(),
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: HashMap::new(),
        }
    }

    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        McpServerConfig::Sse {
            name: name.into(),
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        McpServerConfig::Http {
            name: name.into(),
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    /// Add an environment variable (stdio) or header (sse/http).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self {
            McpServerConfig::Stdio { env, .. } => {
                env.insert(key.into(), value.into());
            }
            McpServerConfig::Sse { headers, .. } | McpServerConfig::Http { headers, .. } => {
                headers.insert(key.into(), value.into());
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        match self {
            McpServerConfig::Stdio { name, .. }
            | McpServerConfig::Sse { name, .. }
            | McpServerConfig::Http { name, .. } => name,
        }
    }
}
