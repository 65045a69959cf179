use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::types::{McpServerConfig, PermissionMode, QueryOptions};

/// Environment variable identifying this library to the CLI.
pub const ENTRYPOINT_VAR: &str = "CLAUDE_CODE_ENTRYPOINT";
pub const ENTRYPOINT: &str = "sdk-rust";

/// Variables forwarded from the caller's environment when present.
pub const PASSTHROUGH_VARS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "CLAUDE_CODE_USE_BEDROCK",
    "CLAUDE_CODE_USE_VERTEX",
];

/// Set by a running Claude session; removed so nested invocations work.
pub const NESTED_SESSION_VAR: &str = "CLAUDECODE";

/// How the prompt reaches the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptInput {
    /// Trailing `--print <prompt>` argument.
    Single(String),
    /// Turns are written to stdin as stream-json.
    Streaming,
}

// ─── Arguments ────────────────────────────────────────────────────────────

/// Build the CLI argument vector (without the executable itself).
pub fn build_args(opts: &QueryOptions, input: &PromptInput) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--output-format".into(),
        "stream-json".into(),
        "--verbose".into(),
    ];

    if let Some(sp) = &opts.system_prompt {
        args.push("--system-prompt".into());
        args.push(sp.clone());
    }

    if let Some(append) = &opts.append_system_prompt {
        args.push("--append-system-prompt".into());
        args.push(append.clone());
    }

    if !opts.allowed_tools.is_empty() {
        args.push("--allowedTools".into());
        args.push(opts.allowed_tools.join(","));
    }

    if let Some(max_turns) = opts.max_turns {
        args.push("--max-turns".into());
        args.push(max_turns.to_string());
    }

    if !opts.disallowed_tools.is_empty() {
        args.push("--disallowedTools".into());
        args.push(opts.disallowed_tools.join(","));
    }

    if let Some(model) = &opts.model {
        args.push("--model".into());
        args.push(model.clone());
    }

    if let Some(tool) = &opts.permission_prompt_tool_name {
        args.push("--permission-prompt-tool".into());
        args.push(tool.clone());
    }

    if opts.permission_mode != PermissionMode::Default {
        args.push("--permission-mode".into());
        args.push(opts.permission_mode.as_str().into());
    }

    if opts.continue_conversation {
        args.push("--continue".into());
    }

    if let Some(resume) = &opts.resume {
        args.push("--resume".into());
        args.push(resume.clone());
    }

    if !opts.mcp_servers.is_empty() {
        args.push("--mcp-config".into());
        args.push(mcp_config_json(&opts.mcp_servers));
    }

    if let Some(budget) = opts.max_thinking_tokens {
        args.push("--max-thinking-tokens".into());
        args.push(budget.to_string());
    }

    for dir in &opts.add_dirs {
        args.push("--add-dir".into());
        args.push(dir.display().to_string());
    }

    match input {
        PromptInput::Single(prompt) => {
            args.push("--print".into());
            args.push(prompt.clone());
        }
        PromptInput::Streaming => {
            args.push("--input-format".into());
            args.push("stream-json".into());
            args.push("--print".into());
        }
    }

    args
}

/// Serialise MCP servers into the JSON blob expected by `--mcp-config`.
///
/// Format: `{"mcpServers":{"<name>":{"type":"stdio","command":"...","args":[...],"env":{...}}}}`
pub fn mcp_config_json(servers: &[McpServerConfig]) -> String {
    let mut mcp_servers = Map::new();

    for srv in servers {
        let mut cfg = Map::new();
        match srv {
            McpServerConfig::Stdio {
                command, args, env, ..
            } => {
                cfg.insert("type".into(), "stdio".into());
                cfg.insert("command".into(), command.as_str().into());
                if !args.is_empty() {
                    cfg.insert(
                        "args".into(),
                        Value::Array(args.iter().map(|a| a.as_str().into()).collect()),
                    );
                }
                if !env.is_empty() {
                    cfg.insert("env".into(), string_map(env));
                }
            }
            McpServerConfig::Sse { url, headers, .. } => {
                cfg.insert("type".into(), "sse".into());
                cfg.insert("url".into(), url.as_str().into());
                if !headers.is_empty() {
                    cfg.insert("headers".into(), string_map(headers));
                }
            }
            McpServerConfig::Http { url, headers, .. } => {
                cfg.insert("type".into(), "http".into());
                cfg.insert("url".into(), url.as_str().into());
                if !headers.is_empty() {
                    cfg.insert("headers".into(), string_map(headers));
                }
            }
        }
        mcp_servers.insert(srv.name().to_string(), Value::Object(cfg));
    }

    serde_json::json!({ "mcpServers": mcp_servers }).to_string()
}

fn string_map(map: &HashMap<String, String>) -> Value {
    // Sorted so the serialised flag is stable across runs.
    let sorted: BTreeMap<&String, &String> = map.iter().collect();
    Value::Object(
        sorted
            .into_iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

// ─── Environment ──────────────────────────────────────────────────────────

/// Variables to set on the child, on top of the inherited environment.
///
/// The entrypoint marker is always present; credentials and backend toggles
/// are forwarded only when set in the caller's environment; `opts.env` wins
/// over both.
pub fn build_env(opts: &QueryOptions) -> Vec<(String, String)> {
    build_env_with(opts, |key| std::env::var(key).ok())
}

fn build_env_with(
    opts: &QueryOptions,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<(String, String)> {
    let mut env: BTreeMap<String, String> = BTreeMap::new();
    env.insert(ENTRYPOINT_VAR.into(), ENTRYPOINT.into());
    for key in PASSTHROUGH_VARS {
        if let Some(value) = lookup(key) {
            env.insert((*key).into(), value);
        }
    }
    for (k, v) in &opts.env {
        env.insert(k.clone(), v.clone());
    }
    env.into_iter().collect()
}
