mod output;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use claude_sdk::{
    continue_conversation, query, query_turns, resume_conversation, user_turn, Message,
    PermissionMode, QueryOptions, QueryStream, ResultMessage,
};
use futures::StreamExt;

#[derive(Parser)]
#[command(
    name = "claude-query",
    about = "Run a prompt through the Claude CLI and stream its messages",
    version
)]
struct Cli {
    /// Prompt text (with --turns, each argument is one user turn)
    #[arg(required = true)]
    prompt: Vec<String>,

    /// Send the prompts as stream-json turns over stdin
    #[arg(long)]
    turns: bool,

    /// Claude model name (default: the CLI's own)
    #[arg(long, env = "CLAUDE_MODEL")]
    model: Option<String>,

    /// Replace the default system prompt
    #[arg(long)]
    system_prompt: Option<String>,

    /// Append to the default system prompt
    #[arg(long)]
    append_system_prompt: Option<String>,

    /// Auto-approved tools (repeatable or comma-separated)
    #[arg(long = "allowed-tool", value_delimiter = ',')]
    allowed_tools: Vec<String>,

    /// Disallowed tools (repeatable or comma-separated)
    #[arg(long = "disallowed-tool", value_delimiter = ',')]
    disallowed_tools: Vec<String>,

    /// Maximum number of agentic turns
    #[arg(long)]
    max_turns: Option<u32>,

    /// default, acceptEdits, bypassPermissions or plan
    #[arg(long, default_value = "default")]
    permission_mode: PermissionMode,

    /// Working directory for the Claude process
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Path to the `claude` executable (default: discovered)
    #[arg(long, env = "CLAUDE_CLI_PATH")]
    cli_path: Option<PathBuf>,

    /// Resume a conversation by session id
    #[arg(long, conflicts_with = "continue_conversation")]
    resume: Option<String>,

    /// Continue the most recent conversation
    #[arg(long = "continue")]
    continue_conversation: bool,

    /// Print every message as one JSON line
    #[arg(long, short = 'j')]
    json: bool,

    /// Log connection details to stderr
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> QueryOptions {
        QueryOptions {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            append_system_prompt: self.append_system_prompt.clone(),
            allowed_tools: self.allowed_tools.clone(),
            disallowed_tools: self.disallowed_tools.clone(),
            max_turns: self.max_turns,
            permission_mode: self.permission_mode,
            cwd: self.cwd.clone(),
            path_to_executable: self.cli_path.clone(),
            ..Default::default()
        }
    }

    fn stream(self) -> QueryStream {
        let opts = self.options();
        if self.turns {
            let mut opts = opts;
            opts.resume = self.resume;
            opts.continue_conversation = self.continue_conversation;
            return query_turns(self.prompt.into_iter().map(user_turn).collect(), opts);
        }

        let prompt = self.prompt.join(" ");
        match (self.resume, self.continue_conversation) {
            (Some(session_id), _) => resume_conversation(session_id, prompt, opts),
            (None, true) => continue_conversation(prompt, opts),
            (None, false) => query(prompt, opts),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;
    let rt = tokio::runtime::Runtime::new()?;
    // The stream spawns its driver task, so it must be created on the runtime.
    let result = rt.block_on(async move { print_stream(cli.stream(), json).await })?;

    match result {
        None => anyhow::bail!("claude exited without a result message"),
        Some(r) if r.is_error => anyhow::bail!("query ended with an error result ({})", r.subtype),
        Some(_) => Ok(()),
    }
}

async fn print_stream(
    mut stream: QueryStream,
    json: bool,
) -> anyhow::Result<Option<ResultMessage>> {
    let mut result = None;
    while let Some(msg) = stream.next().await {
        let msg = msg.context("claude query failed")?;
        if json {
            output::print_json_line(&msg)?;
        } else if let Some(text) = output::render(&msg) {
            println!("{text}");
        }
        if let Message::Result(r) = msg {
            result = Some(r);
        }
    }
    Ok(result)
}
