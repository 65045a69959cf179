//! `claude-sdk` drives the Claude CLI subprocess as a typed async stream.
//!
//! The CLI is started with `--output-format stream-json`; every line it
//! writes to stdout is decoded and parsed into a [`Message`].
//!
//! # Architecture
//!
//! ```text
//! QueryOptions
//!     │  command::build_args / build_env, discovery::find_cli
//!     ▼
//! SubprocessTransport  ← spawns `claude …`, writes stream-json turns to stdin,
//!     │                   tears down with SIGTERM → 5 s → SIGKILL
//!     ▼
//! NdjsonDecoder        ← stdout lines → JSON documents (50 MiB cap)
//!     │
//!     ▼
//! parse_message        ← JSON → Message; unknown shapes are skipped
//!     │
//!     ▼
//! QueryStream          ← futures::Stream<Item = Result<Message>>
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use claude_sdk::{query, Message, QueryOptions};
//! use futures::StreamExt;
//!
//! let opts = QueryOptions {
//!     model: Some("claude-sonnet-4-6".into()),
//!     max_turns: Some(10),
//!     ..Default::default()
//! };
//!
//! let mut stream = query("Write a hello-world Rust function.", opts);
//! while let Some(msg) = stream.next().await {
//!     match msg? {
//!         Message::Assistant(a) => print!("{}", a.text()),
//!         Message::Result(r) => println!("\n[{} turns]", r.num_turns),
//!         _ => {}
//!     }
//! }
//! ```

pub mod command;
pub mod decoder;
pub mod discovery;
pub mod error;
pub mod parser;
pub mod runner;
pub mod stream;
pub mod transport;
pub mod types;

pub use error::{ClaudeSdkError, DecodeFailure};
pub use parser::parse_message;
pub use runner::{RunResult, collect, run};
pub use stream::QueryStream;
pub use transport::{SubprocessTransport, TransportConfig, user_turn};
pub use types::{
    AssistantMessage, ContentBlock, InputFormat, McpServerConfig, Message, PermissionMode,
    QueryOptions, ResultMessage, SystemMessage, TextBlock, ToolResultBlock, ToolUseBlock,
    UserMessage,
};

use command::PromptInput;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ClaudeSdkError>;

/// Run a single prompt.
///
/// With the default [`InputFormat::Text`] the prompt is passed on the
/// command line. With [`InputFormat::StreamJson`] it is sent as the only
/// stdin turn instead.
pub fn query(prompt: impl Into<String>, opts: QueryOptions) -> QueryStream {
    let prompt = prompt.into();
    match opts.input_format {
        InputFormat::Text => QueryStream::spawn(PromptInput::Single(prompt), Vec::new(), opts),
        InputFormat::StreamJson => {
            QueryStream::spawn(PromptInput::Streaming, vec![user_turn(prompt)], opts)
        }
    }
}

/// Run a multi-turn conversation fed over stdin.
///
/// Each turn is written as one stream-json line in order, then stdin is
/// closed. Forces [`InputFormat::StreamJson`]. Turns are usually built with
/// [`user_turn`].
pub fn query_turns(turns: Vec<serde_json::Value>, mut opts: QueryOptions) -> QueryStream {
    opts.input_format = InputFormat::StreamJson;
    QueryStream::spawn(PromptInput::Streaming, turns, opts)
}

/// Continue the most recent conversation in the working directory.
pub fn continue_conversation(prompt: impl Into<String>, mut opts: QueryOptions) -> QueryStream {
    opts.continue_conversation = true;
    query(prompt, opts)
}

/// Resume a specific conversation by session id.
pub fn resume_conversation(
    session_id: impl Into<String>,
    prompt: impl Into<String>,
    mut opts: QueryOptions,
) -> QueryStream {
    opts.resume = Some(session_id.into());
    query(prompt, opts)
}
