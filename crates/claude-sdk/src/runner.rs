use futures::StreamExt;

use crate::stream::QueryStream;
use crate::{query, ClaudeSdkError, Message, QueryOptions, Result};

// ─── RunResult ────────────────────────────────────────────────────────────

/// The outcome of a query driven to completion.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub session_id: String,
    /// The final text the CLI reported (empty for error subtypes).
    pub result_text: String,
    pub total_cost_usd: Option<f64>,
    pub num_turns: u32,
    /// `true` if the run ended with any error subtype (max_turns, etc.).
    pub is_error: bool,
    /// Every message observed, terminal result included.
    pub messages: Vec<Message>,
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Drive a single-prompt query to completion.
///
/// # Example
///
/// ```rust,ignore
/// use claude_sdk::runner::run;
/// use claude_sdk::QueryOptions;
///
/// let result = run("say hello", QueryOptions::default()).await?;
/// println!("{}", result.result_text);
/// ```
pub async fn run(prompt: impl Into<String>, opts: QueryOptions) -> Result<RunResult> {
    collect(query(prompt, opts)).await
}

/// Consume a [`QueryStream`] to the end and summarise it.
///
/// Reads past the result message so the subprocess exit status is still
/// checked. Returns `Err` on the first stream error, or if the stream ends
/// without a `Result` message.
pub async fn collect(mut stream: QueryStream) -> Result<RunResult> {
    let mut messages = Vec::new();
    let mut run_result: Option<RunResult> = None;

    while let Some(msg) = stream.next().await {
        let msg = msg?;
        if let Message::Result(r) = &msg {
            run_result = Some(RunResult {
                session_id: r.session_id.clone(),
                result_text: r.result.clone().unwrap_or_default(),
                total_cost_usd: r.total_cost_usd,
                num_turns: r.num_turns,
                is_error: r.is_error,
                messages: Vec::new(),
            });
        }
        messages.push(msg);
    }

    let mut result = run_result
        .ok_or_else(|| ClaudeSdkError::connection("stream ended without a result message"))?;
    result.messages = messages;
    Ok(result)
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::types::{
        AssistantMessage, ContentBlock, ResultMessage, SystemMessage, TextBlock,
    };

    fn success_msg(text: &str) -> Message {
        Message::Result(ResultMessage {
            subtype: "success".into(),
            session_id: "s1".into(),
            result: Some(text.to_string()),
            duration_ms: 10,
            duration_api_ms: Some(8),
            is_error: false,
            num_turns: 3,
            total_cost_usd: Some(0.012),
            usage: Some(serde_json::json!({"input_tokens": 100, "output_tokens": 50})),
        })
    }

    fn error_msg() -> Message {
        Message::Result(ResultMessage {
            subtype: "error_max_turns".into(),
            session_id: "s2".into(),
            duration_ms: 10,
            is_error: true,
            num_turns: 10,
            total_cost_usd: Some(0.005),
            ..Default::default()
        })
    }

    fn system_init_msg() -> Message {
        Message::System(SystemMessage {
            subtype: "init".into(),
            data: serde_json::json!({"type": "system", "subtype": "init", "session_id": "s1"}),
        })
    }

    fn assistant_msg(text: &str) -> Message {
        Message::Assistant(AssistantMessage {
            content: vec![ContentBlock::Text(TextBlock { text: text.into() })],
        })
    }

    fn mock_stream(messages: Vec<Result<Message>>) -> QueryStream {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for msg in messages {
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
        });
        QueryStream::from_channel(rx)
    }

    #[tokio::test]
    async fn collect_success_returns_result_text() {
        let stream = mock_stream(vec![Ok(success_msg("hello world"))]);
        let result = collect(stream).await.unwrap();
        assert_eq!(result.result_text, "hello world");
        assert_eq!(result.session_id, "s1");
        assert_eq!(result.num_turns, 3);
        assert!((result.total_cost_usd.unwrap() - 0.012).abs() < 1e-9);
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn collect_error_subtype_sets_is_error_true() {
        let stream = mock_stream(vec![Ok(error_msg())]);
        let result = collect(stream).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.session_id, "s2");
        assert_eq!(result.num_turns, 10);
        assert_eq!(result.result_text, "");
    }

    #[tokio::test]
    async fn collect_no_result_message_returns_err() {
        let (tx, rx) = mpsc::channel::<Result<Message>>(1);
        drop(tx);
        let stream = QueryStream::from_channel(rx);
        let err = collect(stream).await.unwrap_err();
        assert!(err.is_connection());
        assert!(err.to_string().contains("result message"));
    }

    #[tokio::test]
    async fn collect_keeps_every_message_in_order() {
        let stream = mock_stream(vec![
            Ok(system_init_msg()),
            Ok(assistant_msg("working")),
            Ok(success_msg("done")),
        ]);
        let result = collect(stream).await.unwrap();
        assert_eq!(result.result_text, "done");
        assert_eq!(result.messages.len(), 3);
        assert!(matches!(result.messages[0], Message::System(_)));
        assert_eq!(
            result.messages[1].as_assistant().map(AssistantMessage::text),
            Some("working".to_string())
        );
        assert!(result.messages[2].as_result().is_some());
    }

    #[tokio::test]
    async fn collect_surfaces_error_after_result() {
        let stream = mock_stream(vec![
            Ok(success_msg("done")),
            Err(ClaudeSdkError::Process {
                exit_code: Some(2),
                stderr: "late failure".into(),
            }),
        ]);
        let err = collect(stream).await.unwrap_err();
        assert!(err.is_process());
    }
}
