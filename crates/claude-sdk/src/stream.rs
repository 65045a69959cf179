use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::command::PromptInput;
use crate::discovery;
use crate::parser::parse_message;
use crate::transport::{SubprocessTransport, TransportConfig};
use crate::types::{Message, QueryOptions};
use crate::Result;

// ─── QueryStream ──────────────────────────────────────────────────────────

/// An async stream of [`Message`]s from a Claude subprocess.
///
/// Backed by a Tokio mpsc channel. A background task owns the
/// [`SubprocessTransport`] and forwards parsed messages until stdout ends or
/// an error occurs, then always disconnects. Dropping `QueryStream` closes
/// the receiver, which the task notices at its next read or send and tears
/// the subprocess down.
///
/// Single-pass: once drained or dropped, the subprocess is gone.
///
/// ```rust,ignore
/// use claude_sdk::{query, Message, QueryOptions};
/// use futures::StreamExt;
///
/// let mut stream = query("say hello", QueryOptions::default());
/// while let Some(msg) = stream.next().await {
///     if let Message::Result(r) = msg? {
///         println!("result: {:?}", r.result);
///     }
/// }
/// ```
pub struct QueryStream {
    rx: mpsc::Receiver<Result<Message>>,
}

impl QueryStream {
    /// Start a query. `turns` are written to stdin (stream-json input) and
    /// ignored in single-prompt mode.
    pub(crate) fn spawn(input: PromptInput, turns: Vec<Value>, opts: QueryOptions) -> Self {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let cli_path = match discovery::find_cli(opts.path_to_executable.as_deref()) {
                Ok(path) => path,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            let config = TransportConfig::from_options(cli_path, &opts, &input);
            drive(SubprocessTransport::new(config), input, turns, tx).await;
        });

        QueryStream { rx }
    }

    /// Test-only constructor: wrap a raw mpsc receiver as a `QueryStream`.
    /// Used by `runner` tests to inject pre-built message sequences.
    #[cfg(test)]
    pub(crate) fn from_channel(rx: mpsc::Receiver<Result<Message>>) -> Self {
        Self { rx }
    }
}

/// connect → send turns → forward messages → disconnect, on every path.
async fn drive(
    mut transport: SubprocessTransport,
    input: PromptInput,
    turns: Vec<Value>,
    tx: mpsc::Sender<Result<Message>>,
) {
    if let Err(e) = pump(&mut transport, input, &turns, &tx).await {
        let _ = tx.send(Err(e)).await;
    }
    transport.disconnect().await;
}

async fn pump(
    transport: &mut SubprocessTransport,
    input: PromptInput,
    turns: &[Value],
    tx: &mpsc::Sender<Result<Message>>,
) -> Result<()> {
    transport.connect().await?;
    if input == PromptInput::Streaming {
        // A child that never reads stdin would otherwise block this write
        // past the caller's drop.
        tokio::select! {
            _ = tx.closed() => {
                debug!("query stream dropped while sending turns");
                return Ok(());
            }
            sent = transport.send_all(turns) => sent?,
        }
    }

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!("query stream dropped; stopping early");
                return Ok(());
            }
            next = transport.next_value() => next?,
        };
        let Some(value) = next else {
            return Ok(());
        };
        if let Some(msg) = parse_message(&value) {
            if tx.send(Ok(msg)).await.is_err() {
                return Ok(());
            }
        }
    }
}

impl Stream for QueryStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
