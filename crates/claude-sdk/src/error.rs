use thiserror::Error;

/// Number of characters of an offending line shown in error messages.
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ClaudeSdkError {
    /// The CLI executable could not be located or executed.
    #[error("{message}")]
    CliNotFound { path: String, message: String },

    /// Spawning or talking to the subprocess failed for a reason other than
    /// "not found": bad working directory, broken pipe, use before connect.
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The subprocess exited unsuccessfully once its output was drained.
    #[error("{}", process_message(.exit_code, .stderr))]
    Process {
        /// `None` when the process was terminated by a signal.
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Standard output carried something that is not a JSON document.
    #[error("failed to decode CLI output: {source}\n  line: {}", preview(.line))]
    JsonDecode {
        line: String,
        #[source]
        source: DecodeFailure,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a buffered line could not become a JSON document.
#[derive(Debug, Error)]
pub enum DecodeFailure {
    #[error(transparent)]
    Syntax(#[from] serde_json::Error),

    #[error("output is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("buffer exceeded the maximum size of {limit} bytes")]
    BufferOverflow { limit: usize },
}

impl ClaudeSdkError {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        ClaudeSdkError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn connection_io(message: impl Into<String>, source: std::io::Error) -> Self {
        ClaudeSdkError::Connection {
            message: message.into(),
            source: Some(source),
        }
    }

    pub(crate) fn not_connected() -> Self {
        Self::connection("not connected")
    }

    pub fn is_cli_not_found(&self) -> bool {
        matches!(self, ClaudeSdkError::CliNotFound { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, ClaudeSdkError::Connection { .. })
    }

    pub fn is_process(&self) -> bool {
        matches!(self, ClaudeSdkError::Process { .. })
    }

    pub fn is_json_decode(&self) -> bool {
        matches!(self, ClaudeSdkError::JsonDecode { .. })
    }
}

fn process_message(exit_code: &Option<i32>, stderr: &str) -> String {
    let head = match *exit_code {
        Some(code) => format!("Claude CLI process exited with code {code}"),
        None => "Claude CLI process terminated by signal".to_string(),
    };

    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!(
            "{head} and wrote nothing to stderr. Likely causes:\n  \
             - invalid or missing credentials (ANTHROPIC_API_KEY or `claude login`)\n  \
             - no network connectivity to the API\n  \
             - an unsupported flag or bad configuration passed to the CLI"
        )
    } else {
        format!("{head}\nstderr: {stderr}")
    }
}

fn preview(line: &str) -> String {
    let mut chars = line.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
