//! Streaming event model.
//!
//! A stream of typed events terminates with exactly one DONE or ERROR
//! event; mid-stream provider failures are converted into a single ERROR
//! rather than propagating.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::llm::types::UsageInfo;

/// Typed streaming event, serialized as `{type, content?, usage?, error?,
/// metadata?}` for the newline-delimited JSON endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text token delta
    Token { content: String },
    /// Reasoning/thinking delta
    Reasoning { content: String },
    /// Tool-call request
    ToolCall { content: String },
    /// Token usage, emitted once before DONE
    Usage { usage: UsageInfo },
    /// Stream completed
    Done { metadata: Value },
    /// Stream failed; terminal
    Error { error: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

/// Handle for receiving stream events.
pub struct EventStream {
    receiver: mpsc::Receiver<StreamEvent>,
}

impl EventStream {
    pub fn new(receiver: mpsc::Receiver<StreamEvent>) -> Self {
        Self { receiver }
    }

    /// Receive the next event, None after the channel closes.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }

    /// Collect all token text, stopping at the terminal event.
    pub async fn collect_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(event) = self.recv().await {
            match event {
                StreamEvent::Token { content } => text.push_str(&content),
                StreamEvent::Done { .. } | StreamEvent::Error { .. } => break,
                _ => {}
            }
        }
        text
    }
}

/// Create a bounded event channel pair.
pub fn event_channel(buffer: usize) -> (mpsc::Sender<StreamEvent>, EventStream) {
    let (tx, rx) = mpsc::channel(buffer);
    (tx, EventStream::new(rx))
}
