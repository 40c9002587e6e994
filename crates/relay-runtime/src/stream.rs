use crate::Result;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One unit of orchestrator output.
///
/// Every chunk carries the name of the backend that produced it. In single
/// mode all chunks come from one backend; broadcast mode multiplexes
/// several and additionally emits per-backend terminal markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk { backend: String, text: String },
    BackendDone { backend: String },
    BackendFailed { backend: String, error: String },
}

/// Consumer-paced stream of response events.
///
/// Bounded underneath: if the consumer stops consuming, producers stall at
/// their suspension points and the upstream child process or HTTP
/// connection stalls naturally.
#[derive(Debug)]
pub struct ResponseStream {
    rx: mpsc::Receiver<Result<StreamEvent>>,
}

impl ResponseStream {
    pub(crate) fn new(rx: mpsc::Receiver<Result<StreamEvent>>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<Result<StreamEvent>> {
        self.rx.recv().await
    }

    /// Adapts to a `tokio_stream::Stream` for combinator-style consumers.
    pub fn into_stream(self) -> ReceiverStream<Result<StreamEvent>> {
        ReceiverStream::new(self.rx)
    }

    /// Drains the stream, concatenating chunk text. The first error ends
    /// collection; per-backend failure markers are folded in as text so
    /// broadcast output stays inspectable.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event? {
                StreamEvent::Chunk { text: chunk, .. } => text.push_str(&chunk),
                StreamEvent::BackendDone { .. } => {}
                StreamEvent::BackendFailed { backend, error } => {
                    text.push_str(&format!("\n[{} failed: {}]\n", backend, error));
                }
            }
        }
        Ok(text)
    }
}

/// Forwarding capacity between orchestrator and caller. Small by intent so
/// backpressure reaches the producing adapter quickly.
pub(crate) const EVENT_CAPACITY: usize = 32;

pub(crate) fn event_channel() -> (mpsc::Sender<Result<StreamEvent>>, ResponseStream) {
    let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
    (tx, ResponseStream::new(rx))
}
