use bytes::Bytes;
use futures::{Stream, StreamExt as _};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::errors::ClientError;
use crate::sse::{EventDecoder, StreamEvent};

/// How a byte stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The body reached end-of-stream.
    Completed,
    /// A read failed while the caller had not cancelled.
    Failed(ClientError),
    /// The caller cancelled; not an error.
    Aborted,
}

/// Result of one pull from a [`StreamReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStep {
    /// Events completed by the chunk just read (possibly none).
    Events(Vec<StreamEvent>),
    /// Terminal step, produced exactly once.
    Finished(ReadOutcome),
}

/// Pull-based reader that feeds a byte stream through an [`EventDecoder`].
///
/// Exactly one read is in flight at a time and the next one is only issued
/// when the consumer asks for it, so a slow consumer slows the producer.
pub struct StreamReader<S> {
    body: S,
    decoder: EventDecoder,
    cancel: CancellationToken,
    operation: &'static str,
    bytes_read: usize,
    finished: bool,
}

impl<S, E> StreamReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    /// Creates a reader over `body`; `cancel` marks caller-initiated aborts.
    pub fn new(body: S, cancel: CancellationToken) -> Self {
        Self {
            body,
            decoder: EventDecoder::default(),
            cancel,
            operation: "event stream read",
            bytes_read: 0,
            finished: false,
        }
    }

    /// Names the operation used in transport error messages.
    pub fn operation(mut self, operation: &'static str) -> Self {
        self.operation = operation;
        self
    }

    /// Total bytes pulled so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Pulls one chunk. Returns `None` once the terminal step was delivered.
    pub async fn next_step(&mut self) -> Option<ReadStep> {
        if self.finished {
            return None;
        }
        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            next = self.body.next() => Some(next),
        };
        let step = match next {
            None => ReadStep::Finished(ReadOutcome::Aborted),
            Some(Some(Ok(chunk))) => {
                self.bytes_read += chunk.len();
                trace!(chunk_len = chunk.len(), total = self.bytes_read, "read chunk");
                let mut events = Vec::new();
                self.decoder.push_chunk(&chunk, |event| events.push(event));
                ReadStep::Events(events)
            }
            Some(Some(Err(err))) => {
                if self.cancel.is_cancelled() {
                    ReadStep::Finished(ReadOutcome::Aborted)
                } else {
                    ReadStep::Finished(ReadOutcome::Failed(ClientError::transport(
                        self.operation,
                        err,
                    )))
                }
            }
            Some(None) => {
                // Held-back bytes cannot complete an event, only flush them.
                self.decoder.finish(|_| {});
                ReadStep::Finished(ReadOutcome::Completed)
            }
        };
        if matches!(step, ReadStep::Finished(_)) {
            self.finished = true;
        }
        Some(step)
    }

    /// Drives the stream to its end, invoking `on_event` per event in order,
    /// and returns the single terminal outcome.
    pub async fn run(mut self, mut on_event: impl FnMut(StreamEvent)) -> ReadOutcome {
        while let Some(step) = self.next_step().await {
            match step {
                ReadStep::Events(events) => events.into_iter().for_each(&mut on_event),
                ReadStep::Finished(outcome) => return outcome,
            }
        }
        ReadOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static [u8]]) -> Vec<Result<Bytes, std::io::Error>> {
        parts.iter().map(|p| Ok(Bytes::from_static(p))).collect()
    }

    #[tokio::test]
    async fn completes_once_and_then_yields_nothing() {
        let body = stream::iter(chunks(&[b"data: a\n\n", b"data: b\n\n"]));
        let mut reader = StreamReader::new(body, CancellationToken::new());
        let mut events = Vec::new();
        let mut finals = Vec::new();
        while let Some(step) = reader.next_step().await {
            match step {
                ReadStep::Events(batch) => events.extend(batch),
                ReadStep::Finished(outcome) => finals.push(outcome),
            }
        }
        assert_eq!(finals, vec![ReadOutcome::Completed]);
        assert_eq!(events.len(), 2);
        assert!(reader.next_step().await.is_none());
        assert_eq!(reader.bytes_read(), 18);
    }

    #[tokio::test]
    async fn arbitrary_chunking_yields_identical_events() {
        let raw = "data: {\"choices\":[{\"delta\":{\"content\":\"鲜香\"}}]}\n\ndata: 微辣\n\n".as_bytes();
        let whole = StreamReader::new(
            stream::iter(vec![Ok::<_, std::io::Error>(Bytes::copy_from_slice(raw))]),
            CancellationToken::new(),
        );
        let mut expected = Vec::new();
        assert_eq!(whole.run(|e| expected.push(e)).await, ReadOutcome::Completed);

        for size in 1..raw.len() {
            let parts: Vec<Result<Bytes, std::io::Error>> = raw
                .chunks(size)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            let mut got = Vec::new();
            let outcome = StreamReader::new(stream::iter(parts), CancellationToken::new())
                .run(|e| got.push(e))
                .await;
            assert_eq!(outcome, ReadOutcome::Completed);
            assert_eq!(got, expected, "chunk size {size}");
        }
    }

    #[tokio::test]
    async fn read_error_fails_with_transport_error() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err(std::io::Error::other("connection reset")),
        ]);
        let mut seen = 0;
        let outcome = StreamReader::new(body, CancellationToken::new())
            .operation("chat stream read")
            .run(|_| seen += 1)
            .await;
        assert_eq!(seen, 1);
        assert!(matches!(
            outcome,
            ReadOutcome::Failed(ClientError::Transport { operation: "chat stream read", ref message })
                if message.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn read_error_after_cancel_is_an_abort() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let body = stream::iter(vec![Err::<Bytes, _>(std::io::Error::other("aborted"))])
            .inspect(move |_| trigger.cancel());
        let outcome = StreamReader::new(body, cancel).run(|_| {}).await;
        assert_eq!(outcome, ReadOutcome::Aborted);
    }

    #[tokio::test]
    async fn cancel_while_waiting_aborts_without_events() {
        let cancel = CancellationToken::new();
        let mut reader = StreamReader::new(
            stream::pending::<Result<Bytes, std::io::Error>>(),
            cancel.clone(),
        );
        cancel.cancel();
        assert_eq!(
            reader.next_step().await,
            Some(ReadStep::Finished(ReadOutcome::Aborted))
        );
        assert!(reader.next_step().await.is_none());
    }
}
