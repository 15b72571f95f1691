use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::stream::BoxStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::converter::MessageConverter;
use crate::envelope::Headers;
use crate::source::{Batch, PartitionContext, SourceMessage, StreamBatches};

/// Provider message of the in-memory source.
///
/// Carries the same field set a broker message would: a payload plus optional
/// id, content type, reply-to, and offset. Useful for unit and integration
/// testing and for simulating delivery without a real broker.
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryMessage {
    payload: Vec<u8>,
    message_id: Option<String>,
    content_type: Option<String>,
    reply_to: Option<String>,
    offset: Option<i64>,
}

impl InMemoryMessage {
    /// Create a message with the given payload and no metadata.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            message_id: None,
            content_type: None,
            reply_to: None,
            offset: None,
        }
    }

    /// Set the provider-assigned message id.
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Set the payload content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the reply-to destination.
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Set the message offset within its partition.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl SourceMessage for InMemoryMessage {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    fn offset(&self) -> Option<String> {
        self.offset.map(|offset| offset.to_string())
    }
}

/// Converter between [`Envelope`](crate::Envelope)s and [`InMemoryMessage`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryConverter;

impl MessageConverter for InMemoryConverter {
    type Message = InMemoryMessage;

    fn message_from_text(&self, payload: String) -> Self::Message {
        InMemoryMessage::new(payload.into_bytes())
    }

    fn message_from_bytes(&self, payload: Vec<u8>) -> Self::Message {
        InMemoryMessage::new(payload)
    }

    fn apply_headers(&self, headers: &Headers, message: &mut Self::Message) {
        message.content_type = headers.content_type();
        message.message_id = headers.message_id();
        message.reply_to = headers.reply_to();
    }
}

/// A checkpoint commit observed by an [`InMemoryPartition`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommitRecord {
    /// Commit of the partition's current read position.
    Position,
    /// Commit of an explicit message.
    Message {
        /// Id of the committed message, if it carried one.
        message_id: Option<String>,
        /// Offset token of the committed message, if it carried one.
        offset: Option<String>,
    },
}

/// In-memory partition handle.
///
/// Records every commit it receives so tests can assert on checkpoint
/// behavior, and can be switched into a rejecting state to simulate commit
/// failures.
#[derive(Clone)]
pub struct InMemoryPartition {
    id: String,
    commits: Arc<Mutex<Vec<CommitRecord>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryPartition {
    /// Create a partition handle with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            commits: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reject (or stop rejecting) subsequent commits.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All commits recorded so far, in arrival order.
    pub async fn commits(&self) -> Vec<CommitRecord> {
        self.commits.lock().await.clone()
    }

    fn reject_if_failing(&self) -> Result<(), std::io::Error> {
        if self.failing.load(Ordering::SeqCst) {
            Err(std::io::Error::other("checkpoint rejected"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PartitionContext<InMemoryMessage> for InMemoryPartition {
    type Error = std::io::Error;

    fn partition_id(&self) -> &str {
        &self.id
    }

    async fn checkpoint(&self) -> Result<(), Self::Error> {
        self.reject_if_failing()?;
        self.commits.lock().await.push(CommitRecord::Position);
        Ok(())
    }

    async fn checkpoint_message(&self, message: InMemoryMessage) -> Result<(), Self::Error> {
        self.reject_if_failing()?;
        self.commits.lock().await.push(CommitRecord::Message {
            message_id: message.message_id.clone(),
            offset: SourceMessage::offset(&message),
        });
        Ok(())
    }
}

/// An in-memory source for testing or local pipelines.
///
/// Batches queued with [`push_batch`](InMemorySource::push_batch) are yielded
/// in order when the stream is consumed; the stream then ends.
#[derive(Clone, Default)]
pub struct InMemorySource {
    batches: Arc<Mutex<Vec<Batch<InMemoryPartition, InMemoryMessage>>>>,
}

impl InMemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch for delivery.
    pub async fn push_batch(&self, batch: Batch<InMemoryPartition, InMemoryMessage>) {
        self.batches.lock().await.push(batch);
    }
}

#[async_trait]
impl StreamBatches<InMemoryPartition, InMemoryMessage> for InMemorySource {
    type Error = std::io::Error;

    /// Stream all queued batches, then end.
    async fn batches(
        &self,
        _cancel: CancellationToken,
    ) -> Result<
        BoxStream<'_, Result<Batch<InMemoryPartition, InMemoryMessage>, Self::Error>>,
        Self::Error,
    > {
        let batches = std::mem::take(&mut *self.batches.lock().await);
        let batches: Vec<_> = batches.into_iter().map(Ok).collect();
        Ok(Box::pin(tokio_stream::iter(batches)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn partition_records_commits_in_order() {
        let partition = InMemoryPartition::new("0");

        partition.checkpoint().await.unwrap();
        partition
            .checkpoint_message(InMemoryMessage::new(b"x".to_vec()).with_message_id("m-1"))
            .await
            .unwrap();

        assert_eq!(
            partition.commits().await,
            vec![
                CommitRecord::Position,
                CommitRecord::Message {
                    message_id: Some("m-1".to_owned()),
                    offset: None,
                },
            ],
        );
    }

    #[tokio::test]
    async fn failing_partition_rejects_commits_without_recording() {
        let partition = InMemoryPartition::new("0");
        partition.set_failing(true);

        assert!(partition.checkpoint().await.is_err());
        assert!(partition
            .checkpoint_message(InMemoryMessage::new(b"x".to_vec()))
            .await
            .is_err());
        assert!(partition.commits().await.is_empty());

        partition.set_failing(false);
        partition.checkpoint().await.unwrap();
        assert_eq!(partition.commits().await.len(), 1);
    }

    #[tokio::test]
    async fn source_streams_queued_batches_then_ends() {
        use tokio_stream::StreamExt as _;

        let source = InMemorySource::new();
        source
            .push_batch(Batch {
                context: InMemoryPartition::new("0"),
                messages: vec![InMemoryMessage::new(b"a".to_vec())],
            })
            .await;

        let mut stream = source.batches(CancellationToken::new()).await.unwrap();

        let batch = stream.next().await.unwrap().unwrap();
        assert_eq!(batch.context.partition_id(), "0");
        assert_eq!(batch.messages.len(), 1);
        assert!(stream.next().await.is_none());
    }
}
